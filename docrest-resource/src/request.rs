//! Per-request state.
//!
//! A [`RequestContext`] is built by the transport layer from the decoded query
//! string and the raw body, used for one resource operation and dropped with the
//! response.

use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Parameters with reserved meaning. Every other key is a filter term.
pub const FIELDS_PARAM: &str = "_fields";
pub const NOT_FIELDS_PARAM: &str = "_not_fields";
pub const ORDER_BY_PARAM: &str = "_order_by";
pub const SKIP_PARAM: &str = "_skip";
pub const LIMIT_PARAM: &str = "_limit";
/// Body key whose object replaces the query string.
pub const PARAMS_KEY: &str = "_params";

pub(crate) const RESERVED_PARAMS: [&str; 5] =
    [FIELDS_PARAM, NOT_FIELDS_PARAM, ORDER_BY_PARAM, SKIP_PARAM, LIMIT_PARAM];

/// Items of a comma-separated parameter, trimmed, without empty entries.
pub(crate) fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// The resource operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Fetch,
    List,
    Create,
    Update,
    BulkUpdate,
    Delete,
}

impl Method {
    /// Whether the request must carry a JSON body.
    pub fn expects_body(&self) -> bool {
        matches!(self, Method::Create | Method::Update | Method::BulkUpdate)
    }
}

/// A string multimap keeping insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads a `_params` body object. Non-string values are written as JSON and
    /// null becomes the empty string.
    fn from_json(map: &Map<String, Value>) -> Self {
        map.iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    raw_data: Map<String, Value>,
    params: Params,
    fields: Option<Vec<String>>,
}

impl RequestContext {
    pub fn builder(method: Method) -> RequestContextBuilder {
        RequestContextBuilder::new(method)
    }

    /// A context carrying an already decoded payload.
    pub fn with_payload(method: Method, raw_data: Map<String, Value>) -> Self {
        let params = match raw_data.get(PARAMS_KEY) {
            Some(Value::Object(params)) => Params::from_json(params),
            _ => Params::new(),
        };
        Self { method, raw_data, params, fields: None }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn raw_data(&self) -> &Map<String, Value> {
        &self.raw_data
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Fields requested by the caller instead of the resource defaults.
    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    pub fn set_fields(&mut self, fields: impl IntoIterator<Item = impl Into<String>>) {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
    }

    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub fn is_bulk(&self) -> bool {
        self.method == Method::BulkUpdate
    }
}

/// Builds a [`RequestContext`] from transport-level inputs.
///
/// # Example
///
/// ```ignore
/// let ctx = RequestContext::builder(Method::Create)
///     .content_type("application/json")
///     .body(br#"{"nick": "bob"}"#.to_vec())
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct RequestContextBuilder {
    method: Method,
    query: Params,
    content_type: Option<String>,
    chunked: bool,
    body: Vec<u8>,
}

impl RequestContextBuilder {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            query: Params::new(),
            content_type: None,
            chunked: false,
            body: Vec::new(),
        }
    }

    pub fn query(mut self, query: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        self.query = query.into_iter().collect();
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key, value);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn chunked(mut self, chunked: bool) -> Self {
        self.chunked = chunked;
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<RequestContext, ValidationError> {
        let raw_data = if self.method.expects_body() || !self.body.is_empty() {
            Self::parse_body(self.content_type.as_deref(), self.chunked, &self.body)?
        } else {
            Map::new()
        };

        let params = match raw_data.get(PARAMS_KEY) {
            Some(Value::Object(params)) => Params::from_json(params),
            _ => self.query,
        };

        Ok(RequestContext {
            method: self.method,
            raw_data,
            params,
            fields: None,
        })
    }

    fn parse_body(
        content_type: Option<&str>,
        chunked: bool,
        body: &[u8],
    ) -> Result<Map<String, Value>, ValidationError> {
        if content_type.is_some_and(|ct| !ct.contains("json")) {
            return Err(ValidationError::message(
                "Please send valid JSON with a 'Content-Type: application/json' header.",
            ));
        }
        if chunked {
            return Err(ValidationError::message("Chunked Transfer-Encoding is not supported."));
        }

        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ValidationError::message("JSON data must be a dict.")),
            Err(_) => Err(ValidationError::message("The request contains invalid JSON.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error_of(builder: RequestContextBuilder) -> String {
        builder.build().unwrap_err().error.unwrap()
    }

    #[test]
    fn rejects_bodies_the_transport_cannot_decode() {
        assert_eq!(
            error_of(RequestContext::builder(Method::Create).content_type("text/plain").body("{}")),
            "Please send valid JSON with a 'Content-Type: application/json' header.",
        );
        assert_eq!(
            error_of(RequestContext::builder(Method::Update).chunked(true).body("{}")),
            "Chunked Transfer-Encoding is not supported.",
        );
        assert_eq!(
            error_of(RequestContext::builder(Method::Create).body("{nick")),
            "The request contains invalid JSON.",
        );
        assert_eq!(
            error_of(RequestContext::builder(Method::Create).body("[1, 2]")),
            "JSON data must be a dict.",
        );
    }

    #[test]
    fn reads_without_body_skip_parsing() {
        let ctx = RequestContext::builder(Method::List)
            .param("nick", "bob")
            .param("nick", "alice")
            .build()
            .unwrap();

        assert!(ctx.raw_data().is_empty());
        assert_eq!(ctx.params().get_all("nick").collect::<Vec<_>>(), vec!["bob", "alice"]);
    }

    #[test]
    fn body_params_replace_query_string() {
        let ctx = RequestContext::builder(Method::BulkUpdate)
            .content_type("application/json; charset=utf-8")
            .param("nick", "ignored")
            .body(json!({ "_params": { "age__gt": 3, "nick": null }, "active": true }).to_string())
            .build()
            .unwrap();

        assert_eq!(ctx.params().get("age__gt"), Some("3"));
        assert_eq!(ctx.params().get("nick"), Some(""));
        assert_eq!(ctx.params().len(), 2);
        assert_eq!(ctx.raw_data()["active"], json!(true));
    }
}
