//! Field descriptors and document schemas.
//!
//! A [`DocumentSchema`] binds a resource to a stored document type: its name (the
//! `_cls` discriminator), the collection it lives in, the declared fields and the
//! indexes the store must maintain. Field kinds are resolved once when the schema
//! is built, so projection and mutation never inspect objects for field kinds at runtime.

use bson::Bson;
use serde_json::Value;
use std::{fmt, sync::Arc};

use docrest_core::{
    document::{Object, TYPE_FIELD},
    query::{Expr, Filter},
};

/// A callable bound to a field name, evaluated against the object being serialized.
pub type ComputedFn = Arc<dyn Fn(&Object) -> Value + Send + Sync>;

/// Type used to coerce raw query-string values for a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScalarType {
    #[default]
    Any,
    String,
    Int,
    Float,
    Bool,
    /// Object ids, compared as strings.
    Id,
}

impl ScalarType {
    /// Parses a raw string into a typed value. Values that do not parse stay strings.
    pub fn coerce(&self, raw: &str) -> Bson {
        match self {
            ScalarType::Int => raw
                .parse::<i64>()
                .map(Bson::Int64)
                .unwrap_or_else(|_| Bson::String(raw.to_string())),
            ScalarType::Float => raw
                .parse::<f64>()
                .map(Bson::Double)
                .unwrap_or_else(|_| Bson::String(raw.to_string())),
            ScalarType::Bool => match raw {
                "true" => Bson::Boolean(true),
                "false" => Bson::Boolean(false),
                _ => Bson::String(raw.to_string()),
            },
            ScalarType::Any | ScalarType::String | ScalarType::Id => Bson::String(raw.to_string()),
        }
    }
}

/// Declared kind of a field.
#[derive(Clone)]
pub enum FieldKind {
    Scalar(ScalarType),
    /// Id of a document in another collection.
    Reference { collection: String },
    List(Box<FieldKind>),
    /// A sub-document. Values are serialized with the element kind when one is declared.
    Map(Option<Box<FieldKind>>),
    /// Not stored. Evaluated from the object on serialization.
    Computed(ComputedFn),
}

impl FieldKind {
    pub fn reference(collection: impl Into<String>) -> Self {
        FieldKind::Reference { collection: collection.into() }
    }

    pub fn list(inner: FieldKind) -> Self {
        FieldKind::List(Box::new(inner))
    }

    pub fn map(inner: Option<FieldKind>) -> Self {
        FieldKind::Map(inner.map(Box::new))
    }

    pub fn computed(f: impl Fn(&Object) -> Value + Send + Sync + 'static) -> Self {
        FieldKind::Computed(Arc::new(f))
    }

    pub fn is_stored(&self) -> bool {
        !matches!(self, FieldKind::Computed(_))
    }

    /// The scalar type filter values for this field are coerced to.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            FieldKind::Scalar(scalar) => *scalar,
            FieldKind::Reference { .. } => ScalarType::Id,
            FieldKind::List(inner) => inner.scalar_type(),
            FieldKind::Map(_) | FieldKind::Computed(_) => ScalarType::Any,
        }
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(scalar) => f.debug_tuple("Scalar").field(scalar).finish(),
            FieldKind::Reference { collection } => f
                .debug_struct("Reference")
                .field("collection", collection)
                .finish(),
            FieldKind::List(inner) => f.debug_tuple("List").field(inner).finish(),
            FieldKind::Map(inner) => f.debug_tuple("Map").field(inner).finish(),
            FieldKind::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: String,
    pub unique: bool,
}

/// The stored document type a resource is bound to.
#[derive(Debug, Clone)]
pub struct DocumentSchema {
    doc_type: String,
    collection: String,
    fields: Vec<FieldDescriptor>,
    indexes: Vec<IndexSpec>,
    /// Concrete types a query through this schema is restricted to. Empty for base types.
    types: Vec<String>,
}

impl DocumentSchema {
    pub fn builder(doc_type: impl Into<String>, collection: impl Into<String>) -> DocumentSchemaBuilder {
        DocumentSchemaBuilder::new(doc_type, collection)
    }

    /// Starts a subtype of `base`: same collection and fields, restricted to its own type.
    pub fn subtype(doc_type: impl Into<String>, base: &DocumentSchema) -> DocumentSchemaBuilder {
        let doc_type = doc_type.into();
        DocumentSchemaBuilder {
            schema: DocumentSchema {
                types: vec![doc_type.clone()],
                doc_type,
                collection: base.collection.clone(),
                fields: base.fields.clone(),
                indexes: base.indexes.clone(),
            },
        }
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Names of the fields written to the store.
    pub fn storage_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|field| field.kind.is_stored())
            .map(|field| field.name.as_str())
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Whether objects of `doc_type` belong to this schema.
    pub fn matches_type(&self, doc_type: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t == doc_type)
    }

    /// The filter that keeps queries on a shared collection to this schema's types.
    pub fn type_filter(&self) -> Option<Expr> {
        if self.types.is_empty() {
            return None;
        }
        Some(Filter::one_of(TYPE_FIELD, self.types.iter().cloned().map(Bson::String)))
    }
}

pub struct DocumentSchemaBuilder {
    schema: DocumentSchema,
}

impl DocumentSchemaBuilder {
    pub fn new(doc_type: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            schema: DocumentSchema {
                doc_type: doc_type.into(),
                collection: collection.into(),
                fields: Vec::new(),
                indexes: Vec::new(),
                types: Vec::new(),
            },
        }
    }

    /// Declares a field. Redeclaring a name replaces the earlier kind.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let descriptor = FieldDescriptor::new(name, kind);
        match self.schema.fields.iter_mut().find(|f| f.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.schema.fields.push(descriptor),
        }
        self
    }

    pub fn scalar(self, name: impl Into<String>, scalar: ScalarType) -> Self {
        self.field(name, FieldKind::Scalar(scalar))
    }

    pub fn index(mut self, field: impl Into<String>, unique: bool) -> Self {
        self.schema.indexes.push(IndexSpec { field: field.into(), unique });
        self
    }

    /// Also matches documents of the given subtype when querying a restricted schema.
    pub fn includes_type(mut self, doc_type: impl Into<String>) -> Self {
        self.schema.types.push(doc_type.into());
        self
    }

    pub fn build(self) -> DocumentSchema {
        self.schema
    }
}

/// Keeps the trailing path segment of a URI: `http://host/users/42/` gives `42`.
pub fn trailing_segment(value: &str) -> &str {
    let value = value
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let path = match value.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or_default(),
        None => value,
    };
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// The referenced id held by a JSON reference value: an id, a URI or a
/// `{"$ref", "$id"}` token.
pub fn reference_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(trailing_segment(s).to_string()),
        Value::Object(map) => map
            .get("$id")
            .or_else(|| map.get("id"))
            .and_then(reference_id),
        _ => None,
    }
}

/// The referenced id held by a stored reference value.
pub fn stored_reference_id(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) => Some(s.clone()),
        Bson::Document(doc) => doc
            .get("$id")
            .or_else(|| doc.get("id"))
            .and_then(stored_reference_id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trailing_segment_strips_scheme_and_query() {
        assert_eq!(trailing_segment("http://api.local/users/42/"), "42");
        assert_eq!(trailing_segment("/users/42?x=1"), "42");
        assert_eq!(trailing_segment("42"), "42");
        assert_eq!(trailing_segment(""), "");
    }

    #[test]
    fn reference_ids_accept_tokens_and_uris() {
        assert_eq!(reference_id(&json!({ "$ref": "users", "$id": "abc" })), Some("abc".into()));
        assert_eq!(reference_id(&json!("/users/abc")), Some("abc".into()));
        assert_eq!(reference_id(&json!(3)), None);
    }

    #[test]
    fn coercion_falls_back_to_strings() {
        assert_eq!(ScalarType::Int.coerce("42"), Bson::Int64(42));
        assert_eq!(ScalarType::Int.coerce("forty"), Bson::String("forty".into()));
        assert_eq!(ScalarType::Bool.coerce("false"), Bson::Boolean(false));
        assert_eq!(ScalarType::String.coerce("42"), Bson::String("42".into()));
    }

    #[test]
    fn subtype_shares_collection_and_restricts_type() {
        let base = DocumentSchema::builder("User", "users")
            .scalar("nick", ScalarType::String)
            .build();
        let admin = DocumentSchema::subtype("Admin", &base)
            .scalar("level", ScalarType::Int)
            .build();

        assert_eq!(admin.collection(), "users");
        assert_eq!(admin.storage_fields().collect::<Vec<_>>(), vec!["nick", "level"]);
        assert!(base.type_filter().is_none());
        assert_eq!(admin.type_filter(), Some(Filter::one_of("_cls", [Bson::from("Admin")])));
    }
}
