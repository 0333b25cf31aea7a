//! Resource definitions.
//!
//! A [`ResourceSpec`] is built once per resource with [`ResourceBuilder`] and is
//! immutable afterwards. Building compiles the declared filters into a
//! field → suffix → operator table, checks the rename map is injective and
//! validates the URI prefix, so configuration mistakes surface when the resource
//! is defined rather than when a request arrives.
//!
//! # Example
//!
//! ```ignore
//! let users = ResourceSpec::builder("users", schema)
//!     .fields(["id", "nick", "listfield"])
//!     .rename("listfield", "list")
//!     .filter("nick", [Operator::exact(), Operator::ne().negatable()])
//!     .allowed_ordering(["nick"])
//!     .build()?;
//! ```

use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use docrest_core::document::{ID_FIELD, Object};

use crate::{
    config::{FilterPolicy, NotFieldsPolicy, PaginationPolicy, ResourceConfig},
    error::{ResourceError, ResourceResult},
    field::{ComputedFn, DocumentSchema},
    operator::{FilterOperator, OperatorRegistry},
    validate::Validator,
};

/// Resolves fields found neither on the resource nor on the object.
pub type FallbackFn = Arc<dyn Fn(&Object, &str) -> Option<Value> + Send + Sync>;

/// field → suffix → operator. The exact operator is also reachable under `""`.
pub(crate) type FilterTable = BTreeMap<String, BTreeMap<String, Arc<dyn FilterOperator>>>;

/// Storage name ↔ public name mapping. Both directions are injective.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Renames {
    forward: BTreeMap<String, String>,
    reverse: BTreeMap<String, String>,
}

impl Renames {
    pub fn new(renames: impl IntoIterator<Item = (String, String)>) -> ResourceResult<Self> {
        let mut forward = BTreeMap::new();
        let mut reverse = BTreeMap::new();

        for (internal, public) in renames {
            if let Some(other) = reverse.insert(public.clone(), internal.clone()) {
                if other != internal {
                    return Err(ResourceError::Configuration(format!(
                        "fields \"{other}\" and \"{internal}\" are both renamed to \"{public}\""
                    )));
                }
            }
            forward.insert(internal, public);
        }

        // a later declaration for the same storage field leaves a stale reverse entry
        if forward.len() != reverse.len() {
            return Err(ResourceError::Configuration(
                "a field is renamed more than once".to_string(),
            ));
        }

        Ok(Self { forward, reverse })
    }

    /// Public name of a storage field.
    pub fn public<'a>(&'a self, internal: &'a str) -> &'a str {
        self.forward.get(internal).map(String::as_str).unwrap_or(internal)
    }

    /// Storage name of a public field.
    pub fn internal<'a>(&'a self, public: &'a str) -> &'a str {
        self.reverse.get(public).map(String::as_str).unwrap_or(public)
    }

    /// `(storage, public)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forward.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// A compiled resource definition.
pub struct ResourceSpec {
    pub(crate) name: String,
    pub(crate) schema: DocumentSchema,
    pub(crate) fields: Vec<String>,
    pub(crate) optional_fields: Vec<String>,
    pub(crate) renames: Renames,
    pub(crate) filters: FilterTable,
    pub(crate) allowed_ordering: Vec<String>,
    pub(crate) pagination: PaginationPolicy,
    pub(crate) filter_policy: FilterPolicy,
    pub(crate) not_fields_policy: NotFieldsPolicy,
    pub(crate) uri_prefix: Option<String>,
    pub(crate) validator: Option<Arc<dyn Validator>>,
    pub(crate) methods: HashMap<String, ComputedFn>,
    pub(crate) fallback: Option<FallbackFn>,
    pub(crate) related: HashMap<String, Arc<ResourceSpec>>,
    pub(crate) children: HashMap<String, Arc<ResourceSpec>>,
    pub(crate) default_child: Option<String>,
}

impl ResourceSpec {
    pub fn builder(name: impl Into<String>, schema: DocumentSchema) -> ResourceBuilder {
        ResourceBuilder::new(name, schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &DocumentSchema {
        &self.schema
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn optional_fields(&self) -> &[String] {
        &self.optional_fields
    }

    pub fn renames(&self) -> &Renames {
        &self.renames
    }

    pub fn pagination(&self) -> &PaginationPolicy {
        &self.pagination
    }

    pub fn uri_prefix(&self) -> Option<&str> {
        self.uri_prefix.as_deref()
    }

    /// URI of the object with the given id.
    pub fn uri(&self, id: impl fmt::Display) -> ResourceResult<String> {
        match &self.uri_prefix {
            Some(prefix) => Ok(format!("{prefix}{id}")),
            None => Err(ResourceError::Configuration(format!(
                "resource \"{}\" has no uri prefix",
                self.name
            ))),
        }
    }

    /// Operator suffixes declared for a filterable field.
    pub fn filter_suffixes(&self, field: &str) -> Option<impl Iterator<Item = &str>> {
        self.filters
            .get(field)
            .map(|ops| ops.keys().map(String::as_str))
    }

    /// The delegate resource for a concrete document type, if it is not this resource.
    pub fn subresource_for(&self, doc_type: &str) -> Option<&Arc<ResourceSpec>> {
        self.children
            .get(doc_type)
            .filter(|child| child.name != self.name)
    }

    /// Like [`ResourceSpec::subresource_for`], falling back to the default child.
    pub(crate) fn subresource_or_default(&self, doc_type: Option<&str>) -> Option<&Arc<ResourceSpec>> {
        doc_type
            .and_then(|doc_type| self.children.get(doc_type))
            .or_else(|| {
                self.default_child
                    .as_deref()
                    .and_then(|doc_type| self.children.get(doc_type))
            })
            .filter(|child| child.name != self.name)
    }

    /// The child resource named `name`, or the child it is nested under.
    pub(crate) fn child_named(&self, name: &str) -> Option<&Arc<ResourceSpec>> {
        self.children.values().find(|child| {
            child.name != self.name && (child.name == name || child.child_named(name).is_some())
        })
    }
}

impl fmt::Debug for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSpec")
            .field("name", &self.name)
            .field("doc_type", &self.schema.doc_type())
            .field("fields", &self.fields)
            .field("renames", &self.renames)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("pagination", &self.pagination)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResourceSpec`].
pub struct ResourceBuilder {
    name: String,
    schema: DocumentSchema,
    fields: Option<Vec<String>>,
    optional_fields: Vec<String>,
    renames: Vec<(String, String)>,
    filters: Vec<(String, Arc<dyn FilterOperator>)>,
    allowed_ordering: Vec<String>,
    pagination: PaginationPolicy,
    filter_policy: FilterPolicy,
    not_fields_policy: NotFieldsPolicy,
    uri_prefix: Option<String>,
    validator: Option<Arc<dyn Validator>>,
    methods: HashMap<String, ComputedFn>,
    fallback: Option<FallbackFn>,
    related: HashMap<String, Arc<ResourceSpec>>,
    children: HashMap<String, Arc<ResourceSpec>>,
    default_child: Option<String>,
}

impl ResourceBuilder {
    pub fn new(name: impl Into<String>, schema: DocumentSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            fields: None,
            optional_fields: Vec::new(),
            renames: Vec::new(),
            filters: Vec::new(),
            allowed_ordering: Vec::new(),
            pagination: PaginationPolicy::default(),
            filter_policy: FilterPolicy::default(),
            not_fields_policy: NotFieldsPolicy::default(),
            uri_prefix: None,
            validator: None,
            methods: HashMap::new(),
            fallback: None,
            related: HashMap::new(),
            children: HashMap::new(),
            default_child: None,
        }
    }

    /// Fields returned by default. Without this, `id` and every declared field.
    pub fn fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Fields returned only when named in `_fields` or under `_fields=_all`.
    pub fn optional_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.optional_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Exposes the storage field `internal` as `public`.
    pub fn rename(mut self, internal: impl Into<String>, public: impl Into<String>) -> Self {
        self.renames.push((internal.into(), public.into()));
        self
    }

    /// Declares operators for a field, addressed by its public name.
    pub fn filter<O>(mut self, field: impl Into<String>, operators: impl IntoIterator<Item = O>) -> Self
    where
        O: FilterOperator + 'static,
    {
        let field = field.into();
        for operator in operators {
            self.filters.push((field.clone(), Arc::new(operator)));
        }
        self
    }

    /// Declares an already shared operator for a field.
    pub fn filter_with(mut self, field: impl Into<String>, operator: Arc<dyn FilterOperator>) -> Self {
        self.filters.push((field.into(), operator));
        self
    }

    pub fn allowed_ordering(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_ordering = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn pagination(mut self, pagination: PaginationPolicy) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn filter_policy(mut self, policy: FilterPolicy) -> Self {
        self.filter_policy = policy;
        self
    }

    pub fn not_fields_policy(mut self, policy: NotFieldsPolicy) -> Self {
        self.not_fields_policy = policy;
        self
    }

    /// Filter values and unsaved references are read as URIs under this prefix.
    pub fn uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.uri_prefix = Some(prefix.into());
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// A computed value served under `field`, taking precedence over stored fields.
    pub fn method(
        mut self,
        field: impl Into<String>,
        f: impl Fn(&Object) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.methods.insert(field.into(), Arc::new(f));
        self
    }

    pub fn fallback(mut self, f: impl Fn(&Object, &str) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.fallback = Some(Arc::new(f));
        self
    }

    /// Serializes prefetched objects referenced by `field` through `resource`.
    pub fn related(mut self, field: impl Into<String>, resource: Arc<ResourceSpec>) -> Self {
        self.related.insert(field.into(), resource);
        self
    }

    /// Delegates objects of the child's document type to the child resource.
    pub fn child(mut self, resource: Arc<ResourceSpec>) -> Self {
        self.children
            .insert(resource.schema.doc_type().to_string(), resource);
        self
    }

    /// Document type used for creates whose payload names no registered type.
    pub fn default_child(mut self, doc_type: impl Into<String>) -> Self {
        self.default_child = Some(doc_type.into());
        self
    }

    /// Applies a declarative configuration. Operator names are resolved in `registry`.
    pub fn with_config(mut self, config: ResourceConfig, registry: &OperatorRegistry) -> ResourceResult<Self> {
        if let Some(pagination) = config.pagination {
            self.pagination = pagination;
        }
        if let Some(fields) = config.fields {
            self.fields = Some(fields);
        }
        if !config.optional_fields.is_empty() {
            self.optional_fields = config.optional_fields;
        }
        if !config.allowed_ordering.is_empty() {
            self.allowed_ordering = config.allowed_ordering;
        }
        self.renames.extend(config.rename_fields);
        for (field, operators) in config.filters {
            for operator in operators {
                let resolved = registry
                    .resolve(operator.name(), operator.negatable())
                    .ok_or_else(|| {
                        ResourceError::Configuration(format!(
                            "unknown operator \"{}\" for field \"{field}\"",
                            operator.name()
                        ))
                    })?;
                self.filters.push((field.clone(), resolved));
            }
        }
        if let Some(prefix) = config.uri_prefix {
            self.uri_prefix = Some(prefix);
        }
        self.filter_policy = config.filter_policy;
        self.not_fields_policy = config.not_fields_policy;

        Ok(self)
    }

    pub fn build(self) -> ResourceResult<ResourceSpec> {
        let renames = Renames::new(self.renames)?;

        if let Some(prefix) = &self.uri_prefix {
            if !prefix.starts_with('/') || !prefix.ends_with('/') {
                return Err(ResourceError::Configuration(format!(
                    "uri prefix \"{prefix}\" must start and end with \"/\""
                )));
            }
        }

        let mut filters = FilterTable::new();
        for (field, operator) in self.filters {
            let suffixes = filters.entry(field.clone()).or_default();
            let name = operator.name().to_string();
            let mut names = vec![name.clone()];
            if name == "exact" {
                names.push(String::new());
            }
            for suffix in names {
                if suffixes.insert(suffix.clone(), operator.clone()).is_some() {
                    return Err(ResourceError::Configuration(format!(
                        "field \"{field}\" declares operator \"{name}\" more than once"
                    )));
                }
            }
        }

        if let Some(default_child) = &self.default_child {
            if !self.children.contains_key(default_child) {
                return Err(ResourceError::Configuration(format!(
                    "default child type \"{default_child}\" has no registered resource"
                )));
            }
        }

        let fields = self.fields.unwrap_or_else(|| {
            std::iter::once(ID_FIELD.to_string())
                .chain(self.schema.fields().iter().map(|field| field.name.clone()))
                .collect()
        });

        Ok(ResourceSpec {
            name: self.name,
            schema: self.schema,
            fields,
            optional_fields: self.optional_fields,
            renames,
            filters,
            allowed_ordering: self.allowed_ordering,
            pagination: self.pagination,
            filter_policy: self.filter_policy,
            not_fields_policy: self.not_fields_policy,
            uri_prefix: self.uri_prefix,
            validator: self.validator,
            methods: self.methods,
            fallback: self.fallback,
            related: self.related,
            children: self.children,
            default_child: self.default_child,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::ScalarType,
        operator::Operator,
        request::{Method, RequestContext},
    };
    use bson::{Bson, doc};
    use docrest_core::store::{AsDynDocumentStore, DocumentStore};
    use docrest_memory::InMemoryStore;
    use proptest::prelude::*;
    use serde_json::json;

    fn schema() -> DocumentSchema {
        DocumentSchema::builder("User", "users")
            .scalar("nick", ScalarType::String)
            .scalar("listfield", ScalarType::Any)
            .build()
    }

    #[test]
    fn default_fields_are_id_and_declared_fields() {
        let spec = ResourceSpec::builder("users", schema()).build().unwrap();
        assert_eq!(spec.fields(), ["id", "nick", "listfield"]);
    }

    #[test]
    fn rejects_non_injective_renames() {
        let err = ResourceSpec::builder("users", schema())
            .rename("nick", "name")
            .rename("listfield", "name")
            .build();
        assert!(matches!(err, Err(ResourceError::Configuration(_))));
    }

    #[test]
    fn rejects_duplicate_suffixes() {
        let err = ResourceSpec::builder("users", schema())
            .filter("nick", [Operator::exact(), Operator::boolean()])
            .build();
        assert!(matches!(err, Err(ResourceError::Configuration(_))));
    }

    #[test]
    fn exact_is_reachable_without_suffix() {
        let spec = ResourceSpec::builder("users", schema())
            .filter("nick", [Operator::exact(), Operator::ne()])
            .build()
            .unwrap();
        let suffixes: Vec<_> = spec.filter_suffixes("nick").unwrap().collect();
        assert_eq!(suffixes, vec!["", "exact", "ne"]);
    }

    #[test]
    fn uri_prefix_is_checked_and_used() {
        let err = ResourceSpec::builder("users", schema()).uri_prefix("/users").build();
        assert!(matches!(err, Err(ResourceError::Configuration(_))));

        let spec = ResourceSpec::builder("users", schema())
            .uri_prefix("/users/")
            .build()
            .unwrap();
        assert_eq!(spec.uri("42").unwrap(), "/users/42");

        let bare = ResourceSpec::builder("users", schema()).build().unwrap();
        assert!(matches!(bare.uri("42"), Err(ResourceError::Configuration(_))));
    }

    #[test]
    fn config_operators_must_exist() {
        let config = ResourceConfig::from_json(r#"{ "filters": { "nick": ["regex"] } }"#).unwrap();
        let err = ResourceSpec::builder("users", schema()).with_config(config, &OperatorRegistry::standard());
        assert!(matches!(err, Err(ResourceError::Configuration(_))));
    }

    #[tokio::test]
    async fn default_child_receives_creates_without_type() {
        let store = DocumentStore::new(InMemoryStore::new());
        let admin_schema = DocumentSchema::subtype("Admin", &schema())
            .scalar("level", ScalarType::Int)
            .build();
        let admins = Arc::new(ResourceSpec::builder("admins", admin_schema).build().unwrap());
        let users = ResourceSpec::builder("users", schema())
            .child(admins)
            .default_child("Admin")
            .build()
            .unwrap();

        let ctx = RequestContext::builder(Method::Create)
            .body(json!({ "nick": "z", "level": 2 }).to_string())
            .build()
            .unwrap();
        let cleaned = users.validate_request(&ctx, None).unwrap();
        assert_eq!(cleaned.resource(), "admins");

        let created = users.create_object(store.as_dyn(), &ctx, cleaned, true).await.unwrap();
        assert_eq!(created.object.doc_type(), "Admin");
        assert_eq!(created.object.get("level"), Some(&Bson::Int64(2)));
    }

    #[test]
    fn default_child_must_be_registered() {
        let err = ResourceSpec::builder("users", schema()).default_child("Admin").build();
        assert!(matches!(err, Err(ResourceError::Configuration(_))));
    }

    #[test]
    fn same_named_child_is_not_a_delegate() {
        let itself = Arc::new(ResourceSpec::builder("users", schema()).build().unwrap());
        let users = ResourceSpec::builder("users", schema())
            .child(itself)
            .build()
            .unwrap();

        assert!(users.subresource_for("User").is_none());
        assert!(users.subresource_or_default(Some("User")).is_none());
        assert!(users.child_named("users").is_none());

        let object = Object::from_fields("User", doc! { "nick": "z" });
        let ctx = RequestContext::builder(Method::Fetch).build().unwrap();
        let serialized = users.serialize(Some(&object), &ctx).unwrap();
        assert_eq!(
            Value::Object(serialized),
            json!({ "id": object.id().to_string(), "nick": "z" }),
        );
    }

    proptest! {
        #[test]
        fn renames_round_trip(names in proptest::collection::btree_set("[a-z]{1,8}", 1..8)) {
            let pairs: Vec<(String, String)> = names
                .iter()
                .map(|name| (name.clone(), format!("{name}_public")))
                .collect();
            let renames = Renames::new(pairs).unwrap();

            for name in &names {
                prop_assert_eq!(renames.internal(renames.public(name)), name.as_str());
            }
            prop_assert_eq!(renames.internal("unrenamed_x"), "unrenamed_x");
        }
    }
}
