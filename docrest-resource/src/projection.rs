//! Serializes stored objects into JSON responses.
//!
//! Each requested field is resolved through an ordered chain: a resource method
//! of that name, then the field table (id, computed fields, stored values by
//! declared kind), then the resource fallback. A field that none of them can
//! produce is left out of the response.

use bson::{Bson, Uuid};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::debug;

use docrest_core::{
    document::{ID_FIELD, Object, bson_to_json},
    page::Page,
    query::{Filter, Query},
    store::DynDocumentStoreRef,
};

use crate::{
    config::NotFieldsPolicy,
    error::{ResourceError, ResourceResult, ValidationError},
    field::{FieldKind, stored_reference_id},
    request::{FIELDS_PARAM, NOT_FIELDS_PARAM, Params, RequestContext, split_list},
    resource::ResourceSpec,
};

const ALL_FIELDS: &str = "_all";

/// Objects loaded ahead of serialization, keyed by collection and id.
#[derive(Debug, Clone, Default)]
pub struct RelatedObjects {
    objects: HashMap<(String, String), Object>,
}

impl RelatedObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: impl Into<String>, object: Object) {
        self.objects
            .insert((collection.into(), object.id().to_string()), object);
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<&Object> {
        self.objects.get(&(collection.to_string(), id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ResourceSpec {
    /// Serializes an object with the field selection of the request.
    /// An absent object serializes to an empty map.
    pub fn serialize(&self, object: Option<&Object>, ctx: &RequestContext) -> ResourceResult<Map<String, Value>> {
        self.serialize_with(object, ctx, &RelatedObjects::new())
    }

    /// Like [`ResourceSpec::serialize`], rendering references found in `related`
    /// through their related resource.
    pub fn serialize_with(
        &self,
        object: Option<&Object>,
        ctx: &RequestContext,
        related: &RelatedObjects,
    ) -> ResourceResult<Map<String, Value>> {
        match object {
            Some(object) => self.serialize_selected(object, Some(ctx.params()), ctx.fields(), related),
            None => Ok(Map::new()),
        }
    }

    pub fn serialize_page(
        &self,
        page: &Page<Object>,
        ctx: &RequestContext,
        related: &RelatedObjects,
    ) -> ResourceResult<Page<Map<String, Value>>> {
        let items = page
            .items
            .iter()
            .map(|object| self.serialize_with(Some(object), ctx, related))
            .collect::<ResourceResult<Vec<_>>>()?;

        Ok(Page::builder(items)
            .with_count(page.count)
            .with_has_more(page.has_more)
            .build())
    }

    /// Storage names of the fields a response includes.
    ///
    /// `_fields` narrows the defaults to the named fields (public or storage
    /// names), `_fields=_all` adds the optional fields, and `_not_fields` removes
    /// fields afterwards. An explicit `fields` list replaces the defaults and
    /// is the only thing `_fields` can select from.
    pub fn requested_fields(&self, params: Option<&Params>, fields: Option<&[String]>) -> ResourceResult<Vec<String>> {
        let (defaults, selectable): (Vec<String>, Vec<String>) = match fields {
            Some(fields) => (fields.to_vec(), fields.to_vec()),
            None => {
                let mut selectable = self.fields.clone();
                selectable.extend(
                    self.optional_fields
                        .iter()
                        .filter(|field| !self.fields.contains(field))
                        .cloned(),
                );
                (self.fields.clone(), selectable)
            }
        };

        let only = params.and_then(|params| params.get(FIELDS_PARAM));
        let mut requested = match only {
            Some(only) if split_list(only).any(|field| field == ALL_FIELDS) => selectable,
            Some(only) => {
                let mut requested: Vec<String> = Vec::new();
                for field in split_list(only) {
                    let actual = self.renames.internal(field);
                    if selectable.iter().any(|f| f == actual) && !requested.iter().any(|f| f == actual) {
                        requested.push(actual.to_string());
                    }
                }
                requested
            }
            None => defaults,
        };

        if let Some(not_fields) = params.and_then(|params| params.get(NOT_FIELDS_PARAM)) {
            for name in split_list(not_fields) {
                let actual = self.renames.internal(name);
                match requested.iter().position(|field| field == actual) {
                    Some(index) => {
                        requested.remove(index);
                    }
                    None if self.not_fields_policy == NotFieldsPolicy::Reject => {
                        return Err(ValidationError::message(format!(
                            "Cannot exclude \"{name}\": the field is not part of the response."
                        ))
                        .into());
                    }
                    None => debug!(resource = %self.name, field = name, "ignoring _not_fields entry"),
                }
            }
        }

        Ok(requested)
    }

    fn serialize_selected(
        &self,
        object: &Object,
        params: Option<&Params>,
        fields: Option<&[String]>,
        related: &RelatedObjects,
    ) -> ResourceResult<Map<String, Value>> {
        if let Some(subresource) = self.subresource_for(object.doc_type()) {
            return subresource.serialize_selected(object, params, fields, related);
        }

        let mut data = Map::new();
        for field in self.requested_fields(params, fields)? {
            if let Some(value) = self.resolve_field(object, &field, related)? {
                data.insert(self.renames.public(&field).to_string(), value);
            }
        }

        Ok(data)
    }

    fn resolve_field(&self, object: &Object, field: &str, related: &RelatedObjects) -> ResourceResult<Option<Value>> {
        if let Some(method) = self.methods.get(field) {
            return Ok(Some(method(object)));
        }

        match self.field_value(object, field, related) {
            Ok(value) => Ok(Some(value)),
            Err(ResourceError::UnknownField(_)) => {
                let value = self
                    .fallback
                    .as_ref()
                    .and_then(|fallback| fallback(object, field));
                if value.is_none() {
                    debug!(resource = %self.name, field, id = %object.id(), "omitting unknown field");
                }
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }

    fn field_value(&self, object: &Object, field: &str, related: &RelatedObjects) -> ResourceResult<Value> {
        if field == ID_FIELD {
            return Ok(Value::String(object.id().to_string()));
        }

        let descriptor = self.schema.field(field);
        if let Some(FieldKind::Computed(compute)) = descriptor.map(|d| &d.kind) {
            return Ok(compute(object));
        }

        let value = object
            .get(field)
            .ok_or_else(|| ResourceError::UnknownField(field.to_string()))?;
        match descriptor {
            Some(descriptor) => self.serialize_value(field, &descriptor.kind, value, related),
            None => Ok(bson_to_json(value)?),
        }
    }

    fn serialize_value(&self, field: &str, kind: &FieldKind, value: &Bson, related: &RelatedObjects) -> ResourceResult<Value> {
        match (kind, value) {
            (FieldKind::Reference { collection }, value) => self.serialize_reference(field, collection, value, related),
            (FieldKind::List(inner), Bson::Array(items)) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.serialize_value(field, inner, item, related))
                    .collect::<ResourceResult<_>>()?,
            )),
            (FieldKind::Map(Some(inner)), Bson::Document(document)) => Ok(Value::Object(
                document
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.serialize_value(field, inner, item, related)?)))
                    .collect::<ResourceResult<_>>()?,
            )),
            (_, value) => Ok(bson_to_json(value)?),
        }
    }

    /// A reference renders as the prefetched object when one is available, as a
    /// URI when the related resource has a prefix, and as a `$ref` token otherwise.
    fn serialize_reference(
        &self,
        field: &str,
        collection: &str,
        value: &Bson,
        related: &RelatedObjects,
    ) -> ResourceResult<Value> {
        let Some(id) = stored_reference_id(value) else {
            return Ok(bson_to_json(value)?);
        };

        if let Some(resource) = self.related.get(field) {
            if let Some(target) = related.get(collection, &id) {
                return Ok(Value::Object(resource.serialize_selected(target, None, None, related)?));
            }
            if resource.uri_prefix.is_some() {
                return Ok(Value::String(resource.uri(&id)?));
            }
        }

        Ok(json!({ "$ref": collection, "$id": id }))
    }

    /// Loads the objects referenced by `objects` through fields bound to a
    /// related resource.
    pub async fn fetch_related(
        &self,
        store: DynDocumentStoreRef<'_>,
        objects: &[Object],
    ) -> ResourceResult<RelatedObjects> {
        let mut related = RelatedObjects::new();

        for field in self.related.keys() {
            let Some(descriptor) = self.schema.field(field) else {
                continue;
            };
            let collection = match &descriptor.kind {
                FieldKind::Reference { collection } => collection,
                FieldKind::List(inner) => match inner.as_ref() {
                    FieldKind::Reference { collection } => collection,
                    _ => continue,
                },
                _ => continue,
            };

            let mut ids = Vec::new();
            for value in objects.iter().filter_map(|object| object.get(field)) {
                let values: Vec<&Bson> = match value {
                    Bson::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                ids.extend(
                    values
                        .into_iter()
                        .filter_map(stored_reference_id)
                        .filter_map(|id| Uuid::parse_str(&id).ok()),
                );
            }
            if ids.is_empty() {
                continue;
            }

            let query = Query::builder()
                .filter(Filter::one_of(ID_FIELD, ids.iter().map(|id| Bson::String(id.to_string()))))
                .build();
            for object in store.collection(collection).find(query).await? {
                related.insert(collection.clone(), object);
            }
        }

        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::{DocumentSchema, ScalarType},
        request::Method,
    };
    use bson::doc;
    use std::sync::Arc;

    fn schema() -> DocumentSchema {
        DocumentSchema::builder("User", "users")
            .scalar("nick", ScalarType::String)
            .scalar("email", ScalarType::String)
            .field("listfield", FieldKind::list(FieldKind::Scalar(ScalarType::Int)))
            .field("friend", FieldKind::reference("users"))
            .field("scores", FieldKind::map(Some(FieldKind::reference("games"))))
            .field("shout", FieldKind::computed(|object| {
                json!(object.get("nick").and_then(Bson::as_str).unwrap_or_default().to_uppercase())
            }))
            .build()
    }

    fn user() -> Object {
        Object::from_fields(
            "User",
            doc! {
                "nick": "bob",
                "email": "bob@example.com",
                "listfield": [1, 2, 3],
                "friend": "9b4c1a2e-63e0-4f3e-9a39-1d3c8ad0f7a1",
                "scores": { "chess": "5f0c1a2e-63e0-4f3e-9a39-1d3c8ad0f7a1" },
            },
        )
    }

    fn ctx(params: &[(&str, &str)]) -> RequestContext {
        RequestContext::builder(Method::Fetch)
            .query(params.iter().copied())
            .build()
            .unwrap()
    }

    fn spec() -> ResourceSpec {
        ResourceSpec::builder("users", schema())
            .fields(["id", "nick", "listfield", "friend", "scores", "shout"])
            .optional_fields(["email"])
            .rename("listfield", "list")
            .build()
            .unwrap()
    }

    #[test]
    fn serializes_fields_by_kind() {
        let object = user();
        let data = spec().serialize(Some(&object), &ctx(&[])).unwrap();

        assert_eq!(data["id"], json!(object.id().to_string()));
        assert_eq!(data["list"], json!([1, 2, 3]));
        assert_eq!(
            data["friend"],
            json!({ "$ref": "users", "$id": "9b4c1a2e-63e0-4f3e-9a39-1d3c8ad0f7a1" }),
        );
        assert_eq!(data["scores"]["chess"]["$ref"], json!("games"));
        assert_eq!(data["shout"], json!("BOB"));
        assert!(!data.contains_key("email"));
        assert!(!data.contains_key("listfield"));
    }

    #[test]
    fn serialization_is_repeatable() {
        let object = user();
        let spec = spec();
        let ctx = ctx(&[("_fields", "nick,list")]);
        assert_eq!(
            spec.serialize(Some(&object), &ctx).unwrap(),
            spec.serialize(Some(&object), &ctx).unwrap(),
        );
    }

    #[test]
    fn absent_object_is_empty() {
        assert!(spec().serialize(None, &ctx(&[])).unwrap().is_empty());
    }

    #[test]
    fn field_selection_uses_public_names_and_optional_fields() {
        let spec = spec();
        let params: Params = [("_fields", "list,email,unknown")].into_iter().collect();
        assert_eq!(spec.requested_fields(Some(&params), None).unwrap(), vec!["listfield", "email"]);

        let params: Params = [("_fields", "_all"), ("_not_fields", "list,friend")].into_iter().collect();
        assert_eq!(
            spec.requested_fields(Some(&params), None).unwrap(),
            vec!["id", "nick", "scores", "shout", "email"],
        );
    }

    #[test]
    fn not_fields_policy_decides_unknown_exclusions() {
        let params: Params = [("_fields", "nick"), ("_not_fields", "email")].into_iter().collect();
        assert_eq!(spec().requested_fields(Some(&params), None).unwrap(), vec!["nick"]);

        let strict = ResourceSpec::builder("users", schema())
            .not_fields_policy(NotFieldsPolicy::Reject)
            .build()
            .unwrap();
        let err = strict.requested_fields(Some(&params), None).unwrap_err();
        assert!(err.as_validation().is_some());
    }

    #[test]
    fn methods_win_and_fallback_fills_gaps() {
        let spec = ResourceSpec::builder("users", schema())
            .fields(["nick", "karma", "missing"])
            .method("nick", |_| json!("masked"))
            .fallback(|_, field| (field == "karma").then(|| json!(42)))
            .build()
            .unwrap();

        let data = spec.serialize(Some(&user()), &ctx(&[])).unwrap();
        assert_eq!(Value::Object(data), json!({ "nick": "masked", "karma": 42 }));
    }

    #[test]
    fn subtypes_serialize_through_their_resource() {
        let admin_schema = DocumentSchema::subtype("Admin", &schema())
            .scalar("level", ScalarType::Int)
            .build();
        let admins = Arc::new(
            ResourceSpec::builder("admins", admin_schema)
                .fields(["nick", "level"])
                .build()
                .unwrap(),
        );
        let users = ResourceSpec::builder("users", schema())
            .fields(["nick"])
            .child(admins)
            .build()
            .unwrap();

        let admin = Object::from_fields("Admin", doc! { "nick": "root", "level": 3 });
        let data = users.serialize(Some(&admin), &ctx(&[])).unwrap();
        assert_eq!(Value::Object(data), json!({ "nick": "root", "level": 3 }));
    }

    #[test]
    fn prefetched_references_use_related_resource() {
        let friends = Arc::new(
            ResourceSpec::builder("friends", schema())
                .fields(["nick"])
                .build()
                .unwrap(),
        );
        let spec = ResourceSpec::builder("users", schema())
            .fields(["friend"])
            .related("friend", friends)
            .build()
            .unwrap();

        let mut friend = Object::with_id(
            Uuid::parse_str("9b4c1a2e-63e0-4f3e-9a39-1d3c8ad0f7a1").unwrap(),
            "User",
        );
        friend.set("nick", "alice");
        let mut related = RelatedObjects::new();
        related.insert("users", friend);

        let data = spec.serialize_with(Some(&user()), &ctx(&[]), &related).unwrap();
        assert_eq!(data["friend"], json!({ "nick": "alice" }));
    }
}
