//! Creating, updating and deleting objects from request payloads.
//!
//! A payload moves through `renamed → validated → object dict → applied →
//! persisted`. Updates only touch fields the client sent, and of those only the
//! ones whose value differs from the object's current value, so the changed set
//! of a [`MutationResult`] is exactly what the write modified.

use bson::{Bson, Document};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use tracing::info;

use docrest_core::{
    document::{Object, TYPE_FIELD, json_to_bson},
    store::DynDocumentStoreRef,
};

use crate::{
    error::{ResourceResult, ValidationError},
    field::{FieldKind, reference_id, stored_reference_id},
    request::{Method, PARAMS_KEY, RequestContext},
    resource::ResourceSpec,
    validate::JsonMap,
};

/// Validated payload, tagged with the resource that validated it.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedData {
    resource: String,
    data: JsonMap,
}

impl CleanedData {
    /// Name of the resource whose validator produced the data.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn data(&self) -> &JsonMap {
        &self.data
    }

    pub fn into_data(self) -> JsonMap {
        self.data
    }
}

/// An object after a create or update, with the fields the operation changed.
/// On create every provided field counts as changed.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    pub object: Object,
    pub changed: BTreeSet<String>,
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Value equality that ignores integer width and document key order.
fn bson_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| bson_equal(a, b))
        }
        (Bson::Document(a), Bson::Document(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| bson_equal(value, other)))
        }
        _ => match (as_number(a), as_number(b)) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
    }
}

impl ResourceSpec {
    /// Renames public payload keys to storage names. All keys are collected
    /// before any is written, so `a → b` and `b → c` never chain into `a → c`.
    pub fn rename_payload(&self, data: &mut JsonMap) {
        let moved: Vec<(String, Value)> = self
            .renames
            .iter()
            .filter_map(|(internal, public)| data.remove(public).map(|value| (internal.to_string(), value)))
            .collect();
        data.extend(moved);
    }

    /// Renames and validates the request payload.
    ///
    /// Creates are delegated to the child resource named by the payload's `_cls`
    /// (or the default child), updates to the child registered for the object's
    /// type.
    pub fn validate_request(&self, ctx: &RequestContext, object: Option<&Object>) -> ResourceResult<CleanedData> {
        let delegate = match (ctx.method(), object) {
            (Method::Create, _) => {
                self.subresource_or_default(ctx.raw_data().get(TYPE_FIELD).and_then(Value::as_str))
            }
            (Method::Update | Method::BulkUpdate, Some(object)) => self.subresource_for(object.doc_type()),
            _ => None,
        };
        if let Some(delegate) = delegate {
            return delegate.validate_request(ctx, object);
        }

        let mut data = ctx.raw_data().clone();
        data.remove(PARAMS_KEY);
        data.remove(TYPE_FIELD);
        self.rename_payload(&mut data);

        let existing = match (ctx.method(), object) {
            (Method::Update | Method::BulkUpdate, Some(object)) => Some(object.to_json_map()?),
            _ => None,
        };
        let data = match &self.validator {
            Some(validator) => validator.validate(&data, existing.as_ref())?,
            None => data,
        };

        Ok(CleanedData {
            resource: self.name.clone(),
            data,
        })
    }

    /// Cleaned values of declared storage fields. Updates are further limited to
    /// fields present in the raw payload.
    pub fn object_dict(&self, cleaned: &CleanedData, ctx: &RequestContext, update: bool) -> ResourceResult<Document> {
        let sent: Option<HashSet<&str>> = update.then(|| {
            ctx.raw_data()
                .keys()
                .map(|key| self.renames.internal(key))
                .collect()
        });

        let mut dict = Document::new();
        for descriptor in self.schema.fields().iter().filter(|d| d.kind.is_stored()) {
            if sent.as_ref().is_some_and(|sent| !sent.contains(descriptor.name.as_str())) {
                continue;
            }
            if let Some(value) = cleaned.data.get(&descriptor.name) {
                dict.insert(
                    descriptor.name.clone(),
                    self.to_storage(&descriptor.name, &descriptor.kind, value)?,
                );
            }
        }

        Ok(dict)
    }

    fn to_storage(&self, field: &str, kind: &FieldKind, value: &Value) -> ResourceResult<Bson> {
        match (kind, value) {
            (FieldKind::Reference { .. }, Value::Null) => Ok(Bson::Null),
            (FieldKind::Reference { .. }, value) => match reference_id(value) {
                Some(id) if !id.is_empty() => Ok(Bson::String(id)),
                _ => Err(ValidationError::default()
                    .with_field_error(field, "Invalid reference.")
                    .into()),
            },
            (FieldKind::List(inner), Value::Array(items)) => Ok(Bson::Array(
                items
                    .iter()
                    .map(|item| self.to_storage(field, inner, item))
                    .collect::<ResourceResult<_>>()?,
            )),
            (FieldKind::Map(Some(inner)), Value::Object(map)) => Ok(Bson::Document(
                map.iter()
                    .map(|(key, item)| Ok((key.clone(), self.to_storage(field, inner, item)?)))
                    .collect::<ResourceResult<_>>()?,
            )),
            (_, value) => Ok(json_to_bson(value)?),
        }
    }

    /// Builds a new object from cleaned data and, when `save` is set, persists it.
    pub async fn create_object(
        &self,
        store: DynDocumentStoreRef<'_>,
        ctx: &RequestContext,
        cleaned: CleanedData,
        save: bool,
    ) -> ResourceResult<MutationResult> {
        if cleaned.resource != self.name {
            if let Some(child) = self.child_named(&cleaned.resource) {
                return Box::pin(child.create_object(store, ctx, cleaned, save)).await;
            }
        }

        let dict = self.object_dict(&cleaned, ctx, false)?;
        let mut object = Object::from_fields(self.schema.doc_type(), dict);
        let changed = object.dirty_fields().clone();

        if save {
            self.save_object(store, &mut object).await?;
            info!(resource = %self.name, id = %object.id(), fields = ?changed, "created object");
        }

        Ok(MutationResult { object, changed })
    }

    /// Applies cleaned data to an existing object. Only fields whose value
    /// differs are set; references are compared by id.
    pub async fn update_object(
        &self,
        store: DynDocumentStoreRef<'_>,
        ctx: &RequestContext,
        mut object: Object,
        cleaned: CleanedData,
        save: bool,
    ) -> ResourceResult<MutationResult> {
        if let Some(subresource) = self.subresource_for(object.doc_type()) {
            return Box::pin(subresource.update_object(store, ctx, object, cleaned, save)).await;
        }

        let dict = self.object_dict(&cleaned, ctx, true)?;
        let mut changed = BTreeSet::new();

        for (field, value) in dict {
            let differs = match self.schema.field(&field).map(|d| &d.kind) {
                Some(FieldKind::Reference { .. }) => {
                    let current = object.stored_value(&field).or_else(|| object.get(&field));
                    current.and_then(stored_reference_id) != stored_reference_id(&value)
                }
                _ => !bson_equal(object.get(&field).unwrap_or(&Bson::Null), &value),
            };
            if differs {
                object.set(field.clone(), value);
                changed.insert(field);
            }
        }

        if save {
            self.save_object(store, &mut object).await?;
            info!(resource = %self.name, id = %object.id(), fields = ?changed, "updated object");
        }

        Ok(MutationResult { object, changed })
    }

    /// Ensures the schema's indexes, writes the object and reloads it.
    /// A persisted object without changes is not written.
    pub async fn save_object(&self, store: DynDocumentStoreRef<'_>, object: &mut Object) -> ResourceResult<()> {
        let collection = store.collection(self.schema.collection());

        for index in self.schema.indexes() {
            collection.ensure_index(&index.field, index.unique).await?;
        }
        collection.commit(object).await?;
        collection.reload(object).await?;

        Ok(())
    }

    pub async fn delete_object(&self, store: DynDocumentStoreRef<'_>, object: &Object) -> ResourceResult<()> {
        store
            .collection(self.schema.collection())
            .remove(object)
            .await?;
        info!(resource = %self.name, id = %object.id(), "deleted object");

        Ok(())
    }

    /// Updates every object matched by the request's filters with the payload.
    ///
    /// The matched set is capped by the bulk update limit. Every object is
    /// validated before the first write, so a validation failure writes nothing.
    pub async fn bulk_update(
        &self,
        store: DynDocumentStoreRef<'_>,
        ctx: &RequestContext,
    ) -> ResourceResult<Vec<MutationResult>> {
        let page = self.fetch_objects(store, ctx.params(), true).await?;

        let pending = page
            .items
            .into_iter()
            .map(|object| {
                let cleaned = self.validate_request(ctx, Some(&object))?;
                Ok((object, cleaned))
            })
            .collect::<ResourceResult<Vec<_>>>()?;

        let mut results = Vec::with_capacity(pending.len());
        for (object, cleaned) in pending {
            results.push(self.update_object(store, ctx, object, cleaned, true).await?);
        }

        Ok(results)
    }
}
