//! The stored object model.
//!
//! Resources work with schema-driven documents whose concrete type is only known
//! at runtime, so stored documents are represented as an [`Object`]: an id, a
//! concrete document type name and a BSON field map. An object remembers the state
//! it was last loaded or persisted with and which fields were modified since.
//!
//! On disk an object is a single BSON document:
//!
//! ```text
//! { "id": "<uuid>", "_cls": "<document type>", ...fields }
//! ```

use bson::{Bson, Document as BsonDocument, Uuid, ser::serialize_to_bson};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Key holding the object id in stored documents.
pub const ID_FIELD: &str = "id";

/// Key holding the concrete document type in stored documents.
pub const TYPE_FIELD: &str = "_cls";

/// A stored (or to-be-stored) document.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    id: Uuid,
    doc_type: String,
    fields: BsonDocument,
    stored: Option<BsonDocument>,
    dirty: BTreeSet<String>,
}

impl Object {
    /// Creates an empty, never persisted object with a fresh id.
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self::with_id(Uuid::new(), doc_type)
    }

    /// Creates an empty, never persisted object with the given id.
    pub fn with_id(id: Uuid, doc_type: impl Into<String>) -> Self {
        Self {
            id,
            doc_type: doc_type.into(),
            fields: BsonDocument::new(),
            stored: None,
            dirty: BTreeSet::new(),
        }
    }

    /// Creates a never persisted object populated from `fields`. Every field is dirty.
    pub fn from_fields(doc_type: impl Into<String>, fields: BsonDocument) -> Self {
        let mut object = Self::new(doc_type);
        for (field, value) in fields {
            object.set(field, value);
        }
        object
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    /// Name of the concrete document type.
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// Current value of a field.
    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &BsonDocument {
        &self.fields
    }

    /// Sets a field and marks it dirty.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Bson>) {
        let field = field.into();
        self.fields.insert(field.clone(), value.into());
        self.dirty.insert(field);
    }

    /// Value of a field as it was last loaded from or written to the store.
    pub fn stored_value(&self, field: &str) -> Option<&Bson> {
        self.stored.as_ref().and_then(|stored| stored.get(field))
    }

    /// Whether this object has ever been written to or loaded from a store.
    pub fn is_persisted(&self) -> bool {
        self.stored.is_some()
    }

    /// Fields set since the object was last loaded or persisted.
    pub fn dirty_fields(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Records the current state as persisted and clears dirty tracking.
    pub fn mark_clean(&mut self) {
        self.stored = Some(self.fields.clone());
        self.dirty.clear();
    }

    /// Converts this object to the BSON document written to the store.
    pub fn to_bson(&self) -> Bson {
        let mut document = BsonDocument::new();
        document.insert(ID_FIELD, self.id.to_string());
        document.insert(TYPE_FIELD, self.doc_type.clone());
        for (field, value) in &self.fields {
            document.insert(field.clone(), value.clone());
        }
        Bson::Document(document)
    }

    /// Reads an object back from a stored BSON document. The result counts as persisted.
    pub fn from_bson(bson: Bson) -> DocumentStoreResult<Self> {
        let Bson::Document(mut document) = bson else {
            return Err(DocumentStoreError::InvalidDocument("expected a document".into()));
        };

        let id = match document.remove(ID_FIELD) {
            Some(Bson::String(id)) => Uuid::parse_str(&id)
                .map_err(|e| DocumentStoreError::InvalidDocument(format!("bad id {id}: {e}")))?,
            _ => return Err(DocumentStoreError::InvalidDocument("missing id".into())),
        };
        let doc_type = match document.remove(TYPE_FIELD) {
            Some(Bson::String(doc_type)) => doc_type,
            _ => return Err(DocumentStoreError::InvalidDocument(format!("missing {TYPE_FIELD} in {id}"))),
        };

        Ok(Self {
            id,
            doc_type,
            stored: Some(document.clone()),
            fields: document,
            dirty: BTreeSet::new(),
        })
    }

    /// Current field values as JSON, without id and type.
    pub fn to_json_map(&self) -> DocumentStoreResult<Map<String, Value>> {
        self.fields
            .iter()
            .map(|(field, value)| Ok((field.clone(), bson_to_json(value)?)))
            .collect()
    }
}

/// Converts a BSON value into its JSON representation.
pub fn bson_to_json(value: &Bson) -> DocumentStoreResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Converts a JSON value into BSON for storage.
pub fn json_to_bson(value: &Value) -> DocumentStoreResult<Bson> {
    Ok(serialize_to_bson(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn bson_round_trip_restores_identity_and_state() {
        let mut object = Object::from_fields("User", doc! { "nick": "bob", "age": 30 });
        assert!(!object.is_persisted());
        assert_eq!(object.dirty_fields().len(), 2);

        object.mark_clean();
        let restored = Object::from_bson(object.to_bson()).unwrap();

        assert_eq!(restored.id(), object.id());
        assert_eq!(restored.doc_type(), "User");
        assert_eq!(restored.get("nick"), Some(&Bson::String("bob".into())));
        assert_eq!(restored.stored_value("age"), Some(&Bson::Int32(30)));
        assert!(!restored.is_dirty());
    }

    #[test]
    fn from_bson_rejects_documents_without_type() {
        let err = Object::from_bson(Bson::Document(doc! { "id": Uuid::new().to_string() }));
        assert!(matches!(err, Err(DocumentStoreError::InvalidDocument(_))));
    }
}
