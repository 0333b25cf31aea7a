//! Collection handles.
//!
//! A [`Collection`] binds a collection name to a backend and offers two levels of
//! access: raw BSON operations mirroring the backend trait, and object operations
//! (`find`, `find_one`, `commit`, `reload`, `remove`) that work with [`Object`]s.
//!
//! # Example
//!
//! ```ignore
//! use docrest_core::{document::Object, store::{AsDynDocumentStore, DocumentStore}};
//!
//! let store = DocumentStore::new(backend);
//! let users = store.collection("users");
//!
//! let mut user = Object::new("User");
//! user.set("nick", "alice");
//! users.commit(&mut user).await?;
//! users.reload(&mut user).await?;
//! ```

use bson::{Bson, Uuid};

use crate::{
    backend::DynStoreBackend,
    document::Object,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
};

/// A collection with a reference to a backend trait object.
#[derive(Debug)]
pub struct Collection<'a> {
    name: String,
    backend: &'a dyn DynStoreBackend,
}

impl<'a> Collection<'a> {
    /// Creates a new collection reference (internal use).
    pub(crate) fn new(name: String, backend: &'a dyn DynStoreBackend) -> Self {
        Self { name, backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts new documents into the collection.
    pub async fn insert(&self, documents: Vec<(Uuid, Bson)>) -> DocumentStoreResult<()> {
        self.backend
            .insert_documents(documents, self.name())
            .await
    }

    /// Replaces existing documents in the collection.
    pub async fn update(&self, documents: Vec<(Uuid, Bson)>) -> DocumentStoreResult<()> {
        self.backend
            .update_documents(documents, self.name())
            .await
    }

    /// Deletes documents from the collection by their IDs.
    pub async fn delete(&self, ids: Vec<Uuid>) -> DocumentStoreResult<()> {
        self.backend
            .delete_documents(ids, self.name())
            .await
    }

    /// Retrieves documents from the collection by their IDs. Missing ids are omitted.
    pub async fn get(&self, ids: Vec<Uuid>) -> DocumentStoreResult<Vec<Bson>> {
        self.backend
            .get_documents(ids, self.name())
            .await
    }

    /// Queries documents in the collection using a structured query.
    pub async fn query(&self, query: Query) -> DocumentStoreResult<Vec<Bson>> {
        self.backend
            .query_documents(query, self.name())
            .await
    }

    /// Counts documents matching `filter`.
    pub async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<usize> {
        self.backend
            .count_documents(filter, self.name())
            .await
    }

    /// Ensures an index on `field` exists.
    pub async fn ensure_index(&self, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.backend
            .add_index(self.name(), field, unique)
            .await
    }

    /// Runs a query and decodes every result into an [`Object`].
    pub async fn find(&self, query: Query) -> DocumentStoreResult<Vec<Object>> {
        self.query(query)
            .await?
            .into_iter()
            .map(Object::from_bson)
            .collect()
    }

    /// Loads a single object by id.
    pub async fn find_one(&self, id: Uuid) -> DocumentStoreResult<Option<Object>> {
        match self.get(vec![id]).await?.into_iter().next() {
            Some(bson) => Ok(Some(Object::from_bson(bson)?)),
            None => Ok(None),
        }
    }

    /// Writes an object: insert when it was never persisted, update otherwise.
    ///
    /// A persisted object without dirty fields is not written. Dirty tracking is
    /// cleared on success.
    pub async fn commit(&self, object: &mut Object) -> DocumentStoreResult<()> {
        if !object.is_persisted() {
            self.insert(vec![(*object.id(), object.to_bson())]).await?;
        } else if object.is_dirty() {
            self.update(vec![(*object.id(), object.to_bson())]).await?;
        }

        object.mark_clean();

        Ok(())
    }

    /// Replaces the in-memory state of `object` with what is stored.
    pub async fn reload(&self, object: &mut Object) -> DocumentStoreResult<()> {
        *object = self
            .find_one(*object.id())
            .await?
            .ok_or_else(|| DocumentStoreError::DocumentNotFound(object.id().to_string(), self.name.clone()))?;

        Ok(())
    }

    /// Deletes the stored copy of `object`.
    pub async fn remove(&self, object: &Object) -> DocumentStoreResult<()> {
        self.delete(vec![*object.id()]).await
    }
}
