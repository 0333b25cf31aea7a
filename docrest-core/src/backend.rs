//! Storage backend abstraction for the document store.
//!
//! This module defines the contract a document database has to fulfil for the
//! resource layer: find with filter/sort/skip/limit, count, write by id and index
//! management. Query execution and persistence live entirely behind it.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`DynStoreBackend`]: A trait for dynamic dispatch over backend implementations
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docrest_core::{backend::StoreBackend, query::{Filter, Query}};
//! use bson::{Uuid, Bson, doc};
//!
//! let backend = MyBackendImpl::new();
//!
//! let id = Uuid::new();
//! let doc = Bson::Document(doc! { "id": id.to_string(), "_cls": "User", "nick": "alice" });
//! backend.insert_documents(vec![(id, doc)], "users").await?;
//!
//! let total = backend.count_documents(Some(Filter::eq("nick", "alice")), "users").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Uuid};
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    query::{Expr, Query},
};

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Concurrent writes to the same document are not coordinated: the last
/// write wins.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Implementers should document which error variants may be returned by each operation.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents into a collection.
    ///
    /// The collection is created if it doesn't exist. Inserting an id that is already
    /// present is an error.
    async fn insert_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Replaces existing documents in a collection.
    async fn update_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Deletes documents from a collection by their IDs.
    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()>;

    /// Retrieves documents from a collection by their IDs.
    ///
    /// Missing ids are omitted from the result, and result order is not guaranteed to
    /// match request order.
    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Finds documents matching the query's filter, ordered by its sort keys and
    /// windowed by its offset and limit.
    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Counts documents matching `filter`, ignoring any window.
    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<usize>;

    /// Creates a new, empty collection.
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Drops a collection and all its documents.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Ensures an index on a field exists. Creating an index that already exists
    /// with the same options succeeds.
    async fn add_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> DocumentStoreResult<()>;

    /// Removes an index from a collection.
    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external
    /// connections should override this.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn insert_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;
    async fn update_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;
    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()>;
    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;
    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;
    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<usize>;
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;
    async fn add_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> DocumentStoreResult<()>;
    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()>;
    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()>;
}

#[async_trait]
impl<B: StoreBackend + Send + Sync + 'static> DynStoreBackend for B {
    async fn insert_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        StoreBackend::insert_documents(self, documents, collection).await
    }

    async fn update_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        StoreBackend::update_documents(self, documents, collection).await
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()> {
        StoreBackend::delete_documents(self, ids, collection).await
    }

    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        StoreBackend::get_documents(self, ids, collection).await
    }

    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        StoreBackend::query_documents(self, query, collection).await
    }

    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<usize> {
        StoreBackend::count_documents(self, filter, collection).await
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        StoreBackend::create_collection(self, name).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        StoreBackend::drop_collection(self, name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        StoreBackend::list_collections(self).await
    }

    async fn add_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> DocumentStoreResult<()> {
        StoreBackend::add_index(self, collection, field, unique).await
    }

    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        StoreBackend::drop_index(self, collection, field).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(*self).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
