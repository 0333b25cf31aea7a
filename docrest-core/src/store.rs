//! Document store handles.
//!
//! - [`DocumentStore`] - Store bound to a concrete backend type
//! - [`DynDocumentStore`] - Owned store over a boxed backend, for runtime backend selection
//! - [`DynDocumentStoreRef`] - Borrowed, type-erased view used by the resource layer
//!
//! Stores are constructed explicitly by the host process, handed to every resource
//! operation, and closed with `shutdown` when the process stops.
//!
//! # Example
//!
//! ```ignore
//! use docrest_core::store::{AsDynDocumentStore, DocumentStore};
//!
//! let store = DocumentStore::new(backend);
//! let users = store.collection("users");
//! let total = users.count(None).await?;
//! store.shutdown().await?;
//! ```

use crate::{
    backend::{DynStoreBackend, StoreBackend},
    collection::Collection,
    error::DocumentStoreResult,
};

/// A document store bound to a specific backend implementation.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend + 'static> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets a handle to the collection with the given name.
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a> {
        Collection::new(name.to_string(), &self.backend)
    }

    /// Creates a new collection with the given name.
    pub async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.create_collection(name).await
    }

    /// Drops (deletes) a collection with the given name.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    /// Lists all collections in the store.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts down the store and releases backend resources.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}

#[derive(Debug)]
pub struct DynDocumentStore {
    backend: Box<dyn DynStoreBackend>,
}

impl DynDocumentStore {
    /// Creates a new dynamic document store with the given backend trait object.
    pub fn new(backend: Box<dyn DynStoreBackend>) -> Self {
        Self { backend }
    }

    /// Gets a handle to the collection with the given name.
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a> {
        Collection::new(name.to_string(), &*self.backend)
    }

    /// Shuts down the store and releases backend resources.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown_boxed().await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DynDocumentStoreRef<'a> {
    backend: &'a dyn DynStoreBackend,
}

impl<'a> DynDocumentStoreRef<'a> {
    /// Creates a reference to a dynamic document store.
    pub fn new(backend: &'a dyn DynStoreBackend) -> Self {
        Self { backend }
    }

    /// Gets a handle to the collection with the given name.
    pub fn collection(&self, name: &str) -> Collection<'a> {
        Collection::new(name.to_string(), self.backend)
    }
}

/// Conversion trait for borrowing any store as a [`DynDocumentStoreRef`].
pub trait AsDynDocumentStore {
    /// Converts this store to a dynamic reference.
    fn as_dyn<'a>(&'a self) -> DynDocumentStoreRef<'a>;
}

/// Conversion trait for converting a document store into a dynamic owned store.
pub trait IntoDynDocumentStore {
    /// Converts this store into a dynamic owned store.
    fn into_dyn(self) -> DynDocumentStore;
}

impl<B: StoreBackend + 'static> AsDynDocumentStore for DocumentStore<B> {
    fn as_dyn<'a>(&'a self) -> DynDocumentStoreRef<'a> {
        DynDocumentStoreRef::new(&self.backend)
    }
}

impl AsDynDocumentStore for DynDocumentStore {
    fn as_dyn<'a>(&'a self) -> DynDocumentStoreRef<'a> {
        DynDocumentStoreRef::new(&*self.backend)
    }
}

impl<'a> AsDynDocumentStore for DynDocumentStoreRef<'a> {
    fn as_dyn<'b>(&'b self) -> DynDocumentStoreRef<'b> {
        DynDocumentStoreRef::new(self.backend)
    }
}

impl<T: AsDynDocumentStore + ?Sized> AsDynDocumentStore for &T {
    fn as_dyn<'a>(&'a self) -> DynDocumentStoreRef<'a> {
        (**self).as_dyn()
    }
}

impl<B: StoreBackend + 'static> IntoDynDocumentStore for DocumentStore<B> {
    fn into_dyn(self) -> DynDocumentStore {
        DynDocumentStore::new(Box::new(self.backend))
    }
}

impl IntoDynDocumentStore for DynDocumentStore {
    fn into_dyn(self) -> DynDocumentStore {
        self
    }
}
