//! In-memory storage implementation for document stores.
//!
//! Documents live as BSON values in HashMaps behind async-safe read-write locks.

use async_trait::async_trait;
use bson::{Bson, Uuid};
use mea::rwlock::RwLock;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use docrest_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query, Sort, SortDirection},
};

use crate::evaluator::{Comparable, DocumentEvaluator, resolve_path};

type CollectionMap = HashMap<String, Bson>;
type StoreMap = HashMap<String, CollectionMap>;
/// collection name -> (indexed field -> unique)
type IndexMap = HashMap<String, BTreeMap<String, bool>>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses `Arc`-wrapped internal state, so clones
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection; indexes are only used to enforce
/// uniqueness.
///
/// # Example
///
/// ```ignore
/// use docrest_memory::InMemoryStore;
/// use docrest_core::backend::StoreBackend;
/// use bson::{Uuid, Bson, doc};
///
/// let store = InMemoryStore::new();
/// let id = Uuid::new();
/// let doc = Bson::Document(doc! { "id": id.to_string(), "_cls": "User", "nick": "alice" });
/// store.insert_documents(vec![(id, doc)], "users").await?;
///
/// let docs = store.get_documents(vec![id], "users").await?;
/// assert_eq!(docs.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> (document_id -> document)
    store: Arc<RwLock<StoreMap>>,
    indexes: Arc<RwLock<IndexMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Indexes declared on a collection, as `(field, unique)` pairs.
    pub async fn indexes(&self, collection: &str) -> Vec<(String, bool)> {
        self.indexes
            .read()
            .await
            .get(collection)
            .map(|fields| fields.iter().map(|(f, u)| (f.clone(), *u)).collect())
            .unwrap_or_default()
    }

    /// Fails when `document` would duplicate a value of a unique index held by
    /// another document of the collection.
    async fn check_unique(
        &self,
        collection: &str,
        collection_map: &CollectionMap,
        key: &str,
        document: &Bson,
    ) -> DocumentStoreResult<()> {
        let indexes = self.indexes.read().await;
        let Some(fields) = indexes.get(collection) else {
            return Ok(());
        };

        for field in fields.iter().filter(|(_, unique)| **unique).map(|(f, _)| f) {
            let Some(value) = resolve_path(document, field).filter(|v| !matches!(v, Bson::Null)) else {
                continue;
            };
            let duplicate = collection_map.iter().any(|(other_key, other)| {
                other_key != key
                    && resolve_path(other, field)
                        .map(|other_value| Comparable::from(other_value) == Comparable::from(value))
                        .unwrap_or(false)
            });
            if duplicate {
                return Err(DocumentStoreError::Backend(format!(
                    "duplicate value for unique index {collection}.{field}"
                )));
            }
        }

        Ok(())
    }
}

/// Compares two documents by a list of sort keys, earlier keys first.
fn compare_documents(a: &Bson, b: &Bson, sort: &[Sort]) -> Ordering {
    for key in sort {
        let left = resolve_path(a, &key.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let right = resolve_path(b, &key.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);

        let ordering = match key.direction {
            SortDirection::Asc => left.sort_cmp(&right),
            SortDirection::Desc => right.sort_cmp(&left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        for (id, doc) in documents {
            let key = id.to_string();

            if collection_map.contains_key(&key) {
                return Err(DocumentStoreError::DocumentAlreadyExists(key, collection.to_string()));
            }
            self.check_unique(collection, collection_map, &key, &doc).await?;

            collection_map.insert(key, doc);
        }

        Ok(())
    }

    async fn update_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = match store.get_mut(collection) {
            Some(col) => col,
            None => return Err(DocumentStoreError::CollectionNotFound(collection.to_string())),
        };

        for (id, doc) in documents {
            let key = id.to_string();

            if !collection_map.contains_key(&key) {
                return Err(DocumentStoreError::DocumentNotFound(key, collection.to_string()));
            }
            self.check_unique(collection, collection_map, &key, &doc).await?;

            collection_map.insert(key, doc);
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = match store.get_mut(collection) {
            Some(col) => col,
            None => return Err(DocumentStoreError::CollectionNotFound(collection.to_string())),
        };

        for id in ids {
            let key = id.to_string();

            if collection_map.remove(&key).is_none() {
                return Err(DocumentStoreError::DocumentNotFound(key, collection.to_string()));
            }
        }

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(vec![]);
        };

        Ok(ids
            .into_iter()
            .filter_map(|id| collection_map.get(&id.to_string()).cloned())
            .collect())
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut matched = match &query.filter {
            Some(filter) => DocumentEvaluator::filter_documents(collection_map.values(), filter),
            None => collection_map.values().collect(),
        };

        // HashMap iteration order is arbitrary; the id gives unsorted queries a stable order
        let mut sort = query.sort.clone();
        sort.push(Sort::asc("id"));
        matched.sort_by(|a, b| compare_documents(a, b, &sort));

        Ok(matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<usize> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(0);
        };

        Ok(match &filter {
            Some(filter) => DocumentEvaluator::filter_documents(collection_map.values(), filter).len(),
            None => collection_map.len(),
        })
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }
        self.indexes.write().await.remove(name);

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(self.store.read().await.keys().cloned().collect())
    }

    async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.indexes
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string(), unique);

        Ok(())
    }

    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        if let Some(fields) = self.indexes.write().await.get_mut(collection) {
            fields.remove(field);
        }

        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docrest_core::query::Filter;

    fn user(nick: &str, age: i32) -> (Uuid, Bson) {
        let id = Uuid::new();
        (id, Bson::Document(doc! { "id": id.to_string(), "_cls": "User", "nick": nick, "age": age }))
    }

    #[tokio::test]
    async fn query_sorts_by_several_keys_and_windows() {
        let store = InMemoryStore::new();
        store
            .insert_documents(vec![user("c", 30), user("a", 30), user("b", 20)], "users")
            .await
            .unwrap();

        let query = Query::builder()
            .sort("age", SortDirection::Desc)
            .sort("nick", SortDirection::Asc)
            .offset(1)
            .limit(5)
            .build();
        let nicks: Vec<_> = store
            .query_documents(query, "users")
            .await
            .unwrap()
            .into_iter()
            .map(|doc| resolve_path(&doc, "nick").cloned().unwrap())
            .collect();

        assert_eq!(nicks, vec![Bson::from("c"), Bson::from("b")]);
    }

    #[tokio::test]
    async fn count_ignores_window() {
        let store = InMemoryStore::new();
        store
            .insert_documents(vec![user("a", 10), user("b", 20), user("c", 30)], "users")
            .await
            .unwrap();

        let total = store
            .count_documents(Some(Filter::gte("age", 20)), "users")
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(store.count_documents(None, "missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicates() {
        let store = InMemoryStore::new();
        store.add_index("users", "nick", true).await.unwrap();
        store.insert_documents(vec![user("a", 10)], "users").await.unwrap();

        let err = store.insert_documents(vec![user("a", 11)], "users").await;
        assert!(matches!(err, Err(DocumentStoreError::Backend(_))));
        assert_eq!(store.indexes("users").await, vec![("nick".to_string(), true)]);
    }
}
