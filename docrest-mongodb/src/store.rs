use async_trait::async_trait;
use bson::{Bson, Document, Uuid, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    options::{ClientOptions, FindOptions, IndexOptions},
};

use docrest_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query, QueryVisitor, SortDirection},
};

use crate::query::MongoQueryTranslator;

/// MongoDB storage backend. Documents are keyed by `_id`, which mirrors the object id.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

fn backend_error(err: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    fn prepare_document(&self, id: &Uuid, document: &Bson) -> DocumentStoreResult<Document> {
        let mut prepared = document
            .as_document()
            .cloned()
            .ok_or_else(|| DocumentStoreError::InvalidDocument("Expected document".into()))?;
        prepared.insert("_id", *id);

        Ok(prepared)
    }

    fn restore_document(&self, mut document: Document) -> Bson {
        document.remove("_id");
        Bson::Document(document)
    }

    fn translate(filter: Option<&Expr>) -> DocumentStoreResult<Document> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        self.get_collection(collection)
            .insert_many(
                documents
                    .iter()
                    .map(|(id, doc)| self.prepare_document(id, doc))
                    .collect::<DocumentStoreResult<Vec<Document>>>()?,
            )
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn update_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let mongo_collection = self.get_collection(collection);

        for (id, doc) in documents {
            let result = mongo_collection
                .replace_one(doc! { "_id": id }, self.prepare_document(&id, &doc)?)
                .await
                .map_err(backend_error)?;

            if result.matched_count == 0 {
                return Err(DocumentStoreError::DocumentNotFound(id.to_string(), collection.to_string()));
            }
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .delete_many(doc! { "_id": { "$in": ids } })
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        Ok(self
            .get_collection(collection)
            .find(doc! { "_id": { "$in": ids } })
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)?
            .into_iter()
            .map(|doc| self.restore_document(doc))
            .collect())
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        if !query.sort.is_empty() {
            options.sort = Some(
                query
                    .sort
                    .iter()
                    .map(|sort| {
                        let direction = match sort.direction {
                            SortDirection::Asc => 1,
                            SortDirection::Desc => -1,
                        };
                        (sort.field.clone(), Bson::Int32(direction))
                    })
                    .collect(),
            );
        }

        Ok(self
            .get_collection(collection)
            .find(Self::translate(query.filter.as_ref())?)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)?
            .into_iter()
            .map(|doc| self.restore_document(doc))
            .collect())
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<usize> {
        let count = self
            .get_collection(collection)
            .count_documents(Self::translate(filter.as_ref())?)
            .await
            .map_err(backend_error)?;

        Ok(count as usize)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.client
            .database(&self.database)
            .create_collection(name)
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)
    }

    async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { field: 1 })
                    .options(IndexOptions::builder().unique(unique).build())
                    .build(),
            )
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        // default name MongoDB gives a single-field ascending index
        self.get_collection(collection)
            .drop_index(format!("{field}_1"))
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        let client = Client::with_options(options)
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        Ok(MongoDbStore::new(client, self.database))
    }
}
