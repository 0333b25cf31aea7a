//! MongoDB backend implementation for docrest.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Filter expressions are translated into native MongoDB query documents, so
//! filtering, sorting, windowing and counting all run inside the database.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docrest = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docrest::{backend::StoreBackendBuilder, mongodb::MongoDbStore, store::DocumentStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let store = DocumentStore::new(backend);
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrest_mongodb;

pub mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
