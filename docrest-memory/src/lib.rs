//! In-memory document storage backend for docrest.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development,
//! tests and small deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **MongoDB-like matching** - Dotted paths, array membership and null-matches-missing
//! - **Full query support** - Filtering, multi-key sorting, skip/limit and counting
//! - **Index bookkeeping** - Declared indexes are recorded and unique ones enforced
//!
//! # Quick Start
//!
//! ```ignore
//! use docrest::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let users = store.collection("users");
//!
//!     let mut user = Object::new("User");
//!     user.set("nick", "alice");
//!     users.commit(&mut user).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrest_memory;

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
