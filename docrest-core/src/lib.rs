//! Store-side foundations of docrest: the contract a document database has to offer
//! the resource layer, and the types that cross it.
//!
//! - **Object model** ([`document`]) - Stored documents with dirty-field tracking
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Query and filtering API** ([`query`]) - Filter expressions, sort keys and windows
//! - **Collections** ([`collection`]) - Raw and object-level operations on one collection
//! - **Document store** ([`store`]) - Explicitly constructed store handles
//! - **Pages** ([`page`]) - Windowed results with a total count and has-more flag
//! - **Error handling** ([`error`]) - Store error and result types
//!
//! # Example
//!
//! ```ignore
//! use docrest_core::{document::Object, query::{Filter, Query}, store::DocumentStore};
//!
//! let store = DocumentStore::new(backend);
//! let users = store.collection("users");
//!
//! let mut alice = Object::new("User");
//! alice.set("nick", "alice");
//! users.commit(&mut alice).await?;
//!
//! let found = users
//!     .find(Query::builder().filter(Filter::eq("nick", "alice")).build())
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrest_core;

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod page;
pub mod query;
pub mod store;
