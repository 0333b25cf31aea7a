//! REST resources over JSON document databases.
//!
//! This crate is the primary entry point of docrest. It re-exports the store
//! contract from `docrest-core`, the resource layer from `docrest-resource` and
//! the available storage backends.
//!
//! # Features
//!
//! - **Filtering** - `field__not__op=value` query terms compiled into store filters
//! - **Ordering and pagination** - Whitelisted `_order_by`, bounded `_skip`/`_limit` and a has-more flag
//! - **Projection** - `_fields`/`_not_fields` selection, renamed fields, references as URIs or tokens
//! - **Dirty tracking** - Updates write and report only the fields whose value changed
//! - **Polymorphism** - Sub-resources for document subtypes sharing one collection
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docrest::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::new());
//!
//!     let schema = DocumentSchema::builder("User", "users")
//!         .scalar("nick", ScalarType::String)
//!         .scalar("age", ScalarType::Int)
//!         .index("nick", true)
//!         .build();
//!     let users = ResourceSpec::builder("users", schema)
//!         .filter("age", [Operator::exact(), Operator::gt().negatable()])
//!         .allowed_ordering(["nick", "age"])
//!         .validator(RequiredFields::new(["nick"]))
//!         .build()?;
//!
//!     // POST /users/
//!     let ctx = RequestContext::builder(Method::Create)
//!         .content_type("application/json")
//!         .body(r#"{"nick": "alice", "age": 31}"#)
//!         .build()?;
//!     let cleaned = users.validate_request(&ctx, None)?;
//!     let created = users.create_object(store.as_dyn(), &ctx, cleaned, true).await?;
//!     println!("{:?}", users.serialize(Some(&created.object), &ctx)?);
//!
//!     // GET /users/?age__not__gt=40&_order_by=-age&_limit=10
//!     let ctx = RequestContext::builder(Method::List)
//!         .query([("age__not__gt", "40"), ("_order_by", "-age"), ("_limit", "10")])
//!         .build()?;
//!     let page = users.get_objects(store.as_dyn(), &ctx).await?;
//!     let page = users.serialize_page(&page, &ctx, &RelatedObjects::new())?;
//!     println!("{} of {} users, more: {:?}", page.items.len(), page.count, page.has_more);
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Resource operations take a [`DynDocumentStoreRef`](store::DynDocumentStoreRef),
//! so the backend can be chosen at runtime. Any store converts with `as_dyn()`,
//! and `into_dyn()` erases the backend type of an owned store.
//!
//! ```ignore
//! let store = DocumentStore::new(InMemoryStore::new()).into_dyn();
//! let page = users.get_objects(store.as_dyn(), &ctx).await?;
//! ```
//!
//! # Configuration
//!
//! Resource options can be loaded from JSON and applied to a builder:
//!
//! ```ignore
//! let config = ResourceConfig::from_json(r#"{
//!     "pagination": { "enabled": true, "default_limit": 20, "max_limit": 50 },
//!     "rename_fields": { "age": "years" },
//!     "filters": { "years": ["exact", { "op": "gt", "negatable": true }] },
//!     "filter_policy": "strict"
//! }"#)?;
//!
//! let users = ResourceSpec::builder("users", schema)
//!     .with_config(config, &OperatorRegistry::standard())?
//!     .build()?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docrest_core::{backend, collection, document, error, page, query, store};
pub use docrest_resource::{
    assembly, config, field, filter, mutation, operator, projection, registry, request, resource, validate,
};

// Re-export BSON and JSON types for convenience
pub use bson;
pub use serde_json;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docrest_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docrest_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
