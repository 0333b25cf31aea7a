//! Convenient re-exports of commonly used types from docrest.
//!
//! ```ignore
//! use docrest::prelude::*;
//! ```
//!
//! This provides access to:
//! - Objects, stores and store backends
//! - Query construction and result pages
//! - Resource definitions, schemas and filter operators
//! - Request contexts, validators and error types

pub use docrest_core::{
    backend::{DynStoreBackend, StoreBackend, StoreBackendBuilder},
    collection::Collection,
    document::{Object, bson_to_json, json_to_bson},
    error::{DocumentStoreError, DocumentStoreResult},
    page::{Page, PageBuilder},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    store::{AsDynDocumentStore, DocumentStore, DynDocumentStore, DynDocumentStoreRef, IntoDynDocumentStore},
};

pub use docrest_resource::prelude::*;
