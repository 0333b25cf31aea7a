//! The resource layer of docrest.
//!
//! A [`ResourceSpec`](resource::ResourceSpec) exposes one stored document type as
//! a REST-style resource. It turns query-string parameters into store queries and
//! result pages, validates incoming payloads into storage updates, and projects
//! stored objects back to JSON.
//!
//! - **Schemas** ([`field`]) - Declared fields, kinds and indexes of a document type
//! - **Resources** ([`resource`]) - Per-resource configuration, renames and operator tables
//! - **Filtering** ([`filter`], [`operator`]) - `field__not__op=value` terms and the operators behind them
//! - **Assembly** ([`assembly`]) - Ordering, skip/limit and the has-more check
//! - **Projection** ([`projection`]) - Field selection and JSON serialization
//! - **Mutation** ([`mutation`]) - Validation, create, dirty-field update, bulk update and delete
//! - **Requests** ([`request`]) - Decoded parameters and body of one request
//! - **Configuration** ([`config`]) - Serde-loadable resource options
//! - **Errors** ([`error`]) - Validation and configuration errors
//!
//! # Example
//!
//! ```ignore
//! use docrest_resource::prelude::*;
//!
//! let schema = DocumentSchema::builder("User", "users")
//!     .scalar("nick", ScalarType::String)
//!     .scalar("age", ScalarType::Int)
//!     .build();
//!
//! let users = ResourceSpec::builder("users", schema)
//!     .rename("age", "years")
//!     .filter("years", [Operator::exact(), Operator::gt().negatable()])
//!     .allowed_ordering(["nick", "years"])
//!     .build()?;
//!
//! let ctx = RequestContext::builder(Method::List)
//!     .query([("years__not__gt", "30"), ("_order_by", "-years")])
//!     .build()?;
//!
//! let page = users.get_objects(store.as_dyn(), &ctx).await?;
//! let page = users.serialize_page(&page, &ctx, &RelatedObjects::new())?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrest_resource;

pub mod assembly;
pub mod config;
pub mod error;
pub mod field;
pub mod filter;
pub mod mutation;
pub mod operator;
pub mod projection;
pub mod registry;
pub mod request;
pub mod resource;
pub mod validate;

/// Commonly used types of the resource layer.
pub mod prelude {
    pub use crate::{
        assembly::Window,
        config::{FilterPolicy, NotFieldsPolicy, OperatorConfig, PaginationPolicy, ResourceConfig},
        error::{ResourceError, ResourceResult, ValidationError},
        field::{DocumentSchema, FieldKind, ScalarType},
        filter::FilterTerm,
        mutation::{CleanedData, MutationResult},
        operator::{FilterOperator, FilterValue, Operator, OperatorRegistry},
        projection::RelatedObjects,
        registry::ResourceRegistry,
        request::{Method, Params, RequestContext},
        resource::{ResourceBuilder, ResourceSpec},
        validate::{AcceptAll, RequiredFields, Validator},
    };
}
