//! Resource policies and file-based resource configuration.
//!
//! # Example
//!
//! ```ignore
//! let config = ResourceConfig::from_json(r#"{
//!     "pagination": { "max_limit": 50 },
//!     "allowed_ordering": ["nick"],
//!     "rename_fields": { "listfield": "list" },
//!     "filters": { "nick": ["exact", { "op": "ne", "negatable": true }] },
//!     "filter_policy": "strict"
//! }"#)?;
//!
//! let users = ResourceSpec::builder("users", schema)
//!     .with_config(config, &OperatorRegistry::standard())?
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ResourceError, ResourceResult};

/// Skip/limit behavior of list requests and the bulk update cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationPolicy {
    /// When disabled, list requests return every matching row.
    pub enabled: bool,
    pub default_limit: usize,
    pub max_limit: usize,
    /// Bulk updates matching this many objects or more are refused.
    pub bulk_update_limit: usize,
}

impl Default for PaginationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            default_limit: 100,
            max_limit: 100,
            bulk_update_limit: 1000,
        }
    }
}

impl PaginationPolicy {
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }
}

/// How filter terms that cannot be applied are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPolicy {
    /// Unknown fields, undeclared operators and disallowed negations are dropped.
    #[default]
    Permissive,
    /// The same terms fail the request.
    Strict,
}

/// How `_not_fields` treats names that are not part of the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFieldsPolicy {
    #[default]
    Ignore,
    Reject,
}

/// An operator declaration in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperatorConfig {
    Name(String),
    Detailed {
        op: String,
        #[serde(default)]
        negatable: bool,
    },
}

impl OperatorConfig {
    pub fn name(&self) -> &str {
        match self {
            OperatorConfig::Name(name) => name,
            OperatorConfig::Detailed { op, .. } => op,
        }
    }

    pub fn negatable(&self) -> bool {
        matches!(self, OperatorConfig::Detailed { negatable: true, .. })
    }
}

/// Declarative part of a resource definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub pagination: Option<PaginationPolicy>,
    pub fields: Option<Vec<String>>,
    pub optional_fields: Vec<String>,
    pub allowed_ordering: Vec<String>,
    /// Storage field name to public name.
    pub rename_fields: BTreeMap<String, String>,
    pub filters: BTreeMap<String, Vec<OperatorConfig>>,
    pub uri_prefix: Option<String>,
    pub filter_policy: FilterPolicy,
    pub not_fields_policy: NotFieldsPolicy,
}

impl ResourceConfig {
    pub fn from_json(json: &str) -> ResourceResult<Self> {
        serde_json::from_str(json).map_err(|e| ResourceError::Configuration(e.to_string()))
    }
}
