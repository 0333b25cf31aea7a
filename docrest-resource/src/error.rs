//! Error types for resource operations.
//!
//! [`ValidationError`] is the only error meant to reach API clients: it serializes
//! to the structured payload the transport layer returns as the response body.
//! The other [`ResourceError`] variants are either programmer errors found while a
//! resource is defined or failures of the underlying store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use docrest_core::error::DocumentStoreError;

/// A client-facing validation failure.
///
/// Serialized as `{"error": "..."}` for request-level problems and as
/// `{"errors": [...], "field-errors": {"field": [...]}}` for payload validation.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[error("{}", self.summary())]
pub struct ValidationError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(rename = "field-errors", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// A single request-level message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// A list of general messages.
    pub fn errors(errors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            errors: errors.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Adds a message for one field.
    pub fn with_field_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.error.is_none() && self.errors.is_empty() && self.field_errors.is_empty()
    }

    /// All messages on one line: the request-level message alone when there is
    /// one, otherwise general and per-field messages joined by `; `.
    pub fn summary(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }

        let mut messages = self.errors.clone();
        messages.extend(
            self.field_errors
                .iter()
                .map(|(field, errors)| format!("{field}: {}", errors.join(", "))),
        );
        if messages.is_empty() {
            "validation failed".to_string()
        } else {
            messages.join("; ")
        }
    }
}


/// Represents all possible errors of the resource layer.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The request or its payload is invalid. Returned to the client as is.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    /// A field could not be resolved on the object or the resource.
    #[error("Unknown field: {0}")]
    UnknownField(String),
    /// A filter used an operator, or a negation, the field does not allow.
    #[error("\"{0}\" is not a valid operator name.")]
    OperatorNotAllowed(String),
    /// A filter parameter does not address a filterable field.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    /// The resource definition itself is inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The document store failed.
    #[error(transparent)]
    Store(#[from] DocumentStoreError),
}

impl ResourceError {
    /// The validation payload, if this error should be shown to the client.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            ResourceError::Validation(err) => Some(err),
            _ => None,
        }
    }
}

/// A specialized `Result` type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_field_errors_under_dashed_key() {
        let err = ValidationError::errors(["bad payload"]).with_field_error("nick", "This field is required.");

        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "errors": ["bad payload"], "field-errors": { "nick": ["This field is required."] } }),
        );
        assert_eq!(err.to_string(), "bad payload; nick: This field is required.");
    }

    #[test]
    fn display_uses_summary() {
        let err = ValidationError::message("JSON data must be a dict.").with_field_error("nick", "ignored");
        assert_eq!(err.to_string(), err.summary());
        assert_eq!(err.to_string(), "JSON data must be a dict.");
        assert_eq!(ValidationError::default().to_string(), "validation failed");
    }

    #[test]
    fn message_serializes_as_error() {
        let err = ValidationError::message("JSON data must be a dict.");
        assert_eq!(serde_json::to_value(&err).unwrap(), json!({ "error": "JSON data must be a dict." }));
    }
}
