//! Compiles query-string parameters into a filter expression.
//!
//! A parameter key has the form `<field>[__<path>..][__not][__<operator>]`, as in
//! `age__not__gt=30`. The field is the longest prefix of `__`-separated parts
//! naming a filterable field. The operator is taken from the last part when the
//! field declares it, a `not` right before it negates the term, and any parts
//! left in between address a nested path below the field.

use tracing::debug;

use docrest_core::query::Expr;

use crate::{
    config::FilterPolicy,
    error::{ResourceError, ResourceResult},
    field::{ScalarType, trailing_segment},
    operator::FilterValue,
    request::{Params, RESERVED_PARAMS},
    resource::ResourceSpec,
};

const SEPARATOR: &str = "__";
const NOT: &str = "not";

/// A parameter resolved against the filter table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTerm {
    /// Public name of the filterable field.
    pub field: String,
    /// Nested path parts below the field.
    pub path: Vec<String>,
    /// Operator suffix, `""` for the default.
    pub suffix: String,
    pub negate: bool,
}

impl ResourceSpec {
    /// Compiles every filter parameter into one conjunction.
    ///
    /// Terms that do not resolve are dropped under [`FilterPolicy::Permissive`]
    /// and fail the request under [`FilterPolicy::Strict`].
    pub fn compile_filters(&self, params: &Params) -> ResourceResult<Expr> {
        let mut filter = Expr::always();

        for (key, value) in params.iter() {
            if RESERVED_PARAMS.contains(&key) {
                continue;
            }
            match self.compile_term(key, value) {
                Ok(fragment) => filter = filter.and(fragment),
                Err(err) if self.filter_policy == FilterPolicy::Permissive => {
                    debug!(resource = %self.name, param = key, error = %err, "dropping filter term");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(filter)
    }

    /// Splits a parameter key into field, nested path, operator suffix and negation.
    pub fn parse_filter_key(&self, key: &str) -> ResourceResult<FilterTerm> {
        let parts: Vec<&str> = key.split(SEPARATOR).collect();

        let (len, field, suffixes) = (1..=parts.len())
            .rev()
            .find_map(|len| {
                let field = parts[..len].join(SEPARATOR);
                self.filters.get(&field).map(|suffixes| (len, field, suffixes))
            })
            .ok_or_else(|| ResourceError::InvalidFilter(key.to_string()))?;

        let mut rest = parts[len..].to_vec();
        let mut suffix = String::new();
        if let Some(last) = rest.last() {
            if suffixes.contains_key(*last) {
                suffix = last.to_string();
                rest.pop();
            }
        }
        let negate = rest.last() == Some(&NOT);
        if negate {
            rest.pop();
        }

        Ok(FilterTerm {
            field,
            path: rest.into_iter().map(str::to_string).collect(),
            suffix,
            negate,
        })
    }

    fn compile_term(&self, key: &str, value: &str) -> ResourceResult<Expr> {
        let term = self.parse_filter_key(key)?;

        let operator = self
            .filters
            .get(&term.field)
            .and_then(|suffixes| suffixes.get(&term.suffix))
            .ok_or_else(|| ResourceError::OperatorNotAllowed(term.suffix.clone()))?;
        if term.negate && !operator.allow_negation() {
            return Err(ResourceError::OperatorNotAllowed(format!("{}__{NOT}", operator.name())));
        }

        let internal = self.renames.internal(&term.field);
        let scalar = if term.path.is_empty() {
            self.schema
                .field(internal)
                .map(|field| field.kind.scalar_type())
                .unwrap_or_default()
        } else {
            ScalarType::Any
        };
        let storage_path = std::iter::once(internal)
            .chain(term.path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(".");

        Ok(operator.apply(&storage_path, &FilterValue::new(self.normalize_value(value), scalar), term.negate))
    }

    /// Empty strings stand for null and a quoted empty string for the empty
    /// string. Resources addressed by URI keep only the trailing path segment.
    fn normalize_value(&self, value: &str) -> Option<String> {
        let value = if self.uri_prefix.is_some() {
            trailing_segment(value)
        } else {
            value
        };

        match value {
            "" => None,
            "\"\"" | "''" => Some(String::new()),
            other => Some(other.to_string()),
        }
    }
}
