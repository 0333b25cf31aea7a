//! Query expression evaluation for in-memory document filtering.
//!
//! Matching follows MongoDB semantics where the resource layer relies on them:
//! dotted paths address nested documents, an equality test against an array field
//! matches when any element is equal, and a missing field compares equal to null.

use bson::{Bson, datetime::DateTime};
use std::{cmp::Ordering, collections::HashMap};

use docrest_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so that Int32, Int64 and Double compare by value.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Bool(_) => 5,
            Comparable::DateTime(_) => 6,
        }
    }

    /// Total order used for sorting: by type rank first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dotted path inside a document.
pub(crate) fn resolve_path<'a>(document: &'a Bson, path: &str) -> Option<&'a Bson> {
    path.split('.').try_fold(document, |current, segment| match current {
        Bson::Document(doc) => doc.get(segment),
        _ => None,
    })
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Bson,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Bson) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<bool, DocumentStoreError> {
        self.visit_expr(expr)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Bson>,
        expr: &Expr,
    ) -> Vec<&'a Bson> {
        documents
            .into_iter()
            .filter(|doc| {
                DocumentEvaluator::new(doc)
                    .evaluate(expr)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Equality with array-element semantics: an array field matches a scalar
    /// operand when any element is equal.
    fn matches_value(field_value: &Comparable<'_>, operand: &Comparable<'_>) -> bool {
        if field_value == operand {
            return true;
        }

        match (field_value, operand) {
            (Comparable::Array(items), operand) if !matches!(operand, Comparable::Array(_)) => {
                items.iter().any(|item| item == operand)
            }
            _ => false,
        }
    }

    fn matches_any(field_value: &Comparable<'_>, operands: &Bson) -> bool {
        match operands {
            Bson::Array(values) => values
                .iter()
                .any(|value| Self::matches_value(field_value, &Comparable::from(value))),
            single => Self::matches_value(field_value, &Comparable::from(single)),
        }
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let field_value = resolve_path(self.document, field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let operand = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => Self::matches_value(&field_value, &operand),
            FieldOp::Ne => !Self::matches_value(&field_value, &operand),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                if matches!(field_value, Comparable::Null) {
                    return Ok(false);
                }
                match field_value.partial_cmp(&operand) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }
            FieldOp::StartsWith => match (&field_value, &operand) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::In => Self::matches_any(&field_value, value),
            FieldOp::NotIn => !Self::matches_any(&field_value, value),
        })
    }
}
