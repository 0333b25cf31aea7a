//! Query construction and filtering API for document stores.
//!
//! A [`Query`] bundles an optional filter [`Expr`], an ordered list of [`Sort`] keys
//! and a skip/limit window. Backends execute queries through the [`QueryVisitor`]
//! trait, which walks the expression tree and produces a backend-native predicate.
//!
//! # Query Building
//!
//! ```ignore
//! use docrest_core::query::{Query, Filter, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("firstname", "Bob").and(Filter::gte("age", 18)))
//!     .sort("lastname", SortDirection::Asc)
//!     .offset(20)
//!     .limit(10)
//!     .build();
//! ```
//!
//! # Filter Expression API
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - Membership: `one_of`, `none_of`
//! - String: `starts_with`
//! - Logical: `and`, `not`
//!
//! Field names may be dotted paths (`address.city`) to address nested values.

use bson::Bson;

use crate::error::DocumentStoreError;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// A single sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name (or dotted path) to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to. Against an array field, matches when any element is equal.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String starts with the value. Never case-folded.
    StartsWith,
    /// Field equals one of the values in the array operand.
    In,
    /// Field equals none of the values in the array operand.
    NotIn,
}

/// A filter expression for querying documents.
///
/// Expressions compose under logical AND; an empty `And` matches every document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Field comparison expression.
    Field {
        /// The field name or dotted path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// The expression that matches every document.
    pub fn always() -> Self {
        Expr::And(Vec::new())
    }

    /// Returns true for an expression that places no constraint on documents.
    pub fn is_always(&self) -> bool {
        matches!(self, Expr::And(list) if list.iter().all(Expr::is_always))
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// A structured query for retrieving documents.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<Expr>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip.
    pub offset: Option<usize>,
    /// Sort keys, applied in order.
    pub sort: Vec<Sort>,
}

impl Query {
    /// Creates a new empty query with no filters or limits.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names as `Into<String>` and values as `Into<Bson>`.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the string field starts with the value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, Bson::String(value.into()))
    }

    /// Matches documents where the field equals any of the values.
    pub fn one_of(field: impl Into<String>, values: impl IntoIterator<Item = Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::In, Bson::Array(values.into_iter().collect()))
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of(field: impl Into<String>, values: impl IntoIterator<Item = Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotIn, Bson::Array(values.into_iter().collect()))
    }

    /// Combines multiple expressions such that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter expression. An always-true expression clears the filter.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = if filter.is_always() { None } else { Some(filter) };
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Appends a sort key. Earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Replaces all sort keys.
    pub fn sorts(mut self, sorts: impl IntoIterator<Item = Sort>) -> Self {
        self.query.sort = sorts.into_iter().collect();
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_appends_to_existing_conjunction() {
        let expr = Expr::always()
            .and(Filter::eq("a", 1))
            .and(Filter::ne("b", 2));

        assert_eq!(expr, Filter::and([Filter::eq("a", 1), Filter::ne("b", 2)]));
    }

    #[test]
    fn builder_drops_always_true_filter() {
        let query = Query::builder()
            .filter(Filter::and([Expr::always()]))
            .sort("a", SortDirection::Asc)
            .sort("b", SortDirection::Desc)
            .build();

        assert!(query.filter.is_none());
        assert_eq!(query.sort, vec![Sort::asc("a"), Sort::desc("b")]);
    }
}
