//! Filter operators.
//!
//! An operator turns one field, one raw query-string value and a negation flag
//! into a filter fragment. Operators never fail: the filter compiler decides
//! beforehand whether a term is allowed to reach them.
//!
//! | Operator     | Suffix       | Fragment                        | Negated              |
//! |--------------|--------------|---------------------------------|----------------------|
//! | `exact`      | `""`, `exact`| `field == v`                    | `field != v`         |
//! | `ne`         | `ne`         | `field != v`                    | `NOT(field != v)`    |
//! | `lt`/`lte`.. | same         | comparison                      | `NOT(comparison)`    |
//! | `in`         | `in`         | `field IN split(v)` or `== v`   | `NOT IN` or `!= v`   |
//! | `bool`       | `exact`      | `field == (v != "false")`       | flipped boolean      |
//! | `startswith` | `startswith` | prefix match                    | never allowed        |

use bson::Bson;
use std::{collections::BTreeMap, fmt, sync::Arc};

use docrest_core::query::{Expr, FieldOp};

use crate::field::ScalarType;

/// A raw filter value after normalization. `None` stands for null.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterValue {
    raw: Option<String>,
    scalar: ScalarType,
}

impl FilterValue {
    pub fn new(raw: Option<String>, scalar: ScalarType) -> Self {
        Self { raw, scalar }
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// The value coerced to the field's type.
    pub fn to_bson(&self) -> Bson {
        match &self.raw {
            Some(raw) => self.coerce(raw),
            None => Bson::Null,
        }
    }

    /// Coerces one piece of the raw value, such as an item of a comma list.
    pub fn coerce(&self, piece: &str) -> Bson {
        self.scalar.coerce(piece)
    }
}

/// A named predicate builder.
pub trait FilterOperator: Send + Sync {
    /// The suffix the operator is addressed by in parameter keys.
    fn name(&self) -> &str;

    fn allow_negation(&self) -> bool;

    fn apply(&self, field: &str, value: &FilterValue, negate: bool) -> Expr;
}

impl fmt::Debug for dyn FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterOperator")
            .field("name", &self.name())
            .field("allow_negation", &self.allow_negation())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Exact,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Boolean,
    StartsWith,
}

/// One of the built-in operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    kind: OperatorKind,
    allow_negation: bool,
}

impl Operator {
    pub const fn new(kind: OperatorKind) -> Self {
        Self { kind, allow_negation: false }
    }

    pub const fn exact() -> Self {
        Self::new(OperatorKind::Exact)
    }

    pub const fn ne() -> Self {
        Self::new(OperatorKind::Ne)
    }

    pub const fn lt() -> Self {
        Self::new(OperatorKind::Lt)
    }

    pub const fn lte() -> Self {
        Self::new(OperatorKind::Lte)
    }

    pub const fn gt() -> Self {
        Self::new(OperatorKind::Gt)
    }

    pub const fn gte() -> Self {
        Self::new(OperatorKind::Gte)
    }

    pub const fn is_in() -> Self {
        Self::new(OperatorKind::In)
    }

    pub const fn boolean() -> Self {
        Self::new(OperatorKind::Boolean)
    }

    pub const fn starts_with() -> Self {
        Self::new(OperatorKind::StartsWith)
    }

    /// Allows `__not` on this operator. Prefix matching has no negated form and
    /// stays non-negatable.
    pub const fn negatable(mut self) -> Self {
        self.allow_negation = !matches!(self.kind, OperatorKind::StartsWith);
        self
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    fn comparison(field: &str, op: FieldOp, value: &FilterValue, negate: bool) -> Expr {
        let expr = Expr::field(field.to_string(), op, value.to_bson());
        if negate { expr.not() } else { expr }
    }
}

impl FilterOperator for Operator {
    fn name(&self) -> &str {
        match self.kind {
            OperatorKind::Exact | OperatorKind::Boolean => "exact",
            OperatorKind::Ne => "ne",
            OperatorKind::Lt => "lt",
            OperatorKind::Lte => "lte",
            OperatorKind::Gt => "gt",
            OperatorKind::Gte => "gte",
            OperatorKind::In => "in",
            OperatorKind::StartsWith => "startswith",
        }
    }

    fn allow_negation(&self) -> bool {
        self.allow_negation
    }

    fn apply(&self, field: &str, value: &FilterValue, negate: bool) -> Expr {
        match self.kind {
            OperatorKind::Exact => {
                let op = if negate { FieldOp::Ne } else { FieldOp::Eq };
                Expr::field(field.to_string(), op, value.to_bson())
            }
            OperatorKind::Ne => Self::comparison(field, FieldOp::Ne, value, negate),
            OperatorKind::Lt => Self::comparison(field, FieldOp::Lt, value, negate),
            OperatorKind::Lte => Self::comparison(field, FieldOp::Lte, value, negate),
            OperatorKind::Gt => Self::comparison(field, FieldOp::Gt, value, negate),
            OperatorKind::Gte => Self::comparison(field, FieldOp::Gte, value, negate),
            OperatorKind::In => match value.raw() {
                Some(raw) if raw.contains(',') => {
                    let items = raw.split(',').map(|piece| value.coerce(piece)).collect();
                    let op = if negate { FieldOp::NotIn } else { FieldOp::In };
                    Expr::field(field.to_string(), op, Bson::Array(items))
                }
                _ => {
                    let op = if negate { FieldOp::Ne } else { FieldOp::Eq };
                    Expr::field(field.to_string(), op, value.to_bson())
                }
            },
            OperatorKind::Boolean => {
                let flag = value.raw() != Some("false");
                Expr::field(field.to_string(), FieldOp::Eq, Bson::Boolean(flag != negate))
            }
            OperatorKind::StartsWith => Expr::field(
                field.to_string(),
                FieldOp::StartsWith,
                Bson::String(value.raw().unwrap_or_default().to_string()),
            ),
        }
    }
}

type OperatorFactory = Arc<dyn Fn(bool) -> Arc<dyn FilterOperator> + Send + Sync>;

/// Operators addressable by name, used to resolve configuration files.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    factories: BTreeMap<String, OperatorFactory>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in operators under `exact`, `ne`, `lt`, `lte`, `gt`, `gte`,
    /// `in`, `bool` and `startswith`.
    pub fn standard() -> Self {
        [
            ("exact", Operator::exact()),
            ("ne", Operator::ne()),
            ("lt", Operator::lt()),
            ("lte", Operator::lte()),
            ("gt", Operator::gt()),
            ("gte", Operator::gte()),
            ("in", Operator::is_in()),
            ("bool", Operator::boolean()),
            ("startswith", Operator::starts_with()),
        ]
        .into_iter()
        .fold(Self::new(), |registry, (name, operator)| {
            registry.register(name, move |negatable| {
                let operator = if negatable { operator.negatable() } else { operator };
                Arc::new(operator) as Arc<dyn FilterOperator>
            })
        })
    }

    /// Registers a factory receiving the requested negation flag.
    pub fn register(
        mut self,
        name: impl Into<String>,
        factory: impl Fn(bool) -> Arc<dyn FilterOperator> + Send + Sync + 'static,
    ) -> Self {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn resolve(&self, name: &str, negatable: bool) -> Option<Arc<dyn FilterOperator>> {
        self.factories.get(name).map(|factory| factory(negatable))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrest_core::query::Filter;

    fn value(raw: &str) -> FilterValue {
        FilterValue::new(Some(raw.to_string()), ScalarType::Any)
    }

    #[test]
    fn exact_negates_to_not_equal() {
        assert_eq!(Operator::exact().apply("nick", &value("bob"), false), Filter::eq("nick", "bob"));
        assert_eq!(Operator::exact().apply("nick", &value("bob"), true), Filter::ne("nick", "bob"));
    }

    #[test]
    fn comparisons_negate_by_wrapping() {
        assert_eq!(Operator::lt().apply("age", &value("3"), true), Filter::lt("age", "3").not());
        assert_eq!(Operator::ne().apply("age", &value("3"), false), Filter::ne("age", "3"));
    }

    #[test]
    fn in_splits_on_commas_and_degrades_to_equality() {
        let typed = FilterValue::new(Some("1,2".into()), ScalarType::Int);
        assert_eq!(
            Operator::is_in().apply("age", &typed, false),
            Filter::one_of("age", [Bson::Int64(1), Bson::Int64(2)]),
        );
        assert_eq!(
            Operator::is_in().apply("age", &typed, true),
            Filter::none_of("age", [Bson::Int64(1), Bson::Int64(2)]),
        );
        assert_eq!(Operator::is_in().apply("nick", &value("bob"), false), Filter::eq("nick", "bob"));
        assert_eq!(Operator::is_in().apply("nick", &value("bob"), true), Filter::ne("nick", "bob"));
    }

    #[test]
    fn boolean_treats_only_false_as_false() {
        let op = Operator::boolean();
        assert_eq!(op.name(), "exact");
        assert_eq!(op.apply("active", &value("false"), false), Filter::eq("active", false));
        assert_eq!(op.apply("active", &value("0"), false), Filter::eq("active", true));
        assert_eq!(op.apply("active", &value("yes"), true), Filter::eq("active", false));
    }

    #[test]
    fn prefix_match_is_never_negatable() {
        assert!(!Operator::starts_with().negatable().allow_negation());
        assert!(Operator::lt().negatable().allow_negation());
        assert!(!Operator::lt().allow_negation());
    }

    #[test]
    fn standard_registry_resolves_by_name() {
        let registry = OperatorRegistry::standard();
        let op = registry.resolve("bool", true).unwrap();
        assert_eq!(op.name(), "exact");
        assert!(op.allow_negation());
        assert!(registry.resolve("regex", false).is_none());
    }
}
