//! Query translation from docrest filter expressions to MongoDB query syntax.
//!
//! | Expression                  | MongoDB                                   |
//! |-----------------------------|-------------------------------------------|
//! | `Field { Eq }`              | `{ field: { $eq: v } }`                   |
//! | `Field { Ne/Lt/.. }`        | `{ field: { $ne/$lt/..: v } }`            |
//! | `Field { In/NotIn }`        | `{ field: { $in/$nin: [..] } }`           |
//! | `Field { StartsWith }`      | `{ field: { $regex: "^<escaped>" } }`     |
//! | `Not(Field)`                | `{ field: { $not: { .. } } }`             |
//! | `Not(other)`                | `{ $nor: [ .. ] }`                        |
//! | `And([])`                   | `{}`                                      |

use bson::{Bson, Document, doc};

use docrest_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Translates docrest query expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// The operator document applied to a single field.
    fn condition(op: &FieldOp, value: &Bson) -> Result<Document, DocumentStoreError> {
        Ok(match op {
            FieldOp::Eq => doc! { "$eq": value },
            FieldOp::Ne => doc! { "$ne": value },
            FieldOp::Gt => doc! { "$gt": value },
            FieldOp::Gte => doc! { "$gte": value },
            FieldOp::Lt => doc! { "$lt": value },
            FieldOp::Lte => doc! { "$lte": value },
            FieldOp::StartsWith => match value {
                Bson::String(s) => doc! { "$regex": format!("^{}", regex::escape(s)) },
                _ => return Err(DocumentStoreError::Backend("StartsWith operator requires a string value".to_string())),
            },
            FieldOp::In => doc! { "$in": Self::as_array(value) },
            FieldOp::NotIn => doc! { "$nin": Self::as_array(value) },
        })
    }

    fn as_array(value: &Bson) -> Bson {
        match value {
            Bson::Array(_) => value.clone(),
            single => Bson::Array(vec![single.clone()]),
        }
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            // $not is only valid as a field-level operator
            Expr::Field { field, op, value } => Ok(doc! {
                field: { "$not": Self::condition(op, value)? },
            }),
            other => Ok(doc! {
                "$nor": [self.visit_expr(other)?],
            }),
        }
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: Self::condition(op, value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrest_core::query::Filter;

    fn translate(expr: Expr) -> Document {
        MongoQueryTranslator.visit_expr(&expr).unwrap()
    }

    #[test]
    fn negated_comparison_uses_field_level_not() {
        assert_eq!(
            translate(Filter::lt("age", 30).not()),
            doc! { "age": { "$not": { "$lt": 30 } } },
        );
    }

    #[test]
    fn prefix_is_anchored_and_escaped() {
        assert_eq!(
            translate(Filter::starts_with("nick", "a.b")),
            doc! { "nick": { "$regex": "^a\\.b" } },
        );
    }

    #[test]
    fn empty_conjunction_matches_everything() {
        assert_eq!(translate(Expr::always()), doc! {});
    }
}
