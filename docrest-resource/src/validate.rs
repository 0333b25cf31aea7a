//! The validator contract.
//!
//! Schema rules live outside this crate. A validator receives the renamed payload
//! and, on updates, the object's current field values, and returns the cleaned
//! data to apply or a [`ValidationError`] listing what is wrong.

use serde_json::{Map, Value};

use crate::error::ValidationError;

pub type JsonMap = Map<String, Value>;

pub trait Validator: Send + Sync {
    fn validate(&self, raw: &JsonMap, existing: Option<&JsonMap>) -> Result<JsonMap, ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&JsonMap, Option<&JsonMap>) -> Result<JsonMap, ValidationError> + Send + Sync,
{
    fn validate(&self, raw: &JsonMap, existing: Option<&JsonMap>) -> Result<JsonMap, ValidationError> {
        self(raw, existing)
    }
}

/// Accepts every payload unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, raw: &JsonMap, _existing: Option<&JsonMap>) -> Result<JsonMap, ValidationError> {
        Ok(raw.clone())
    }
}

/// Requires a set of fields on create. On update a field may instead already
/// hold a value on the object.
#[derive(Debug, Clone, Default)]
pub struct RequiredFields {
    fields: Vec<String>,
}

impl RequiredFields {
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { fields: fields.into_iter().map(Into::into).collect() }
    }
}

impl Validator for RequiredFields {
    fn validate(&self, raw: &JsonMap, existing: Option<&JsonMap>) -> Result<JsonMap, ValidationError> {
        let present = |field: &str, map: Option<&JsonMap>| {
            map.and_then(|m| m.get(field))
                .map(|value| !value.is_null())
                .unwrap_or(false)
        };

        let error = self
            .fields
            .iter()
            .filter(|field| !present(field.as_str(), Some(raw)) && !present(field.as_str(), existing))
            .fold(ValidationError::default(), |error, field| {
                error.with_field_error(field.clone(), "This field is required.")
            });

        if error.is_empty() { Ok(raw.clone()) } else { Err(error) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn required_fields_consult_existing_values() {
        let validator = RequiredFields::new(["nick", "email"]);

        let err = validator.validate(&map(json!({ "nick": "bob" })), None).unwrap_err();
        assert_eq!(err.field_errors.keys().collect::<Vec<_>>(), vec!["email"]);

        let existing = map(json!({ "email": "bob@example.com" }));
        assert!(validator.validate(&map(json!({ "nick": "bob" })), Some(&existing)).is_ok());
    }

    #[test]
    fn closures_are_validators() {
        let upper = |raw: &JsonMap, _: Option<&JsonMap>| -> Result<JsonMap, ValidationError> {
            let mut cleaned = raw.clone();
            if let Some(Value::String(nick)) = cleaned.get_mut("nick") {
                *nick = nick.to_uppercase();
            }
            Ok(cleaned)
        };

        let cleaned = upper.validate(&map(json!({ "nick": "bob" })), None).unwrap();
        assert_eq!(cleaned["nick"], json!("BOB"));
    }
}
