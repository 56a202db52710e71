//! Data validation against schemas.

use serde_json::Value;

use crate::error::{SchemaError, ValidateError};

/// Result of validating one document.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<SchemaError>,
}

impl ValidationOutcome {
    /// Convert into `Err(ValidateError::Invalid)` when there were errors.
    pub fn into_result(self) -> Result<(), ValidateError> {
        if self.valid {
            Ok(())
        } else {
            Err(ValidateError::Invalid {
                errors: self.errors,
            })
        }
    }
}

/// Validates data against one schema.
pub trait SchemaValidator {
    fn validate(&self, data: &Value) -> ValidationOutcome;
}

/// `jsonschema`-backed validator. The schema is compiled once.
pub struct JsonSchemaValidator {
    inner: jsonschema::Validator,
}

impl std::fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchemaValidator").finish_non_exhaustive()
    }
}

impl JsonSchemaValidator {
    /// Compile `schema`.
    ///
    /// # Errors
    ///
    /// Returns `ValidateError::InvalidSchema` if the schema itself is not
    /// a valid JSON Schema.
    pub fn new(schema: &Value) -> Result<Self, ValidateError> {
        let inner = jsonschema::validator_for(schema).map_err(|e| ValidateError::InvalidSchema {
            message: e.to_string(),
        })?;
        Ok(Self { inner })
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, data: &Value) -> ValidationOutcome {
        let errors: Vec<SchemaError> = self
            .inner
            .iter_errors(data)
            .map(|e| SchemaError {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        ValidationOutcome {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate `data` against `schema` in one step.
///
/// # Errors
///
/// `ValidateError::InvalidSchema` for a bad schema, `ValidateError::Invalid`
/// if the data doesn't match.
pub fn validate(schema: &Value, data: &Value) -> Result<(), ValidateError> {
    JsonSchemaValidator::new(schema)?.validate(data).into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "age": { "type": "number" }
            },
            "required": ["name", "age"]
        })
    }

    #[test]
    fn valid_data() {
        let outcome = JsonSchemaValidator::new(&person())
            .unwrap()
            .validate(&json!({ "name": "Ada", "age": 36 }));
        assert!(outcome.valid);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn wrong_type_reports_path() {
        let outcome = JsonSchemaValidator::new(&person())
            .unwrap()
            .validate(&json!({ "name": 1, "age": 36 }));
        assert!(!outcome.valid);
        assert_eq!(outcome.errors[0].path, "/name");
    }

    #[test]
    fn collects_multiple_errors() {
        let result = validate(&person(), &json!({}));
        match result {
            Err(ValidateError::Invalid { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("expected 2 validation errors, got {other:?}"),
        }
    }

    #[test]
    fn invalid_schema_rejected() {
        let result = JsonSchemaValidator::new(&json!({ "type": 12 }));
        assert!(matches!(result, Err(ValidateError::InvalidSchema { .. })));
    }

    #[test]
    fn validator_is_reusable() {
        let validator = JsonSchemaValidator::new(&person()).unwrap();
        assert!(validator.validate(&json!({ "name": "a", "age": 1 })).valid);
        assert!(!validator.validate(&json!({ "name": "a" })).valid);
        assert!(validator.validate(&json!({ "name": "b", "age": 2 })).valid);
    }
}
