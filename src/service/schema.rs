//! JSON Schema validation for semantic analysis replies.

use jsonschema::{JSONSchema, ValidationError};
use serde_json::Value;
use std::sync::OnceLock;

/// Shape the language model is constrained to reply with
pub const PII_ANALYSIS_SCHEMA: &str = r#"{
    "$schema": "http://json-schema.org/draft-07/schema#",
    "title": "PII Analysis Result",
    "type": "object",
    "required": ["contains_pii"],
    "properties": {
        "contains_pii": {
            "type": "boolean"
        },
        "pii_items": {
            "type": "array",
            "items": {
                "type": "object",
                "required": ["pii_type", "pii_value", "reason", "is_masked"],
                "properties": {
                    "pii_type": {"type": "string"},
                    "pii_value": {"type": "string"},
                    "reason": {"type": "string"},
                    "is_masked": {"type": "boolean"}
                }
            }
        }
    }
}"#;

static SCHEMA_VALUE: OnceLock<Value> = OnceLock::new();
static SCHEMA_COMPILED: OnceLock<JSONSchema> = OnceLock::new();

/// The analysis schema as a JSON value, for sending alongside the prompt
pub fn analysis_schema() -> &'static Value {
    SCHEMA_VALUE.get_or_init(|| {
        serde_json::from_str(PII_ANALYSIS_SCHEMA).expect("Invalid PII analysis schema")
    })
}

fn compiled_schema() -> &'static JSONSchema {
    SCHEMA_COMPILED.get_or_init(|| {
        JSONSchema::compile(analysis_schema()).expect("PII analysis schema does not compile")
    })
}

fn format_validation_errors<'a>(errors: impl Iterator<Item = ValidationError<'a>>) -> Vec<String> {
    errors
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect()
}

/// Validate a parsed reply against the analysis schema
pub fn validate_reply(value: &Value) -> Result<(), Vec<String>> {
    compiled_schema()
        .validate(value)
        .map_err(format_validation_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_reply() {
        let reply = json!({
            "contains_pii": true,
            "pii_items": [
                {"pii_type": "Full Name", "pii_value": "Jane Doe", "reason": "name", "is_masked": false}
            ]
        });
        assert!(validate_reply(&reply).is_ok());
    }

    #[test]
    fn test_reply_without_items_is_valid() {
        assert!(validate_reply(&json!({"contains_pii": false})).is_ok());
    }

    #[test]
    fn test_missing_required_fields() {
        let errors = validate_reply(&json!({"pii_items": []})).unwrap_err();
        assert!(!errors.is_empty());

        let errors = validate_reply(&json!({
            "contains_pii": true,
            "pii_items": [{"pii_value": "x"}]
        }))
        .unwrap_err();
        assert!(errors.iter().any(|e| e.contains("/pii_items/0")));
    }
}
