//! Workflow-level payload schema validation (spec §4.5 step 3: "If a
//! schema validator is configured, run it; failures go to the DLQ
//! pathway").
//!
//! `hermod_model::SchemaPolicy` carries a dialect name plus an opaque
//! schema document; a full JSON Schema/Avro evaluator is out of this
//! core's scope (spec §1 names the transformation expression evaluator
//! as the one black-box service, and schema validation is the same
//! shape of problem). What's implemented here is the structural subset
//! every dialect needs in common: required top-level fields and their
//! primitive type, enough to exercise the DLQ pathway the spec
//! describes without pulling in a schema-language dependency the rest
//! of the workspace doesn't otherwise need.

use hermod_core::Value;
use hermod_model::SchemaPolicy;
use serde_json::Value as JsonValue;

/// Why a message failed schema validation, for the DLQ write and logs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("schema validation failed: {0}")]
pub struct SchemaViolation(pub String);

/// Validates message payloads against a workflow's configured
/// [`SchemaPolicy`].
pub struct SchemaValidator {
    required: Vec<(String, ExpectedType)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpectedType {
    String,
    Number,
    Bool,
    Object,
    Array,
    Any,
}

impl ExpectedType {
    fn parse(raw: &str) -> Self {
        match raw {
            "string" => Self::String,
            "number" | "integer" => Self::Number,
            "boolean" => Self::Bool,
            "object" => Self::Object,
            "array" => Self::Array,
            _ => Self::Any,
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => matches!(value, Value::String(_)),
            Self::Number => matches!(value, Value::I64(_) | Value::F64(_)),
            Self::Bool => matches!(value, Value::Bool(_)),
            Self::Object => matches!(value, Value::Map(_)),
            Self::Array => matches!(value, Value::List(_)),
            Self::Any => true,
        }
    }
}

impl SchemaValidator {
    /// Build a validator from a workflow's schema policy. Only the
    /// `json_schema`-shaped `{"required": [...], "properties": {field:
    /// {"type": "..."}}}` document is honored; other dialects (e.g.
    /// `"avro"`) validate everything as `Any`, since parsing their
    /// documents is adapter territory this core doesn't own.
    #[must_use]
    pub fn new(policy: &SchemaPolicy) -> Self {
        let mut required = Vec::new();
        if policy.schema_type == "json_schema" {
            if let JsonValue::Object(root) = &policy.schema {
                let required_fields: Vec<String> = root
                    .get("required")
                    .and_then(JsonValue::as_array)
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
                    .unwrap_or_default();
                let properties = root.get("properties").and_then(JsonValue::as_object);
                for field in required_fields {
                    let expected = properties
                        .and_then(|props| props.get(&field))
                        .and_then(|prop| prop.get("type"))
                        .and_then(JsonValue::as_str)
                        .map_or(ExpectedType::Any, ExpectedType::parse);
                    required.push((field, expected));
                }
            }
        }
        Self { required }
    }

    /// Validate `data` against the configured required fields and
    /// types.
    ///
    /// # Errors
    ///
    /// Returns the first missing or mistyped field found.
    pub fn validate(&self, data: &Value) -> Result<(), SchemaViolation> {
        for (field, expected) in &self.required {
            match data.get_path(field) {
                None => return Err(SchemaViolation(format!("missing required field: {field}"))),
                Some(value) if !expected.matches(value) => {
                    return Err(SchemaViolation(format!("field {field} has the wrong type")));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn policy(schema: JsonValue) -> SchemaPolicy {
        SchemaPolicy { schema, schema_type: "json_schema".to_string() }
    }

    #[test]
    fn missing_required_field_fails() {
        let validator = SchemaValidator::new(&policy(json!({
            "required": ["amount"],
            "properties": {"amount": {"type": "number"}}
        })));
        assert!(validator.validate(&Value::Map(BTreeMap::new())).is_err());
    }

    #[test]
    fn present_and_correctly_typed_field_passes() {
        let validator = SchemaValidator::new(&policy(json!({
            "required": ["amount"],
            "properties": {"amount": {"type": "number"}}
        })));
        let mut map = BTreeMap::new();
        map.insert("amount".to_string(), Value::I64(5));
        assert!(validator.validate(&Value::Map(map)).is_ok());
    }

    #[test]
    fn wrong_type_fails() {
        let validator = SchemaValidator::new(&policy(json!({
            "required": ["amount"],
            "properties": {"amount": {"type": "number"}}
        })));
        let mut map = BTreeMap::new();
        map.insert("amount".to_string(), Value::String("not a number".into()));
        assert!(validator.validate(&Value::Map(map)).is_err());
    }

    #[test]
    fn non_json_schema_dialect_validates_everything() {
        let validator = SchemaValidator::new(&policy(json!({"type": "record"})));
        assert!(validator.validate(&Value::Null).is_ok());
    }
}
