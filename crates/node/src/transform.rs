//! The transformer registry a `transformation` node dispatches through
//! (spec §4.6).
//!
//! Hermod's transformation *expression evaluator* is specified as an
//! out-of-scope black-box service (spec §1); what lives in this crate is
//! the dispatch seam a concrete evaluator plugs into, plus a handful of
//! built-in transformers exercising that seam end-to-end in tests.

use hermod_core::Value;
use hermod_error::NodeError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// A single named transformer, dispatched by name from a `transformation`
/// node's `config.transformer` field.
pub trait Transformer: Send + Sync {
    /// Apply this transformer to `data` in place, using `params` taken
    /// verbatim from the node's `config.params`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Evaluation`] if `params` is malformed or the
    /// transformation cannot be applied to `data`'s current shape.
    fn apply(&self, data: &mut Value, params: &JsonValue) -> Result<(), NodeError>;
}

/// `HashMap<String, Arc<dyn Trait>>` registry pattern (same shape as the
/// teacher's action registry), generalized to transformer dispatch.
#[derive(Clone, Default)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in transformers
    /// (`set_field`, `rename_field`, `uppercase`, `drop_field`).
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("set_field", Arc::new(SetField));
        registry.register("rename_field", Arc::new(RenameField));
        registry.register("uppercase", Arc::new(Uppercase));
        registry.register("drop_field", Arc::new(DropField));
        registry
    }

    /// Register (or replace) a transformer under `name`.
    pub fn register(&mut self, name: impl Into<String>, transformer: Arc<dyn Transformer>) {
        self.transformers.insert(name.into(), transformer);
    }

    /// Look up a transformer by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Transformer>> {
        self.transformers.get(name).cloned()
    }
}

/// What to do when a `transformation` node's transformer returns an error
/// (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Abort propagation; the router offers the node's `error` branch.
    #[default]
    Fail,
    /// Pass the message through untouched, marking `statusField="error"`.
    Continue,
    /// Filter the message out entirely.
    Drop,
}

/// `set_field`: write `params.field` to `params.value`.
struct SetField;
impl Transformer for SetField {
    fn apply(&self, data: &mut Value, params: &JsonValue) -> Result<(), NodeError> {
        let field = params
            .get("field")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| NodeError::Evaluation {
                node_id: "set_field".into(),
                message: "missing `field` param".into(),
            })?;
        let value = params.get("value").cloned().unwrap_or(JsonValue::Null);
        data.set_path(field, json_to_value(&value))
            .map_err(|e| NodeError::Evaluation {
                node_id: "set_field".into(),
                message: e.to_string(),
            })
    }
}

/// `rename_field`: move the value at `params.from` to `params.to`.
struct RenameField;
impl Transformer for RenameField {
    fn apply(&self, data: &mut Value, params: &JsonValue) -> Result<(), NodeError> {
        let from = params
            .get("from")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| NodeError::Evaluation {
                node_id: "rename_field".into(),
                message: "missing `from` param".into(),
            })?;
        let to = params
            .get("to")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| NodeError::Evaluation {
                node_id: "rename_field".into(),
                message: "missing `to` param".into(),
            })?;
        let value = data
            .get_path(from)
            .cloned()
            .ok_or_else(|| NodeError::PathNotFound(from.to_string()))?;
        data.set_path(to, value).map_err(|e| NodeError::Evaluation {
            node_id: "rename_field".into(),
            message: e.to_string(),
        })
    }
}

/// `uppercase`: upper-case the string at `params.field` in place.
struct Uppercase;
impl Transformer for Uppercase {
    fn apply(&self, data: &mut Value, params: &JsonValue) -> Result<(), NodeError> {
        let field = params
            .get("field")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| NodeError::Evaluation {
                node_id: "uppercase".into(),
                message: "missing `field` param".into(),
            })?;
        let current = data
            .get_path(field)
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::PathNotFound(field.to_string()))?
            .to_uppercase();
        data.set_path(field, Value::String(current))
            .map_err(|e| NodeError::Evaluation {
                node_id: "uppercase".into(),
                message: e.to_string(),
            })
    }
}

/// `drop_field`: set the value at `params.field` to null.
struct DropField;
impl Transformer for DropField {
    fn apply(&self, data: &mut Value, params: &JsonValue) -> Result<(), NodeError> {
        let field = params
            .get("field")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| NodeError::Evaluation {
                node_id: "drop_field".into(),
                message: "missing `field` param".into(),
            })?;
        data.set_path(field, Value::Null).map_err(|e| NodeError::Evaluation {
            node_id: "drop_field".into(),
            message: e.to_string(),
        })
    }
}

fn json_to_value(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::I64)
            .unwrap_or_else(|| Value::F64(n.as_f64().unwrap_or(0.0))),
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        JsonValue::Object(map) => {
            Value::Map(map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn set_field_writes_a_scalar() {
        let registry = TransformerRegistry::with_builtins();
        let transformer = registry.get("set_field").unwrap();
        let mut data = Value::Map(BTreeMap::new());
        transformer
            .apply(&mut data, &json!({"field": "status", "value": "ok"}))
            .unwrap();
        assert_eq!(data.get_path("status"), Some(&Value::String("ok".into())));
    }

    #[test]
    fn rename_field_moves_the_value() {
        let registry = TransformerRegistry::with_builtins();
        let transformer = registry.get("rename_field").unwrap();
        let mut map = BTreeMap::new();
        map.insert("old".to_string(), Value::I64(7));
        let mut data = Value::Map(map);
        transformer
            .apply(&mut data, &json!({"from": "old", "to": "new"}))
            .unwrap();
        assert_eq!(data.get_path("new"), Some(&Value::I64(7)));
    }

    #[test]
    fn uppercase_requires_a_string_field() {
        let registry = TransformerRegistry::with_builtins();
        let transformer = registry.get("uppercase").unwrap();
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::String("orders".into()));
        let mut data = Value::Map(map);
        transformer.apply(&mut data, &json!({"field": "name"})).unwrap();
        assert_eq!(data.get_path("name"), Some(&Value::String("ORDERS".into())));
    }

    #[test]
    fn unknown_transformer_is_absent_from_the_registry() {
        let registry = TransformerRegistry::with_builtins();
        assert!(registry.get("does_not_exist").is_none());
    }

    #[test]
    fn on_error_default_is_fail() {
        assert_eq!(OnError::default(), OnError::Fail);
    }
}
