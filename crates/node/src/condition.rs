//! Conjunctive field conditions shared by `filter`, `condition`, `router`,
//! `switch`, and `validator` node types (spec §4.6).

use hermod_core::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A comparison operator evaluated against one field of a message's data
/// (spec §4.6 `filter/filter_data`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// Substring test (rendered as text).
    Contains,
    /// Regex match (rendered as text).
    Regex,
}

/// A single condition: `field <operator> value` (spec §4.6).
///
/// `value` is kept as [`JsonValue`] rather than [`Value`] because node
/// configuration round-trips through the catalog as JSON (spec §3
/// `Node.config`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted/indexed path into the message's `data` (spec §9).
    pub field: String,
    /// The comparison to apply.
    pub operator: Operator,
    /// The right-hand side of the comparison.
    pub value: JsonValue,
}

/// `true` if every condition in `conditions` matches `data` (spec §4.6:
/// "a list of conjunctive conditions").
///
/// An empty condition list matches everything — a `filter` node with no
/// configured conditions is a no-op passthrough, not a universal reject.
#[must_use]
pub fn matches_all(conditions: &[Condition], data: &Value) -> bool {
    conditions.iter().all(|c| matches_one(c, data))
}

fn matches_one(condition: &Condition, data: &Value) -> bool {
    let Some(actual) = data.get_path(&condition.field) else {
        return false;
    };
    match condition.operator {
        Operator::Eq => render_eq(actual, &condition.value),
        Operator::Ne => !render_eq(actual, &condition.value),
        Operator::Lt => numeric_cmp(actual, &condition.value, |a, b| a < b),
        Operator::Le => numeric_cmp(actual, &condition.value, |a, b| a <= b),
        Operator::Gt => numeric_cmp(actual, &condition.value, |a, b| a > b),
        Operator::Ge => numeric_cmp(actual, &condition.value, |a, b| a >= b),
        Operator::Contains => actual.render().contains(&render_json(&condition.value)),
        Operator::Regex => regex::Regex::new(&render_json(&condition.value))
            .is_ok_and(|re| re.is_match(&actual.render())),
    }
}

fn render_eq(actual: &Value, expected: &JsonValue) -> bool {
    actual.render() == render_json(expected)
}

fn numeric_cmp(actual: &Value, expected: &JsonValue, cmp: impl Fn(f64, f64) -> bool) -> bool {
    let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) else {
        return false;
    };
    cmp(a, b)
}

fn render_json(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string().trim_matches('"').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn data(field: &str, value: Value) -> Value {
        let mut map = BTreeMap::new();
        map.insert(field.to_string(), value);
        Value::Map(map)
    }

    #[test]
    fn eq_matches_rendered_equality() {
        let cond = Condition {
            field: "severity".into(),
            operator: Operator::Eq,
            value: JsonValue::String("critical".into()),
        };
        assert!(matches_one(&cond, &data("severity", Value::String("critical".into()))));
        assert!(!matches_one(&cond, &data("severity", Value::String("low".into()))));
    }

    #[test]
    fn regex_matches_severity_buckets() {
        let high = Condition {
            field: "severity".into(),
            operator: Operator::Regex,
            value: JsonValue::String("^(high|critical)$".into()),
        };
        assert!(matches_one(&high, &data("severity", Value::String("critical".into()))));
        assert!(!matches_one(&high, &data("severity", Value::String("unknown".into()))));
    }

    #[test]
    fn numeric_comparisons() {
        let gt = Condition {
            field: "amount".into(),
            operator: Operator::Gt,
            value: JsonValue::from(100),
        };
        assert!(matches_one(&gt, &data("amount", Value::I64(200))));
        assert!(!matches_one(&gt, &data("amount", Value::I64(50))));
    }

    #[test]
    fn missing_field_never_matches() {
        let cond = Condition {
            field: "missing".into(),
            operator: Operator::Eq,
            value: JsonValue::String("x".into()),
        };
        assert!(!matches_one(&cond, &data("present", Value::Bool(true))));
    }

    #[test]
    fn empty_condition_list_matches_everything() {
        assert!(matches_all(&[], &Value::Null));
    }

    #[test]
    fn conjunctive_requires_every_condition() {
        let mut map = BTreeMap::new();
        map.insert("severity".to_string(), Value::String("high".into()));
        map.insert("region".to_string(), Value::String("eu".into()));
        let value = Value::Map(map);

        let conds = vec![
            Condition {
                field: "severity".into(),
                operator: Operator::Eq,
                value: JsonValue::String("high".into()),
            },
            Condition {
                field: "region".into(),
                operator: Operator::Eq,
                value: JsonValue::String("us".into()),
            },
        ];
        assert!(!matches_all(&conds, &value));
    }
}
