//! Per-[`NodeType`](hermod_model::NodeType) configuration, parsed out of
//! [`Node::config`](hermod_model::Node::config) (spec §3, §4.6).

use crate::condition::Condition;
use crate::merge::MergeStrategy;
use crate::stateful::StatefulOp;
use crate::transform::OnError;
use hermod_error::NodeError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;

fn parse<T: DeserializeOwned>(node_id: &str, config: &JsonValue) -> Result<T, NodeError> {
    serde_json::from_value(config.clone()).map_err(|e| NodeError::Evaluation {
        node_id: node_id.to_string(),
        message: format!("invalid node config: {e}"),
    })
}

/// One named branch in a `router` node (spec §4.6: "evaluates ordered
/// rules, returns the first matching label").
#[derive(Debug, Clone, Deserialize)]
pub struct RouterRule {
    /// The branch label to emit when `conditions` match.
    pub label: String,
    /// Conjunctive conditions for this rule.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `router` node config: ordered rules, first match wins, `"default"`
/// (spec §4.6 [`hermod_model::LABEL_DEFAULT`]) if none match.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Rules evaluated in order.
    #[serde(default)]
    pub rules: Vec<RouterRule>,
}

impl RouterConfig {
    /// Parse from a node's raw `config`.
    pub fn parse(node_id: &str, config: &JsonValue) -> Result<Self, NodeError> {
        parse(node_id, config)
    }
}

/// One case in a `switch` node.
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchCase {
    /// The branch label to emit when this case matches.
    pub label: String,
    /// Exact value `field` must render-equal for this case to match
    /// (mutually exclusive with `conditions`; `field` comes from
    /// [`SwitchConfig::field`]).
    #[serde(default)]
    pub value: Option<JsonValue>,
    /// Conjunctive conditions for this case, used instead of `value` when
    /// [`SwitchConfig::field`] is absent.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `switch` node config: keys on a single field's value, or on per-case
/// conditions (spec §4.6).
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchConfig {
    /// The field every case's `value` is compared against. `None` means
    /// each case supplies its own `conditions` instead.
    #[serde(default)]
    pub field: Option<String>,
    /// Cases evaluated in order.
    #[serde(default)]
    pub cases: Vec<SwitchCase>,
}

impl SwitchConfig {
    /// Parse from a node's raw `config`.
    pub fn parse(node_id: &str, config: &JsonValue) -> Result<Self, NodeError> {
        parse(node_id, config)
    }
}

/// `filter`/`condition` node config: a flat conjunctive condition list
/// (spec §4.6 `filter/filter_data`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConditionConfig {
    /// Conditions, ANDed together.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ConditionConfig {
    /// Parse from a node's raw `config`.
    pub fn parse(node_id: &str, config: &JsonValue) -> Result<Self, NodeError> {
        parse(node_id, config)
    }
}

/// Whether a failing `validator` node drops the message or tags it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorMode {
    /// Messages failing any condition are filtered out silently.
    Filter,
    /// Every message passes through; `as_field` is set to the boolean
    /// validation result.
    Annotate,
}

/// `validator` node config (spec §4.6: "can filter or annotate the
/// message").
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    /// Conditions the message must satisfy to be considered valid.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Filter or annotate on failure.
    #[serde(default = "default_validator_mode")]
    pub mode: ValidatorMode,
    /// Field written with the boolean validation result in `Annotate`
    /// mode. Defaults to `"is_valid"`.
    #[serde(default = "default_as_field")]
    pub as_field: String,
}

fn default_validator_mode() -> ValidatorMode {
    ValidatorMode::Filter
}

fn default_as_field() -> String {
    "is_valid".to_string()
}

impl ValidatorConfig {
    /// Parse from a node's raw `config`.
    pub fn parse(node_id: &str, config: &JsonValue) -> Result<Self, NodeError> {
        parse(node_id, config)
    }
}

/// `stateful` node config (spec §4.6).
#[derive(Debug, Clone, Deserialize)]
pub struct StatefulConfig {
    /// Field the operation reads (ignored for `count`).
    #[serde(default)]
    pub field: String,
    /// The reduction applied on every message.
    pub operation: StatefulOp,
    /// Field the accumulated value is written to. Defaults to
    /// `"{field}_{operation}"` if absent (resolved by the caller, since
    /// it depends on `operation`'s `Display`).
    #[serde(default)]
    pub output_field: Option<String>,
}

impl StatefulConfig {
    /// Parse from a node's raw `config`.
    pub fn parse(node_id: &str, config: &JsonValue) -> Result<Self, NodeError> {
        parse(node_id, config)
    }

    /// The field the accumulated total is written to.
    #[must_use]
    pub fn resolved_output_field(&self) -> String {
        self.output_field.clone().unwrap_or_else(|| {
            let op = match self.operation {
                StatefulOp::Count => "count",
                StatefulOp::Sum => "sum",
            };
            format!("{}_{op}", self.field)
        })
    }
}

/// A single transformer invocation: a name dispatched through the node
/// evaluator's [`crate::transform::TransformerRegistry`], plus its
/// parameters and error policy.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformStep {
    /// Registry key.
    pub transformer: String,
    /// Parameters passed verbatim to the transformer.
    #[serde(default)]
    pub params: JsonValue,
    /// What to do if this step errors.
    #[serde(default)]
    pub on_error: OnError,
}

/// `transformation` node config: either a single step or a `pipeline` of
/// them chained in order (spec §4.6).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransformationConfig {
    /// A `pipeline` of steps applied in sequence.
    Pipeline {
        /// Steps applied in order; the first to fail with `on_error: fail`
        /// aborts the remaining steps.
        pipeline: Vec<TransformStep>,
    },
    /// A single transformer invocation.
    Single(TransformStep),
}

impl TransformationConfig {
    /// Parse from a node's raw `config`.
    pub fn parse(node_id: &str, config: &JsonValue) -> Result<Self, NodeError> {
        parse(node_id, config)
    }

    /// The steps to run in order, regardless of which variant this is.
    #[must_use]
    pub fn steps(&self) -> &[TransformStep] {
        match self {
            Self::Pipeline { pipeline } => pipeline,
            Self::Single(step) => std::slice::from_ref(step),
        }
    }
}

/// `merge` node config: the strategy applied to every inbound delivery
/// after the first (spec §4.6).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MergeConfig {
    /// Combination strategy.
    #[serde(default)]
    pub strategy: MergeStrategy,
}

impl MergeConfig {
    /// Parse from a node's raw `config`.
    pub fn parse(node_id: &str, config: &JsonValue) -> Result<Self, NodeError> {
        parse(node_id, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn router_config_parses_ordered_rules() {
        let cfg = RouterConfig::parse(
            "r1",
            &json!({"rules": [{"label": "high", "conditions": []}]}),
        )
        .unwrap();
        assert_eq!(cfg.rules.len(), 1);
        assert_eq!(cfg.rules[0].label, "high");
    }

    #[test]
    fn stateful_config_defaults_output_field_from_operation() {
        let cfg = StatefulConfig::parse("s1", &json!({"field": "amount", "operation": "sum"}))
            .unwrap();
        assert_eq!(cfg.resolved_output_field(), "amount_sum");
    }

    #[test]
    fn stateful_config_honors_explicit_output_field() {
        let cfg = StatefulConfig::parse(
            "s1",
            &json!({"field": "amount", "operation": "sum", "output_field": "total"}),
        )
        .unwrap();
        assert_eq!(cfg.resolved_output_field(), "total");
    }

    #[test]
    fn transformation_config_single_step() {
        let cfg = TransformationConfig::parse(
            "t1",
            &json!({"transformer": "uppercase", "params": {"field": "name"}}),
        )
        .unwrap();
        assert_eq!(cfg.steps().len(), 1);
        assert_eq!(cfg.steps()[0].transformer, "uppercase");
    }

    #[test]
    fn transformation_config_pipeline_of_steps() {
        let cfg = TransformationConfig::parse(
            "t1",
            &json!({"pipeline": [
                {"transformer": "set_field", "params": {}},
                {"transformer": "uppercase", "params": {}}
            ]}),
        )
        .unwrap();
        assert_eq!(cfg.steps().len(), 2);
    }

    #[test]
    fn validator_config_defaults_to_filter_mode() {
        let cfg = ValidatorConfig::parse("v1", &json!({"conditions": []})).unwrap();
        assert_eq!(cfg.mode, ValidatorMode::Filter);
        assert_eq!(cfg.as_field, "is_valid");
    }

    #[test]
    fn malformed_config_is_a_node_error() {
        let err = RouterConfig::parse("r1", &json!({"rules": "not-a-list"})).unwrap_err();
        assert!(matches!(err, NodeError::Evaluation { .. }));
    }
}
