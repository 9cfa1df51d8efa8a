//! Per-node evaluation (spec §4.6): the pure function from "a node plus an
//! inbound message" to "zero-or-one outbound messages plus an optional
//! branch label", for every [`NodeType`].

use crate::condition::matches_all;
use crate::config::{
    ConditionConfig, MergeConfig, RouterConfig, StatefulConfig, SwitchConfig, TransformationConfig,
    ValidatorConfig, ValidatorMode,
};
use crate::merge;
use crate::stateful::StatefulStore;
use crate::transform::{OnError, TransformerRegistry};
use hermod_core::WorkflowId;
use hermod_error::NodeError;
use hermod_message::Message;
use hermod_model::{LABEL_DEFAULT, LABEL_ERROR, Node, NodeType};

/// The result of evaluating one node against one message.
#[derive(Debug)]
pub struct EvalOutcome {
    /// The (possibly mutated) message to continue routing, or `None` if
    /// this node filtered/dropped it.
    pub message: Option<Message>,
    /// The branch label to route on (`condition`/`router`/`switch`, or
    /// [`LABEL_ERROR`] on a transformation failure that policy says to
    /// continue past). `None` means "route unconditionally" — the case
    /// for `source`/`sink`/`transformation`(ok)/`stateful`/`merge`.
    pub branch: Option<String>,
}

impl EvalOutcome {
    fn pass(message: Message) -> Self {
        Self { message: Some(message), branch: None }
    }

    fn branch(message: Message, label: impl Into<String>) -> Self {
        Self { message: Some(message), branch: Some(label.into()) }
    }

    fn dropped() -> Self {
        Self { message: None, branch: None }
    }
}

/// Evaluates a single node in isolation; holds the shared
/// [`TransformerRegistry`] and [`StatefulStore`] every node of the
/// corresponding type dispatches through.
pub struct NodeEvaluator {
    transformers: TransformerRegistry,
    stateful: StatefulStore,
}

impl NodeEvaluator {
    /// Construct an evaluator with the built-in transformers registered.
    #[must_use]
    pub fn new() -> Self {
        Self { transformers: TransformerRegistry::with_builtins(), stateful: StatefulStore::new() }
    }

    /// Construct an evaluator with a caller-supplied transformer registry.
    #[must_use]
    pub fn with_registry(transformers: TransformerRegistry) -> Self {
        Self { transformers, stateful: StatefulStore::new() }
    }

    /// Borrow the stateful accumulator store, e.g. for checkpointing.
    #[must_use]
    pub fn stateful_store(&self) -> &StatefulStore {
        &self.stateful
    }

    /// Evaluate `node` against `message` (spec §4.6).
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] when the node's config fails to parse, or
    /// (for `transformation` with `on_error: fail`) when the transformer
    /// itself fails and there's no `error` edge to route through — the
    /// caller is responsible for checking for one before surfacing this.
    pub fn evaluate(
        &self,
        workflow_id: WorkflowId,
        node: &Node,
        mut message: Message,
    ) -> Result<EvalOutcome, NodeError> {
        let node_id = node.id.to_string();
        match node.node_type {
            NodeType::Source | NodeType::Sink => Ok(EvalOutcome::pass(message)),
            NodeType::Transformation => self.evaluate_transformation(&node_id, node, message),
            NodeType::Condition => {
                let cfg = ConditionConfig::parse(&node_id, &node.config)?;
                let label = if matches_all(&cfg.conditions, &message.data) { "true" } else { "false" };
                Ok(EvalOutcome::branch(message, label))
            }
            NodeType::Filter => {
                let cfg = ConditionConfig::parse(&node_id, &node.config)?;
                if matches_all(&cfg.conditions, &message.data) {
                    Ok(EvalOutcome::pass(message))
                } else {
                    Ok(EvalOutcome::dropped())
                }
            }
            NodeType::Router => {
                let cfg = RouterConfig::parse(&node_id, &node.config)?;
                let label = cfg
                    .rules
                    .iter()
                    .find(|rule| matches_all(&rule.conditions, &message.data))
                    .map_or(LABEL_DEFAULT, |rule| rule.label.as_str());
                Ok(EvalOutcome::branch(message, label))
            }
            NodeType::Switch => {
                let cfg = SwitchConfig::parse(&node_id, &node.config)?;
                let label = self.evaluate_switch(&cfg, &message);
                Ok(EvalOutcome::branch(message, label))
            }
            NodeType::Stateful => {
                let cfg = StatefulConfig::parse(&node_id, &node.config)?;
                let total = self.stateful.apply(workflow_id, node.id, cfg.operation, &message.data, &cfg.field);
                let output_field = cfg.resolved_output_field();
                message
                    .data
                    .set_path(&output_field, hermod_core::Value::F64(total))
                    .map_err(|e| NodeError::Evaluation { node_id: node_id.clone(), message: e.to_string() })?;
                Ok(EvalOutcome::pass(message))
            }
            NodeType::Merge => {
                let cfg = MergeConfig::parse(&node_id, &node.config)?;
                // A merge node's own config only names the strategy; the
                // actual folding of multiple inbound deliveries into one
                // message happens in the router, which holds the other
                // pending deliveries this node is waiting on.
                let _ = cfg.strategy;
                Ok(EvalOutcome::pass(message))
            }
            NodeType::Validator => self.evaluate_validator(&node_id, node, message),
        }
    }

    fn evaluate_switch(&self, cfg: &SwitchConfig, message: &Message) -> String {
        for case in &cfg.cases {
            let matched = if let (Some(field), Some(expected)) = (&cfg.field, &case.value) {
                message
                    .data
                    .get_path(field)
                    .is_some_and(|actual| actual.render() == render_json_scalar(expected))
            } else {
                matches_all(&case.conditions, &message.data)
            };
            if matched {
                return case.label.clone();
            }
        }
        LABEL_DEFAULT.to_string()
    }

    fn evaluate_transformation(
        &self,
        node_id: &str,
        node: &Node,
        mut message: Message,
    ) -> Result<EvalOutcome, NodeError> {
        let cfg = TransformationConfig::parse(node_id, &node.config)?;
        for step in cfg.steps() {
            let Some(transformer) = self.transformers.get(&step.transformer) else {
                return self.handle_transform_error(
                    node_id,
                    step.on_error,
                    message,
                    format!("unknown transformer: {}", step.transformer),
                );
            };
            if let Err(err) = transformer.apply(&mut message.data, &step.params) {
                return self.handle_transform_error(node_id, step.on_error, message, err.to_string());
            }
        }
        Ok(EvalOutcome::pass(message))
    }

    fn handle_transform_error(
        &self,
        node_id: &str,
        on_error: OnError,
        message: Message,
        reason: String,
    ) -> Result<EvalOutcome, NodeError> {
        match on_error {
            OnError::Fail => Err(NodeError::Evaluation { node_id: node_id.to_string(), message: reason }),
            OnError::Continue => Ok(EvalOutcome::branch(message, LABEL_ERROR)),
            OnError::Drop => Ok(EvalOutcome::dropped()),
        }
    }

    fn evaluate_validator(
        &self,
        node_id: &str,
        node: &Node,
        mut message: Message,
    ) -> Result<EvalOutcome, NodeError> {
        let cfg = ValidatorConfig::parse(node_id, &node.config)?;
        let valid = matches_all(&cfg.conditions, &message.data);
        match cfg.mode {
            ValidatorMode::Filter if !valid => Ok(EvalOutcome::dropped()),
            ValidatorMode::Filter => Ok(EvalOutcome::pass(message)),
            ValidatorMode::Annotate => {
                message
                    .data
                    .set_path(&cfg.as_field, hermod_core::Value::Bool(valid))
                    .map_err(|e| NodeError::Evaluation { node_id: node_id.to_string(), message: e.to_string() })?;
                Ok(EvalOutcome::pass(message))
            }
        }
    }
}

impl Default for NodeEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn render_json_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string().trim_matches('"').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_core::{NodeId, Value};
    use hermod_message::Operation;
    use hermod_model::Node as ModelNode;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn msg(data: Value) -> Message {
        let mut message = Message::new(Operation::Create, "public", "orders");
        message.data = data;
        message
    }

    fn map(pairs: &[(&str, Value)]) -> Value {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert((*k).to_string(), v.clone());
        }
        Value::Map(m)
    }

    #[test]
    fn source_and_sink_pass_through_unchanged() {
        let evaluator = NodeEvaluator::new();
        let node = ModelNode::new(NodeId::v4(), NodeType::Source);
        let outcome = evaluator.evaluate(WorkflowId::v4(), &node, msg(Value::Null)).unwrap();
        assert!(outcome.branch.is_none());
        assert!(outcome.message.is_some());
    }

    #[test]
    fn filter_drops_non_matching_messages() {
        let evaluator = NodeEvaluator::new();
        let node = ModelNode::new(NodeId::v4(), NodeType::Filter).with_config(json!({
            "conditions": [{"field": "amount", "operator": "gt", "value": 100}]
        }));
        let outcome = evaluator
            .evaluate(WorkflowId::v4(), &node, msg(map(&[("amount", Value::I64(5))])))
            .unwrap();
        assert!(outcome.message.is_none());
    }

    #[test]
    fn router_falls_back_to_default_label() {
        let evaluator = NodeEvaluator::new();
        let node = ModelNode::new(NodeId::v4(), NodeType::Router).with_config(json!({
            "rules": [{"label": "critical", "conditions": [
                {"field": "severity", "operator": "eq", "value": "critical"}
            ]}]
        }));
        let outcome = evaluator
            .evaluate(WorkflowId::v4(), &node, msg(map(&[("severity", Value::String("unknown".into()))])))
            .unwrap();
        assert_eq!(outcome.branch.as_deref(), Some(LABEL_DEFAULT));
    }

    #[test]
    fn switch_matches_on_field_value() {
        let evaluator = NodeEvaluator::new();
        let node = ModelNode::new(NodeId::v4(), NodeType::Switch).with_config(json!({
            "field": "region",
            "cases": [{"label": "eu", "value": "eu"}]
        }));
        let outcome = evaluator
            .evaluate(WorkflowId::v4(), &node, msg(map(&[("region", Value::String("eu".into()))])))
            .unwrap();
        assert_eq!(outcome.branch.as_deref(), Some("eu"));
    }

    #[test]
    fn stateful_sum_writes_running_total() {
        let evaluator = NodeEvaluator::new();
        let node = ModelNode::new(NodeId::v4(), NodeType::Stateful).with_config(json!({
            "field": "amount", "operation": "sum"
        }));
        let wf = WorkflowId::v4();
        evaluator.evaluate(wf, &node, msg(map(&[("amount", Value::I64(10))]))).unwrap();
        let outcome = evaluator.evaluate(wf, &node, msg(map(&[("amount", Value::I64(5))]))).unwrap();
        let out = outcome.message.unwrap();
        assert_eq!(out.data.get_path("amount_sum"), Some(&Value::F64(15.0)));
    }

    #[test]
    fn transformation_fail_policy_surfaces_as_node_error() {
        let evaluator = NodeEvaluator::new();
        let node = ModelNode::new(NodeId::v4(), NodeType::Transformation).with_config(json!({
            "transformer": "uppercase",
            "params": {"field": "missing"},
            "on_error": "fail"
        }));
        let err = evaluator.evaluate(WorkflowId::v4(), &node, msg(Value::Null)).unwrap_err();
        assert!(matches!(err, NodeError::PathNotFound(_)));
    }

    #[test]
    fn transformation_continue_policy_routes_error_branch() {
        let evaluator = NodeEvaluator::new();
        let node = ModelNode::new(NodeId::v4(), NodeType::Transformation).with_config(json!({
            "transformer": "uppercase",
            "params": {"field": "missing"},
            "on_error": "continue"
        }));
        let outcome = evaluator.evaluate(WorkflowId::v4(), &node, msg(Value::Null)).unwrap();
        assert_eq!(outcome.branch.as_deref(), Some(LABEL_ERROR));
        assert!(outcome.message.is_some());
    }

    #[test]
    fn transformation_drop_policy_filters_the_message() {
        let evaluator = NodeEvaluator::new();
        let node = ModelNode::new(NodeId::v4(), NodeType::Transformation).with_config(json!({
            "transformer": "uppercase",
            "params": {"field": "missing"},
            "on_error": "drop"
        }));
        let outcome = evaluator.evaluate(WorkflowId::v4(), &node, msg(Value::Null)).unwrap();
        assert!(outcome.message.is_none());
    }

    #[test]
    fn validator_filter_mode_drops_invalid_messages() {
        let evaluator = NodeEvaluator::new();
        let node = ModelNode::new(NodeId::v4(), NodeType::Validator).with_config(json!({
            "conditions": [{"field": "amount", "operator": "gt", "value": 0}],
            "mode": "filter"
        }));
        let outcome = evaluator
            .evaluate(WorkflowId::v4(), &node, msg(map(&[("amount", Value::I64(-1))])))
            .unwrap();
        assert!(outcome.message.is_none());
    }

    #[test]
    fn validator_annotate_mode_tags_the_field() {
        let evaluator = NodeEvaluator::new();
        let node = ModelNode::new(NodeId::v4(), NodeType::Validator).with_config(json!({
            "conditions": [{"field": "amount", "operator": "gt", "value": 0}],
            "mode": "annotate"
        }));
        let outcome = evaluator
            .evaluate(WorkflowId::v4(), &node, msg(map(&[("amount", Value::I64(-1))])))
            .unwrap();
        let out = outcome.message.unwrap();
        assert_eq!(out.data.get_path("is_valid"), Some(&Value::Bool(false)));
    }
}
