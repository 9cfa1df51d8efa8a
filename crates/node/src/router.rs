//! DAG traversal: carries one message from its ingress `source` node
//! through evaluation at every reachable node to the `sink`s it lands on
//! (spec §4.6).

use crate::config::MergeConfig;
use crate::evaluate::NodeEvaluator;
use crate::merge;
use hermod_core::{NodeId, WorkflowId};
use hermod_error::NodeError;
use hermod_message::Message;
use hermod_model::{Node, NodeType};
use hermod_telemetry::MetricsRegistry;
use hermod_workflow::ValidatedDag;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

/// A node evaluation failure encountered while routing one message,
/// naming the node it occurred at.
#[derive(Debug, Error)]
#[error("node {node_id} failed while routing: {source}")]
pub struct RouteError {
    /// The node where evaluation failed.
    pub node_id: NodeId,
    /// The underlying evaluation error.
    #[source]
    pub source: NodeError,
}

/// Everything one call to [`Router::route`] produced: the terminal `sink`
/// deliveries reached by the message (a `transformation` can fan a single
/// input into multiple sinks by way of diverging branches).
#[derive(Debug, Default)]
pub struct RouteResult {
    /// `(sink node id, message delivered to it)` pairs, in delivery order.
    pub sinks: Vec<(NodeId, Message)>,
}

/// Pre-indexes a [`ValidatedDag`] for repeated, allocation-light routing
/// of many messages (spec §4.6).
pub struct Router {
    source_nodes: Vec<NodeId>,
    by_id: HashMap<NodeId, Node>,
    outgoing: HashMap<NodeId, Vec<hermod_model::Edge>>,
    in_degree: HashMap<NodeId, usize>,
    metrics: Arc<MetricsRegistry>,
}

impl Router {
    /// Build a router from a validated DAG.
    #[must_use]
    pub fn new(dag: &ValidatedDag, metrics: Arc<MetricsRegistry>) -> Self {
        let dag = dag.dag();
        let mut by_id = HashMap::with_capacity(dag.nodes.len());
        let mut source_nodes = Vec::new();
        for node in &dag.nodes {
            if node.node_type == NodeType::Source {
                source_nodes.push(node.id);
            }
            by_id.insert(node.id, node.clone());
        }

        let mut outgoing: HashMap<NodeId, Vec<hermod_model::Edge>> = HashMap::new();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        for edge in &dag.edges {
            outgoing.entry(edge.source_id).or_default().push(edge.clone());
            *in_degree.entry(edge.target_id).or_insert(0) += 1;
        }

        Self { source_nodes, by_id, outgoing, in_degree, metrics }
    }

    /// Route `message` from its recorded (or inferred) ingress node
    /// through the DAG to every `sink` it reaches.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] the first time a node's evaluation fails
    /// with its `on_error` policy set to `fail` (spec §4.6); partial
    /// progress made before the failing node (e.g. earlier sink
    /// deliveries already pushed to the worklist) is still returned is
    /// lost, matching an at-most-once delivery for the failing branch.
    pub fn route(
        &self,
        evaluator: &NodeEvaluator,
        workflow_id: WorkflowId,
        message: Message,
    ) -> Result<RouteResult, RouteError> {
        let ingress = self.resolve_ingress(&message);
        let mut queue: VecDeque<(NodeId, Message)> = VecDeque::new();
        queue.push_back((ingress, message));
        let mut pending_merges: HashMap<NodeId, Vec<Message>> = HashMap::new();
        let mut result = RouteResult::default();

        while let Some((node_id, msg)) = queue.pop_front() {
            let Some(node) = self.by_id.get(&node_id) else {
                tracing::warn!(%node_id, "router: delivery targets an unknown node, dropping");
                self.metrics.counter("router_unknown_target_node_total").inc();
                continue;
            };

            let ready = self.admit_for_merge(node, node_id, msg, &mut pending_merges);
            let Some(msg) = ready else { continue };

            let outcome = evaluator
                .evaluate(workflow_id, node, msg)
                .map_err(|source| RouteError { node_id, source })?;

            let Some(out_msg) = outcome.message else {
                continue;
            };

            if node.node_type == NodeType::Sink {
                result.sinks.push((node_id, out_msg));
                continue;
            }

            self.fan_out(node_id, outcome.branch.as_deref(), out_msg, &mut queue);
        }

        Ok(result)
    }

    /// For a `merge` node with in-degree > 1, accumulate deliveries until
    /// all are in, then fold them per its configured strategy. Every
    /// other node admits its single delivery immediately.
    fn admit_for_merge(
        &self,
        node: &Node,
        node_id: NodeId,
        msg: Message,
        pending_merges: &mut HashMap<NodeId, Vec<Message>>,
    ) -> Option<Message> {
        let in_degree = self.in_degree.get(&node_id).copied().unwrap_or(0);
        if node.node_type != NodeType::Merge || in_degree <= 1 {
            return Some(msg);
        }

        let bucket = pending_merges.entry(node_id).or_default();
        bucket.push(msg);
        if bucket.len() < in_degree {
            return None;
        }

        let mut drained = pending_merges.remove(&node_id).unwrap_or_default();
        let strategy = MergeConfig::parse(&node_id.to_string(), &node.config)
            .map(|cfg| cfg.strategy)
            .unwrap_or_default();
        let mut base = drained.remove(0);
        for extra in &drained {
            merge::merge(&mut base.data, &extra.data, strategy);
        }
        Some(base)
    }

    fn fan_out(
        &self,
        node_id: NodeId,
        branch: Option<&str>,
        message: Message,
        queue: &mut VecDeque<(NodeId, Message)>,
    ) {
        let edges = self.outgoing.get(&node_id).map(Vec::as_slice).unwrap_or(&[]);
        let matching: Vec<&hermod_model::Edge> = edges
            .iter()
            .filter(|edge| match branch {
                Some(label) => edge.label.as_deref() == Some(label),
                None => edge.label.is_none(),
            })
            .collect();

        if matching.is_empty() {
            tracing::warn!(%node_id, ?branch, "router: no matching outgoing edge, dropping message");
            self.metrics.counter("router_no_matching_edge_total").inc();
            return;
        }

        let last = matching.len() - 1;
        for (i, edge) in matching.into_iter().enumerate() {
            if i == last {
                queue.push_back((edge.target_id, message));
                break;
            }
            queue.push_back((edge.target_id, message.clone()));
        }
    }

    /// Resolve the ingress node for `message`: its recorded
    /// `_source_node_id` if present and known, else the DAG's first
    /// source node (an already-decided fallback; see `DESIGN.md`).
    fn resolve_ingress(&self, message: &Message) -> NodeId {
        if let Some(raw) = message.source_node_id() {
            if let Ok(id) = NodeId::parse(raw) {
                if self.by_id.contains_key(&id) {
                    return id;
                }
            }
        }

        tracing::warn!(
            recorded = message.source_node_id(),
            "router: message has no known source node id, falling back to the first source node"
        );
        self.metrics.counter("router_unknown_source_node_id_total").inc();
        self.source_nodes[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_core::{EdgeId, Value};
    use hermod_message::Operation;
    use hermod_model::{Dag, Edge, LABEL_DEFAULT, Node as ModelNode};
    use serde_json::json;

    fn metrics() -> Arc<MetricsRegistry> {
        Arc::new(MetricsRegistry::new())
    }

    fn msg() -> Message {
        Message::new(Operation::Create, "public", "orders")
    }

    #[test]
    fn linear_dag_routes_source_to_sink() {
        let source = NodeId::v4();
        let sink = NodeId::v4();
        let dag = Dag {
            nodes: vec![
                ModelNode::new(source, NodeType::Source),
                ModelNode::new(sink, NodeType::Sink),
            ],
            edges: vec![Edge::new(EdgeId::v4(), source, sink)],
        };
        let validated = ValidatedDag::validate(dag).unwrap();
        let router = Router::new(&validated, metrics());
        let evaluator = NodeEvaluator::new();

        let mut message = msg();
        message.set_source_node_id(source.to_string());
        let result = router.route(&evaluator, WorkflowId::v4(), message).unwrap();
        assert_eq!(result.sinks.len(), 1);
        assert_eq!(result.sinks[0].0, sink);
    }

    #[test]
    fn unknown_source_node_id_falls_back_to_first_source() {
        let source = NodeId::v4();
        let sink = NodeId::v4();
        let dag = Dag {
            nodes: vec![
                ModelNode::new(source, NodeType::Source),
                ModelNode::new(sink, NodeType::Sink),
            ],
            edges: vec![Edge::new(EdgeId::v4(), source, sink)],
        };
        let validated = ValidatedDag::validate(dag).unwrap();
        let router = Router::new(&validated, metrics());
        let evaluator = NodeEvaluator::new();

        let metrics_ref = router.metrics.clone();
        let result = router.route(&evaluator, WorkflowId::v4(), msg()).unwrap();
        assert_eq!(result.sinks.len(), 1);
        assert_eq!(metrics_ref.counter("router_unknown_source_node_id_total").get(), 1);
    }

    #[test]
    fn condition_node_routes_by_branch_label() {
        let source = NodeId::v4();
        let cond = NodeId::v4();
        let true_sink = NodeId::v4();
        let false_sink = NodeId::v4();
        let dag = Dag {
            nodes: vec![
                ModelNode::new(source, NodeType::Source),
                ModelNode::new(cond, NodeType::Condition).with_config(json!({
                    "conditions": [{"field": "amount", "operator": "gt", "value": 100}]
                })),
                ModelNode::new(true_sink, NodeType::Sink),
                ModelNode::new(false_sink, NodeType::Sink),
            ],
            edges: vec![
                Edge::new(EdgeId::v4(), source, cond),
                Edge::new(EdgeId::v4(), cond, true_sink).with_label("true"),
                Edge::new(EdgeId::v4(), cond, false_sink).with_label("false"),
            ],
        };
        let validated = ValidatedDag::validate(dag).unwrap();
        let router = Router::new(&validated, metrics());
        let evaluator = NodeEvaluator::new();

        let mut message = msg();
        message.set_source_node_id(source.to_string());
        let mut map = std::collections::BTreeMap::new();
        map.insert("amount".to_string(), Value::I64(500));
        message.data = Value::Map(map);

        let result = router.route(&evaluator, WorkflowId::v4(), message).unwrap();
        assert_eq!(result.sinks.len(), 1);
        assert_eq!(result.sinks[0].0, true_sink);
    }

    #[test]
    fn merge_node_waits_for_every_inbound_branch() {
        let source_a = NodeId::v4();
        let source_b = NodeId::v4();
        let merge = NodeId::v4();
        let sink = NodeId::v4();
        let dag = Dag {
            nodes: vec![
                ModelNode::new(source_a, NodeType::Source),
                ModelNode::new(source_b, NodeType::Source),
                ModelNode::new(merge, NodeType::Merge),
                ModelNode::new(sink, NodeType::Sink),
            ],
            edges: vec![
                Edge::new(EdgeId::v4(), source_a, merge),
                Edge::new(EdgeId::v4(), source_b, merge),
                Edge::new(EdgeId::v4(), merge, sink),
            ],
        };
        let validated = ValidatedDag::validate(dag).unwrap();
        let router = Router::new(&validated, metrics());
        let evaluator = NodeEvaluator::new();

        let mut message = msg();
        message.set_source_node_id(source_a.to_string());
        // Only one of two inbound branches delivered: the merge node must
        // not fire, so routing this single message produces no sink hit.
        let result = router.route(&evaluator, WorkflowId::v4(), message).unwrap();
        assert!(result.sinks.is_empty());
    }

    #[test]
    fn router_node_default_label_reaches_default_edge() {
        let source = NodeId::v4();
        let router_node = NodeId::v4();
        let default_sink = NodeId::v4();
        let dag = Dag {
            nodes: vec![
                ModelNode::new(source, NodeType::Source),
                ModelNode::new(router_node, NodeType::Router).with_config(json!({"rules": []})),
                ModelNode::new(default_sink, NodeType::Sink),
            ],
            edges: vec![
                Edge::new(EdgeId::v4(), source, router_node),
                Edge::new(EdgeId::v4(), router_node, default_sink).with_label(LABEL_DEFAULT),
            ],
        };
        let validated = ValidatedDag::validate(dag).unwrap();
        let router = Router::new(&validated, metrics());
        let evaluator = NodeEvaluator::new();

        let mut message = msg();
        message.set_source_node_id(source.to_string());
        let result = router.route(&evaluator, WorkflowId::v4(), message).unwrap();
        assert_eq!(result.sinks.len(), 1);
        assert_eq!(result.sinks[0].0, default_sink);
    }
}
