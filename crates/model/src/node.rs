//! Node and Edge records (spec §3).

use hermod_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The kind of a DAG node (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Ingress from a catalog source.
    Source,
    /// Egress to a catalog sink.
    Sink,
    /// Applies a configured transformer (or `pipeline` of transformers).
    Transformation,
    /// Evaluates a list of conjunctive conditions, returns `true`/`false`.
    Condition,
    /// Evaluates ordered rules, returns the first matching label or `default`.
    Router,
    /// Keys on a field value or per-case conditions, returns a label or `default`.
    Switch,
    /// Evaluates a list of conjunctive conditions; passes the message
    /// through on match, filters it otherwise.
    Filter,
    /// Accumulates per-(workflow, node) state across messages.
    Stateful,
    /// Identity node; merging logic lives on its inbound edges.
    Merge,
    /// Evaluates a schema/condition set; can filter or annotate the message.
    Validator,
}

/// A named input → expected-output pair attached to a node for
/// unit-testing its configuration in isolation (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUnitTest {
    /// Test name, for reporting.
    pub name: String,
    /// Input payload.
    pub input: JsonValue,
    /// Expected output payload.
    pub expected: JsonValue,
}

/// A DAG node (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// DAG-unique id.
    pub id: NodeId,
    /// The node's type, which determines how `config` is interpreted.
    pub node_type: NodeType,
    /// Catalog key for `source`/`sink` nodes; `None` otherwise.
    pub ref_id: Option<String>,
    /// Type-specific configuration. Semantics are per-`node_type`; see
    /// `hermod-node` for the config shape each type expects.
    pub config: JsonValue,
    /// Named input/output pairs for isolated unit-testing of this node.
    #[serde(default)]
    pub unit_tests: Vec<NodeUnitTest>,
}

impl Node {
    /// Construct a node with empty config and no unit tests.
    #[must_use]
    pub fn new(id: NodeId, node_type: NodeType) -> Self {
        Self {
            id,
            node_type,
            ref_id: None,
            config: JsonValue::Object(serde_json::Map::new()),
            unit_tests: Vec::new(),
        }
    }

    /// Builder: attach a catalog ref id (for `source`/`sink` nodes).
    #[must_use]
    pub fn with_ref(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    /// Builder: attach configuration.
    #[must_use]
    pub fn with_config(mut self, config: JsonValue) -> Self {
        self.config = config;
        self
    }
}

/// A DAG edge (spec §3). Merges are implicit: a node with in-degree > 1
/// waits for all inbound branches before firing (see `hermod-node`'s
/// router for the merge-strategy semantics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Edge id.
    pub id: hermod_core::EdgeId,
    /// Source node; must reference an existing node.
    pub source_id: NodeId,
    /// Target node; must reference an existing node.
    pub target_id: NodeId,
    /// Branch label for `condition`/`switch`/`router`/error edges.
    /// `None` (or empty) means the delivery is unconditional.
    #[serde(default)]
    pub label: Option<String>,
}

impl Edge {
    /// Construct an unconditional edge.
    #[must_use]
    pub fn new(id: hermod_core::EdgeId, source_id: NodeId, target_id: NodeId) -> Self {
        Self {
            id,
            source_id,
            target_id,
            label: None,
        }
    }

    /// Builder: attach a branch label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// The reserved `error` branch label (spec §4.6).
pub const LABEL_ERROR: &str = "error";
/// The reserved `default` branch label (spec §4.6).
pub const LABEL_DEFAULT: &str = "default";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_builder_sets_ref_and_config() {
        let node = Node::new(NodeId::v4(), NodeType::Source)
            .with_ref("pg-source-1")
            .with_config(serde_json::json!({"table": "orders"}));
        assert_eq!(node.ref_id.as_deref(), Some("pg-source-1"));
        assert_eq!(node.config["table"], "orders");
    }

    #[test]
    fn edge_default_label_is_none() {
        let edge = Edge::new(hermod_core::EdgeId::v4(), NodeId::v4(), NodeId::v4());
        assert!(edge.label.is_none());
    }

    #[test]
    fn edge_with_label() {
        let edge = Edge::new(hermod_core::EdgeId::v4(), NodeId::v4(), NodeId::v4())
            .with_label(LABEL_ERROR);
        assert_eq!(edge.label.as_deref(), Some("error"));
    }
}
