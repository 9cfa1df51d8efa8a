#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Workflow
//!
//! DAG validation for a [`Workflow`](hermod_model::Workflow)'s nodes and
//! edges (spec §3 "must be a DAG", §8 validation scenarios): cycle
//! detection, dangling edges, unreachable sinks, and duplicate node ids.

use hermod_core::NodeId;
use hermod_model::{Dag, Node, NodeType};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::HashMap;
use thiserror::Error;

/// A validation failure, naming the offending node/edge (spec §8: "each
/// failing with a message naming the offending entity").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two nodes share the same id.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(NodeId),
    /// An edge references a node id absent from the DAG.
    #[error("edge {edge} references unknown node: {node}")]
    DanglingEdge {
        /// The offending edge's id.
        edge: hermod_core::EdgeId,
        /// The missing node id.
        node: NodeId,
    },
    /// The DAG contains a cycle.
    #[error("workflow graph contains a cycle")]
    Cycle,
    /// A `sink` node type is unreachable from any `source` node.
    #[error("sink {0} is unreachable from any source")]
    UnreachableSink(NodeId),
    /// The DAG has no source nodes at all.
    #[error("workflow has no source node")]
    NoSource,
    /// A node references a nonexistent branch label edge for its type
    /// (e.g. a `router` with zero outgoing edges).
    #[error("node {0} has no outgoing edges")]
    DeadEnd(NodeId),
}

/// A DAG validated against the invariants in spec §3/§8.
///
/// Construction via [`ValidatedDag::validate`] is the only way to obtain
/// one, so holding a `ValidatedDag` is a static guarantee the underlying
/// [`Dag`] is acyclic, edge-complete, and every sink is reachable.
#[derive(Debug, Clone)]
pub struct ValidatedDag {
    dag: Dag,
}

impl ValidatedDag {
    /// Validate a [`Dag`], returning the first violated invariant.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] naming the first offending node or edge
    /// found; checks run in the order: duplicate ids, dangling edges,
    /// cycles, missing source, dead ends, unreachable sinks.
    pub fn validate(dag: Dag) -> Result<Self, ValidationError> {
        let mut index_of: HashMap<NodeId, NodeIndex> = HashMap::with_capacity(dag.nodes.len());
        let mut graph: DiGraph<NodeId, ()> = DiGraph::with_capacity(dag.nodes.len(), dag.edges.len());

        for node in &dag.nodes {
            if index_of.contains_key(&node.id) {
                return Err(ValidationError::DuplicateNodeId(node.id));
            }
            index_of.insert(node.id, graph.add_node(node.id));
        }

        for edge in &dag.edges {
            let source = *index_of
                .get(&edge.source_id)
                .ok_or(ValidationError::DanglingEdge {
                    edge: edge.id,
                    node: edge.source_id,
                })?;
            let target = *index_of
                .get(&edge.target_id)
                .ok_or(ValidationError::DanglingEdge {
                    edge: edge.id,
                    node: edge.target_id,
                })?;
            graph.add_edge(source, target, ());
        }

        if is_cyclic_directed(&graph) {
            return Err(ValidationError::Cycle);
        }

        let sources: Vec<&Node> = dag
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Source)
            .collect();
        if sources.is_empty() {
            return Err(ValidationError::NoSource);
        }

        for node in &dag.nodes {
            let idx = index_of[&node.id];
            let has_outgoing = graph.neighbors(idx).next().is_some();
            let is_terminal = matches!(node.node_type, NodeType::Sink);
            if !has_outgoing && !is_terminal {
                return Err(ValidationError::DeadEnd(node.id));
            }
        }

        let mut reachable: std::collections::HashSet<NodeIndex> = std::collections::HashSet::new();
        for source in &sources {
            let idx = index_of[&source.id];
            let mut dfs = Dfs::new(&graph, idx);
            while let Some(visited) = dfs.next(&graph) {
                reachable.insert(visited);
            }
        }

        for node in &dag.nodes {
            if node.node_type == NodeType::Sink {
                let idx = index_of[&node.id];
                if !reachable.contains(&idx) {
                    return Err(ValidationError::UnreachableSink(node.id));
                }
            }
        }

        Ok(Self { dag })
    }

    /// Borrow the underlying validated DAG.
    #[must_use]
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Consume and return the underlying validated DAG.
    #[must_use]
    pub fn into_inner(self) -> Dag {
        self.dag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_core::{EdgeId, NodeId};
    use hermod_model::Edge;

    fn source(id: NodeId) -> Node {
        Node::new(id, NodeType::Source)
    }

    fn sink(id: NodeId) -> Node {
        Node::new(id, NodeType::Sink)
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let id = NodeId::v4();
        let dag = Dag {
            nodes: vec![source(id), sink(id)],
            edges: vec![],
        };
        assert_eq!(
            ValidatedDag::validate(dag).unwrap_err(),
            ValidationError::DuplicateNodeId(id)
        );
    }

    #[test]
    fn rejects_dangling_edge() {
        let src = NodeId::v4();
        let missing = NodeId::v4();
        let dag = Dag {
            nodes: vec![source(src)],
            edges: vec![Edge::new(EdgeId::v4(), src, missing)],
        };
        let err = ValidatedDag::validate(dag).unwrap_err();
        assert!(matches!(err, ValidationError::DanglingEdge { node, .. } if node == missing));
    }

    #[test]
    fn rejects_cycle() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let dag = Dag {
            nodes: vec![source(a), Node::new(b, NodeType::Transformation)],
            edges: vec![
                Edge::new(EdgeId::v4(), a, b),
                Edge::new(EdgeId::v4(), b, a),
            ],
        };
        assert_eq!(ValidatedDag::validate(dag).unwrap_err(), ValidationError::Cycle);
    }

    #[test]
    fn rejects_missing_source() {
        let a = NodeId::v4();
        let dag = Dag {
            nodes: vec![sink(a)],
            edges: vec![],
        };
        assert_eq!(ValidatedDag::validate(dag).unwrap_err(), ValidationError::NoSource);
    }

    #[test]
    fn rejects_dead_end_non_sink() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let dag = Dag {
            nodes: vec![source(a), Node::new(b, NodeType::Transformation)],
            edges: vec![Edge::new(EdgeId::v4(), a, b)],
        };
        assert_eq!(ValidatedDag::validate(dag).unwrap_err(), ValidationError::DeadEnd(b));
    }

    #[test]
    fn rejects_unreachable_sink() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let unreachable_sink = NodeId::v4();
        let dag = Dag {
            nodes: vec![source(a), sink(b), sink(unreachable_sink)],
            edges: vec![Edge::new(EdgeId::v4(), a, b)],
        };
        assert_eq!(
            ValidatedDag::validate(dag).unwrap_err(),
            ValidationError::UnreachableSink(unreachable_sink)
        );
    }

    #[test]
    fn accepts_a_valid_linear_dag() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let dag = Dag {
            nodes: vec![
                source(a),
                Node::new(b, NodeType::Transformation),
                sink(c),
            ],
            edges: vec![
                Edge::new(EdgeId::v4(), a, b),
                Edge::new(EdgeId::v4(), b, c),
            ],
        };
        let validated = ValidatedDag::validate(dag).unwrap();
        assert_eq!(validated.dag().nodes.len(), 3);
    }

    #[test]
    fn accepts_a_fan_out_merge_dag() {
        let a = NodeId::v4();
        let b1 = NodeId::v4();
        let b2 = NodeId::v4();
        let merge = NodeId::v4();
        let sink_id = NodeId::v4();
        let dag = Dag {
            nodes: vec![
                source(a),
                Node::new(b1, NodeType::Condition),
                Node::new(b2, NodeType::Condition),
                Node::new(merge, NodeType::Merge),
                sink(sink_id),
            ],
            edges: vec![
                Edge::new(EdgeId::v4(), a, b1),
                Edge::new(EdgeId::v4(), a, b2),
                Edge::new(EdgeId::v4(), b1, merge),
                Edge::new(EdgeId::v4(), b2, merge),
                Edge::new(EdgeId::v4(), merge, sink_id),
            ],
        };
        assert!(ValidatedDag::validate(dag).is_ok());
    }
}
