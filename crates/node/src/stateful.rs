//! The `stateful` node type's in-process accumulator (spec §4.6:
//! "accumulates per-(workflow, node) state across messages").
//!
//! Durability across restarts is the engine's concern, not this crate's:
//! [`StatefulStore::snapshot`]/[`restore`](StatefulStore::restore) give it
//! something to pass through `Catalog::update_node_state`/`get_node_states`
//! (spec §6).

use dashmap::DashMap;
use hermod_core::{NodeId, Value, WorkflowId};
use serde::{Deserialize, Serialize};

/// Which reduction a `stateful` node applies to its configured field on
/// every message (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatefulOp {
    /// Increment the accumulator by one per message.
    Count,
    /// Add the numeric value of the configured field to the accumulator.
    Sum,
}

/// The persisted shape of one node's accumulator (what
/// [`StatefulStore::snapshot`] hands to the catalog).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Accumulator {
    /// Running total.
    pub value: f64,
}

/// In-process accumulator state for every `(workflow, node)` pair running
/// in this engine instance.
#[derive(Default)]
pub struct StatefulStore {
    state: DashMap<(WorkflowId, NodeId), Accumulator>,
}

impl StatefulStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `op` to the accumulator for `(workflow_id, node_id)`, folding
    /// in the numeric value at `field` (ignored for [`StatefulOp::Count`]),
    /// and return the new total.
    pub fn apply(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        op: StatefulOp,
        data: &Value,
        field: &str,
    ) -> f64 {
        let mut entry = self.state.entry((workflow_id, node_id)).or_default();
        match op {
            StatefulOp::Count => entry.value += 1.0,
            StatefulOp::Sum => {
                let amount = data.get_path(field).and_then(Value::as_f64).unwrap_or(0.0);
                entry.value += amount;
            }
        }
        entry.value
    }

    /// Current value without mutating, defaulting to zero for a node that
    /// has never seen a message.
    #[must_use]
    pub fn current(&self, workflow_id: WorkflowId, node_id: NodeId) -> f64 {
        self.state.get(&(workflow_id, node_id)).map_or(0.0, |a| a.value)
    }

    /// Snapshot one node's accumulator for durable checkpointing.
    #[must_use]
    pub fn snapshot(&self, workflow_id: WorkflowId, node_id: NodeId) -> Accumulator {
        self.state.get(&(workflow_id, node_id)).map_or_else(Accumulator::default, |a| *a)
    }

    /// Restore one node's accumulator from a durable checkpoint.
    pub fn restore(&self, workflow_id: WorkflowId, node_id: NodeId, accumulator: Accumulator) {
        self.state.insert((workflow_id, node_id), accumulator);
    }

    /// Drop all accumulators for a workflow (spec §4.4 "StopEngine" tear-down).
    pub fn clear_workflow(&self, workflow_id: WorkflowId) {
        self.state.retain(|(wf, _), _| *wf != workflow_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn count_increments_by_one_regardless_of_field() {
        let store = StatefulStore::new();
        let wf = WorkflowId::v4();
        let node = NodeId::v4();
        store.apply(wf, node, StatefulOp::Count, &Value::Null, "amount");
        let total = store.apply(wf, node, StatefulOp::Count, &Value::Null, "amount");
        assert_eq!(total, 2.0);
    }

    #[test]
    fn sum_adds_the_configured_field() {
        let store = StatefulStore::new();
        let wf = WorkflowId::v4();
        let node = NodeId::v4();
        let mut map = BTreeMap::new();
        map.insert("amount".to_string(), Value::I64(10));
        let data = Value::Map(map);
        store.apply(wf, node, StatefulOp::Sum, &data, "amount");
        let total = store.apply(wf, node, StatefulOp::Sum, &data, "amount");
        assert_eq!(total, 20.0);
    }

    #[test]
    fn distinct_nodes_in_the_same_workflow_do_not_share_state() {
        let store = StatefulStore::new();
        let wf = WorkflowId::v4();
        let a = NodeId::v4();
        let b = NodeId::v4();
        store.apply(wf, a, StatefulOp::Count, &Value::Null, "x");
        assert_eq!(store.current(wf, a), 1.0);
        assert_eq!(store.current(wf, b), 0.0);
    }

    #[test]
    fn snapshot_and_restore_roundtrip() {
        let store = StatefulStore::new();
        let wf = WorkflowId::v4();
        let node = NodeId::v4();
        store.apply(wf, node, StatefulOp::Count, &Value::Null, "x");
        let snap = store.snapshot(wf, node);

        let restored = StatefulStore::new();
        restored.restore(wf, node, snap);
        assert_eq!(restored.current(wf, node), 1.0);
    }

    #[test]
    fn clear_workflow_drops_only_its_own_nodes() {
        let store = StatefulStore::new();
        let wf_a = WorkflowId::v4();
        let wf_b = WorkflowId::v4();
        let node = NodeId::v4();
        store.apply(wf_a, node, StatefulOp::Count, &Value::Null, "x");
        store.apply(wf_b, node, StatefulOp::Count, &Value::Null, "x");
        store.clear_workflow(wf_a);
        assert_eq!(store.current(wf_a, node), 0.0);
        assert_eq!(store.current(wf_b, node), 1.0);
    }
}
