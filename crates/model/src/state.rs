//! Stateful-node state blobs and lease records (spec §3, §4.1, §4.6
//! "Stateful aggregation").

use chrono::{DateTime, Utc};
use hermod_core::{NodeId, WorkerId, WorkflowId};
use serde::{Deserialize, Serialize};

/// Opaque, versioned accumulator state for a single stateful node within a
/// workflow (spec §4.6). The byte encoding is owned by the node
/// evaluator; the catalog stores it as an opaque blob keyed by
/// `(workflow_id, node_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    /// The workflow this state belongs to.
    pub workflow_id: WorkflowId,
    /// The stateful node this state belongs to.
    pub node_id: NodeId,
    /// Opaque accumulator bytes, format owned by the evaluator.
    pub data: Vec<u8>,
    /// Monotonically increasing version, bumped on every write; used for
    /// compare-and-swap persistence.
    pub version: u64,
}

impl NodeState {
    /// Construct the initial (version 0) state for a node.
    #[must_use]
    pub fn initial(workflow_id: WorkflowId, node_id: NodeId, data: Vec<u8>) -> Self {
        Self {
            workflow_id,
            node_id,
            data,
            version: 0,
        }
    }

    /// Produce the next version with updated data, for a subsequent CAS
    /// write.
    #[must_use]
    pub fn next(&self, data: Vec<u8>) -> Self {
        Self {
            workflow_id: self.workflow_id,
            node_id: self.node_id,
            data,
            version: self.version + 1,
        }
    }
}

/// A workflow lease (spec §4.1). The catalog is the source of truth; this
/// is the in-memory/transport representation shared between
/// `hermod-catalog` and `hermod-lease`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    /// The workflow this lease governs.
    pub workflow_id: WorkflowId,
    /// The worker holding the lease.
    pub worker_id: WorkerId,
    /// Opaque fencing token, unique per acquisition, used to detect stale
    /// writers after a steal (spec §4.1 "fencing").
    pub owner_id: String,
    /// Lease expiry; a renew before this instant extends it, a renew after
    /// it fails as `RenewExhausted`.
    pub lease_until: DateTime<Utc>,
}

impl Lease {
    /// `true` if `now` is past `lease_until`, meaning another worker may
    /// acquire this lease.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.lease_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_state_bumps_version() {
        let s0 = NodeState::initial(WorkflowId::v4(), NodeId::v4(), vec![1, 2, 3]);
        let s1 = s0.next(vec![4, 5, 6]);
        assert_eq!(s1.version, 1);
        assert_eq!(s1.data, vec![4, 5, 6]);
        assert_eq!(s1.workflow_id, s0.workflow_id);
    }

    #[test]
    fn lease_expiry() {
        let now = Utc::now();
        let lease = Lease {
            workflow_id: WorkflowId::v4(),
            worker_id: WorkerId::v4(),
            owner_id: "fence-1".into(),
            lease_until: now - chrono::Duration::seconds(1),
        };
        assert!(lease.is_expired(now));
    }
}
