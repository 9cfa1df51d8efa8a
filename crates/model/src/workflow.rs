//! Workflow record (spec §3, §4.5).

use crate::node::{Edge, Node};
use crate::policy::Policy;
use chrono::{DateTime, Utc};
use hermod_core::WorkerId;
use serde::{Deserialize, Serialize};

/// A workflow's DAG: nodes plus the edges connecting them (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dag {
    /// All nodes in the workflow, in no particular order.
    pub nodes: Vec<Node>,
    /// All edges in the workflow.
    pub edges: Vec<Edge>,
}

/// Lease ownership metadata embedded on the workflow record (spec §4.1,
/// mirrored by the authoritative row in the catalog's lease table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ownership {
    /// The worker currently holding the lease.
    pub worker_id: WorkerId,
    /// Opaque fencing token identifying this specific lease instance.
    pub owner_id: String,
    /// Lease expiry; past this instant the lease is considered free.
    pub lease_until: DateTime<Utc>,
}

/// Runtime status of a workflow (spec §4.5's state machine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Not currently assigned to any worker.
    Stopped,
    /// Assigned and its engine is starting up.
    Starting,
    /// Assigned and actively processing.
    Running,
    /// Assigned but idle-parked (tier != hot, past idle timeout).
    Parked,
    /// Terminated after exhausting retries/reconnects.
    Error {
        /// Human-readable failure reason.
        reason: String,
    },
    /// Shutting down gracefully.
    Stopping,
    /// Being restarted by the reconciler after detecting configuration
    /// drift (spec §4.2 step 7). Distinct from `Error`: this is an
    /// expected, healthy transition, not a failure.
    Restarting,
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        Self::Stopped
    }
}

/// A workflow: identity, DAG, activation flag, runtime status, and policy
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Catalog-unique id.
    pub id: hermod_core::WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// If `false`, the reconciler never assigns this workflow to a worker.
    pub active: bool,
    /// Runtime status, owned by the assigned worker's engine.
    #[serde(default)]
    pub status: WorkflowStatus,
    /// The pipeline DAG.
    pub dag: Dag,
    /// Current lease ownership, if assigned.
    pub ownership: Option<Ownership>,
    /// Policy knobs.
    #[serde(default)]
    pub policy: Policy,
    /// Operator-set explicit assignment, overriding rendezvous hashing
    /// (spec §4.2 step 2: "explicit pin takes priority over the hash").
    /// Distinct from `ownership`, which records the lease's *current*
    /// holder rather than an operator's standing preference.
    #[serde(default)]
    pub pinned_worker: Option<WorkerId>,
}

impl Workflow {
    /// Construct an inactive workflow with an empty DAG and default policy.
    #[must_use]
    pub fn new(id: hermod_core::WorkflowId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: false,
            status: WorkflowStatus::default(),
            dag: Dag::default(),
            ownership: None,
            policy: Policy::default(),
            pinned_worker: None,
        }
    }

    /// `true` if currently assigned to a worker (lease held and unexpired).
    #[must_use]
    pub fn is_assigned(&self, now: DateTime<Utc>) -> bool {
        self.ownership
            .as_ref()
            .is_some_and(|o| o.lease_until > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_core::WorkflowId;

    #[test]
    fn new_workflow_is_inactive_and_unassigned() {
        let wf = Workflow::new(WorkflowId::v4(), "orders-sync");
        assert!(!wf.active);
        assert!(wf.ownership.is_none());
        assert_eq!(wf.status, WorkflowStatus::Stopped);
    }

    #[test]
    fn is_assigned_checks_lease_expiry() {
        let mut wf = Workflow::new(WorkflowId::v4(), "orders-sync");
        let now = Utc::now();
        wf.ownership = Some(Ownership {
            worker_id: WorkerId::v4(),
            owner_id: "fence-1".into(),
            lease_until: now - chrono::Duration::seconds(1),
        });
        assert!(!wf.is_assigned(now));

        wf.ownership.as_mut().unwrap().lease_until = now + chrono::Duration::seconds(30);
        assert!(wf.is_assigned(now));
    }

    #[test]
    fn status_serde_tag() {
        let status = WorkflowStatus::Error {
            reason: "reconnect exhausted".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "error");
        assert_eq!(json["reason"], "reconnect exhausted");
    }

    #[test]
    fn restarting_is_a_distinct_state_from_error() {
        let status = WorkflowStatus::Restarting;
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "restarting");
        assert_ne!(status, WorkflowStatus::Error { reason: "Restarting".into() });
    }
}
