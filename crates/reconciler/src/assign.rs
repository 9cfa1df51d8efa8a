//! Assignment decision: explicit pin, else resource-aware rendezvous
//! hashing with hysteresis (spec §4.2 step 2, §4.3).

use std::hash::Hasher;

use hermod_core::WorkerId;
use hermod_model::{Worker, Workflow};
use twox_hash::XxHash32;

/// `weight(w)` from spec §4.3: a worker with headroom scores higher; an
/// incumbent gets a 15% hysteresis bonus so converging loads don't flap.
#[must_use]
pub fn weight(worker: &Worker, current_owner: Option<WorkerId>) -> f64 {
    let cpu_headroom = (1.1 - worker.cpu_usage).max(0.05);
    let mem_headroom = (1.1 - worker.mem_usage).max(0.05);
    let mut w = cpu_headroom * mem_headroom;
    if current_owner == Some(worker.id) {
        w *= 1.15;
    }
    w
}

/// `score(w, workflow_id)` from spec §4.3.
#[must_use]
pub fn score(worker: &Worker, workflow_id: hermod_core::WorkflowId, current_owner: Option<WorkerId>) -> f64 {
    let key = format!("{}:{workflow_id}", worker.id);
    f64::from(hash32(&key)) * weight(worker, current_owner)
}

fn hash32(data: &str) -> u32 {
    let mut hasher = XxHash32::with_seed(0);
    hasher.write(data.as_bytes());
    hasher.finish() as u32
}

/// Decide which worker, if any, owns `workflow` this cycle (spec §4.2
/// step 2): an operator pin wins outright; absent one, the candidate with
/// the highest rendezvous score wins, ties broken by lexicographic id.
/// Returns `None` if `workflow.pinned_worker` names a worker not in
/// `candidates` and no other candidate is online, or `candidates` is
/// empty.
#[must_use]
pub fn assign_workflow(
    workflow: &Workflow,
    candidates: &[Worker],
    current_owner: Option<WorkerId>,
) -> Option<WorkerId> {
    if let Some(pinned) = workflow.pinned_worker {
        return Some(pinned);
    }
    assign_via_rendezvous(candidates, workflow.id, current_owner)
}

fn assign_via_rendezvous(
    candidates: &[Worker],
    workflow_id: hermod_core::WorkflowId,
    current_owner: Option<WorkerId>,
) -> Option<WorkerId> {
    candidates
        .iter()
        .map(|w| (w.id, score(w, workflow_id, current_owner)))
        .fold(None::<(WorkerId, f64)>, |best, (id, s)| match best {
            None => Some((id, s)),
            Some((best_id, best_s)) => {
                if s > best_s || (s == best_s && id.to_string() < best_id.to_string()) {
                    Some((id, s))
                } else {
                    Some((best_id, best_s))
                }
            }
        })
        .map(|(id, _)| id)
}
