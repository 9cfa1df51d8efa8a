//! Structural-equality signature of a running engine's live
//! configuration, for the reconciler's per-cycle drift check (spec §4.2
//! step 7: "compare the live engine's source/sink/node/edge
//! configuration against the catalog using structural equality").

use hermod_model::{Sink, Source, Workflow};

/// A serialized snapshot of everything that would require a
/// stop-then-start if it changed underneath a running engine: the DAG,
/// the workflow policy, and the config of every source/sink it touches.
///
/// `serde_json::Value` gives structural `PartialEq` for free over the
/// model types' existing `Serialize` impls, without requiring
/// `hermod-model` to derive `PartialEq` on every record just for this
/// one comparison.
pub type ConfigSignature = serde_json::Value;

/// Compute the signature for `workflow` given the source/sink records
/// its DAG references, in a stable (id-sorted) order so two
/// observations of the same configuration always compare equal
/// regardless of catalog listing order.
#[must_use]
pub fn compute(workflow: &Workflow, mut sources: Vec<Source>, mut sinks: Vec<Sink>) -> ConfigSignature {
    sources.sort_by_key(|s| s.id);
    sinks.sort_by_key(|s| s.id);
    serde_json::json!({
        "dag": workflow.dag,
        "policy": workflow.policy,
        "sources": sources,
        "sinks": sinks,
    })
}
