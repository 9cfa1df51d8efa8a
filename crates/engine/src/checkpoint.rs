//! Checkpoint coordinator (spec §4.5 "Checkpoint & recovery"): persists
//! source resume state and `stateful` node accumulators, and restores
//! them at engine start. Each entity is checkpointed independently —
//! one source's write failing does not block another's.

use hermod_catalog::Catalog;
use hermod_core::{NodeId, SourceId, WorkflowId};
use hermod_error::CatalogError;
use hermod_node::{Accumulator, StatefulStore};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Persists and restores the durable half of engine state through a
/// [`Catalog`].
pub struct CheckpointCoordinator {
    catalog: Arc<dyn Catalog>,
}

impl CheckpointCoordinator {
    /// Construct a coordinator over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Persist a source adapter's resume-position state.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the write fails.
    pub async fn checkpoint_source(
        &self,
        source_id: SourceId,
        state: BTreeMap<String, String>,
    ) -> Result<(), CatalogError> {
        self.catalog.update_source_state(source_id, state).await
    }

    /// Persist one `stateful` node's accumulator.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the write fails.
    pub async fn checkpoint_node(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        accumulator: Accumulator,
    ) -> Result<(), CatalogError> {
        let bytes = serde_json::to_vec(&accumulator).expect("Accumulator always serializes");
        self.catalog.update_node_state(workflow_id, node_id, bytes).await
    }

    /// Restore every persisted accumulator for `workflow_id` into
    /// `store`. An unreadable entry (e.g. left over from an older
    /// accumulator shape) is logged and skipped rather than failing the
    /// whole restore.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if listing node states itself fails.
    pub async fn restore_nodes(
        &self,
        workflow_id: WorkflowId,
        store: &StatefulStore,
    ) -> Result<(), CatalogError> {
        let states = self.catalog.get_node_states(workflow_id).await?;
        for (node_id, bytes) in states {
            match serde_json::from_slice::<Accumulator>(&bytes) {
                Ok(accumulator) => store.restore(workflow_id, node_id, accumulator),
                Err(err) => {
                    tracing::warn!(%node_id, %err, "discarding unreadable checkpointed accumulator");
                }
            }
        }
        Ok(())
    }
}
