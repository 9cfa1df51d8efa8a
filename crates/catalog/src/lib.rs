#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Catalog
//!
//! The [`Catalog`] trait is the one seam between the workflow engine and
//! durable storage (spec §6). Any backing store — Postgres, a REST
//! facade, or this crate's own [`InMemoryCatalog`] — implements it.
//!
//! `InMemoryCatalog` is a reference implementation, not a production
//! backend: it holds everything in `DashMap`s and loses all state on
//! process exit. It exists for `apps/worker --catalog memory` local
//! smoke-testing and for the rest of the workspace's test suites.

mod memory;

pub use memory::InMemoryCatalog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hermod_core::{NodeId, SinkId, SourceId, WorkerId, WorkflowId};
use hermod_error::CatalogError;
use hermod_model::{Lease, Sink, Source, Worker, Workflow, WorkflowStatus};
use std::collections::BTreeMap;

/// A single trace or audit log entry (spec §6 "Trace/audit log append +
/// retention purges").
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// The workflow this entry concerns.
    pub workflow_id: WorkflowId,
    /// `"trace"` or `"audit"`.
    pub kind: &'static str,
    /// Entry timestamp, used for retention purges.
    pub recorded_at: DateTime<Utc>,
    /// Free-form entry body (already rendered, e.g. JSON).
    pub body: String,
}

/// Durable record operations the workflow engine core consumes (spec §6).
///
/// Every method can fail with a [`CatalogError`]; callers apply
/// [`hermod_error::Classify::is_transient`] to decide whether to retry at
/// the next tick or surface the failure.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch one workflow by id.
    async fn get_workflow(&self, id: WorkflowId) -> Result<Workflow, CatalogError>;
    /// List every workflow (spec §4.2 step 1: "single paginated list").
    async fn list_workflows(&self) -> Result<Vec<Workflow>, CatalogError>;
    /// Replace a workflow's full record (DAG, policy, ownership).
    async fn update_workflow(&self, workflow: Workflow) -> Result<(), CatalogError>;
    /// Update only a workflow's runtime status.
    async fn update_workflow_status(
        &self,
        id: WorkflowId,
        status: WorkflowStatus,
    ) -> Result<(), CatalogError>;

    /// Fetch one source by id.
    async fn get_source(&self, id: SourceId) -> Result<Source, CatalogError>;
    /// List every source.
    async fn list_sources(&self) -> Result<Vec<Source>, CatalogError>;
    /// Replace a source's configuration record.
    async fn update_source(&self, source: Source) -> Result<(), CatalogError>;
    /// Persist a source's resume-position state (spec §4.5 "Checkpoint &
    /// recovery").
    async fn update_source_state(
        &self,
        id: SourceId,
        state: BTreeMap<String, String>,
    ) -> Result<(), CatalogError>;

    /// Fetch one sink by id.
    async fn get_sink(&self, id: SinkId) -> Result<Sink, CatalogError>;
    /// List every sink.
    async fn list_sinks(&self) -> Result<Vec<Sink>, CatalogError>;
    /// Replace a sink's configuration record.
    async fn update_sink(&self, sink: Sink) -> Result<(), CatalogError>;

    /// Persist a stateful node's accumulator bytes (spec §4.6).
    async fn update_node_state(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        data: Vec<u8>,
    ) -> Result<(), CatalogError>;
    /// Fetch every stateful node's accumulator bytes for a workflow.
    async fn get_node_states(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<BTreeMap<NodeId, Vec<u8>>, CatalogError>;

    /// Attempt to acquire a workflow's lease. Must be CAS-semantic: it
    /// succeeds only if the lease is unheld or expired (spec §4.1).
    async fn acquire_workflow_lease(
        &self,
        id: WorkflowId,
        owner_id: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, CatalogError>;
    /// Extend an already-held lease. Must be CAS-semantic on `owner_id`
    /// matching the current holder (spec §4.1).
    async fn renew_workflow_lease(
        &self,
        id: WorkflowId,
        owner_id: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, CatalogError>;
    /// Release a held lease. A no-op if `owner_id` no longer matches.
    async fn release_workflow_lease(
        &self,
        id: WorkflowId,
        owner_id: &str,
    ) -> Result<(), CatalogError>;
    /// Look up the current lease for a workflow, if any.
    async fn get_lease(&self, id: WorkflowId) -> Result<Option<Lease>, CatalogError>;

    /// Fetch one worker by id.
    async fn get_worker(&self, id: WorkerId) -> Result<Worker, CatalogError>;
    /// Register a new worker.
    async fn create_worker(&self, worker: Worker) -> Result<(), CatalogError>;
    /// List every worker (spec §4.2 step 1).
    async fn list_workers(&self) -> Result<Vec<Worker>, CatalogError>;
    /// Record a worker's periodic heartbeat sample (spec §4.4).
    async fn update_worker_heartbeat(
        &self,
        id: WorkerId,
        cpu: f64,
        mem: f64,
        now: DateTime<Utc>,
    ) -> Result<(), CatalogError>;

    /// Append a trace or audit log entry.
    async fn append_log(&self, entry: LogEntry) -> Result<(), CatalogError>;
    /// Purge log entries recorded before `cutoff` for the given `kind`.
    async fn purge_logs(&self, kind: &'static str, cutoff: DateTime<Utc>) -> Result<u64, CatalogError>;
}
