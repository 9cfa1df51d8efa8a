#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Registry
//!
//! The per-process owner of running workflow [`Engine`](hermod_engine::Engine)s
//! (spec §4.4): `StartWorkflow` assembles and launches an engine from
//! catalog rows, `StopEngine` tears one down gracefully (escalating to a
//! hard stop past a deadline), a background sweep idle-parks engines that
//! have gone quiet, and an hourly job purges trace/audit logs past their
//! configured retention.
//!
//! The registry does not decide *which* workflows this process should
//! run — that is [`hermod_reconciler`]'s job, driving this crate's public
//! API every sync cycle.

pub mod adapter_factory;
pub mod build;
pub mod signature;

pub use adapter_factory::{AdapterFactory, MockAdapterFactory};
pub use build::{BuildError, BuiltEngine, build_engine};
pub use signature::{ConfigSignature, compute as compute_signature};

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use hermod_catalog::Catalog;
use hermod_core::{NodeId, SinkId, SourceId, WorkflowId};
use hermod_engine::{ActivityCallback, Engine, EngineStatus, StatusCallback, TraceCallback, TraceStep};
use hermod_error::CatalogError;
use hermod_eventbus::SharedEventBus;
use hermod_model::{Node, NodeType, Sink, Source, Tier, Workflow, WorkflowStatus};
use hermod_telemetry::MetricsRegistry;

/// How long [`Registry::stop_engine`] waits for a graceful shutdown
/// before escalating to a hard stop (spec §4.4 `StopEngine`).
const GRACEFUL_STOP_BUDGET: Duration = Duration::from_secs(30);
/// How long to wait after a hard abort before the engine is considered
/// gone, for adapters that need a moment to unwind (spec §4.4).
const HARD_STOP_GRACE: Duration = Duration::from_secs(2);
/// Idle-parking sweep cadence (spec §4.4 "every minute").
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Retention purge cadence (spec §4.4 "Hourly job").
const RETENTION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Everything that can go wrong starting or stopping a workflow's engine.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A workflow with this id is already running in this process.
    #[error("workflow {0} is already running")]
    AlreadyRunning(WorkflowId),
    /// Assembling the engine failed (spec §7 "Configuration" class).
    #[error(transparent)]
    Build(#[from] BuildError),
    /// A catalog read/write failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// A status change broadcast to subscribers (spec §4.4 "status ...
/// subscriber sets").
#[derive(Debug, Clone)]
pub struct StatusEvent {
    /// The workflow whose engine status changed.
    pub workflow_id: WorkflowId,
    /// The new status.
    pub status: EngineStatus,
}

/// One engine this process currently owns.
struct ActiveEngine {
    engine: Arc<Engine>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<EngineStatus>,
    source_ids: Vec<SourceId>,
    sink_ids: Vec<SinkId>,
    stateful_nodes: Vec<NodeId>,
    tier: Tier,
    idle_timeout: Option<Duration>,
    /// Unix millis of the last message read, for the idle-parking sweep.
    /// An `AtomicI64` rather than a `Mutex<Instant>` so the hot-path
    /// activity callback never blocks on the sweep holding a lock.
    last_activity_millis: AtomicI64,
    /// The configuration signature this engine was started with, for the
    /// reconciler's structural-equality drift check (spec §4.2 step 7).
    /// Empty until [`Registry::record_signature`] is called.
    signature: ConfigSignature,
}

/// Per-process container of running engines (spec §4.4).
pub struct Registry {
    catalog: Arc<dyn Catalog>,
    adapters: Arc<dyn AdapterFactory>,
    metrics: Arc<MetricsRegistry>,
    buffer_config: hermod_buffer::Config,
    status_bus: SharedEventBus<StatusEvent>,
    trace_bus: SharedEventBus<TraceStep>,
    engines: DashMap<WorkflowId, ActiveEngine>,
}

impl Registry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        adapters: Arc<dyn AdapterFactory>,
        metrics: Arc<MetricsRegistry>,
        buffer_config: hermod_buffer::Config,
        status_bus: SharedEventBus<StatusEvent>,
        trace_bus: SharedEventBus<TraceStep>,
    ) -> Self {
        Self {
            catalog,
            adapters,
            metrics,
            buffer_config,
            status_bus,
            trace_bus,
            engines: DashMap::new(),
        }
    }

    /// `true` if this process currently runs an engine for `workflow_id`.
    #[must_use]
    pub fn is_running(&self, workflow_id: WorkflowId) -> bool {
        self.engines.contains_key(&workflow_id)
    }

    /// Every workflow id this process currently runs an engine for, for
    /// the reconciler's per-cycle comparison against desired state.
    #[must_use]
    pub fn running_workflows(&self) -> Vec<WorkflowId> {
        self.engines.iter().map(|e| *e.key()).collect()
    }

    /// Subscribe to workflow status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> hermod_eventbus::EventSubscriber<StatusEvent> {
        self.status_bus.subscribe()
    }

    /// Subscribe to sampled live-message trace steps.
    #[must_use]
    pub fn subscribe_trace(&self) -> hermod_eventbus::EventSubscriber<TraceStep> {
        self.trace_bus.subscribe()
    }

    /// Assemble and start an engine for `workflow` (spec §4.4
    /// `StartWorkflow` (a)-(k)). `sources`/`sinks` must contain every row
    /// referenced by a `source`/`sink` node in the workflow's DAG.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRunning`] if this process already
    /// runs this workflow, or [`RegistryError::Build`] if assembly fails
    /// (spec §7 "Configuration" errors, surfaced synchronously).
    pub async fn start_workflow(
        &self,
        workflow: &Workflow,
        sources: &HashMap<SourceId, Source>,
        sinks: &HashMap<SinkId, Sink>,
    ) -> Result<(), RegistryError> {
        if self.engines.contains_key(&workflow.id) {
            return Err(RegistryError::AlreadyRunning(workflow.id));
        }

        let workflow_id = workflow.id;
        let last_activity = Arc::new(AtomicI64::new(now_millis()));
        let on_activity: ActivityCallback = {
            let last_activity = last_activity.clone();
            Arc::new(move |_wf| last_activity.store(now_millis(), Ordering::Relaxed))
        };

        let status_bus = self.status_bus.clone();
        let catalog_for_status = self.catalog.clone();
        let on_status_change: StatusCallback = Arc::new(move |wf_id, status| {
            status_bus.emit(StatusEvent {
                workflow_id: wf_id,
                status: status.clone(),
            });
            let catalog = catalog_for_status.clone();
            tokio::spawn(async move {
                if let Err(err) = catalog
                    .update_workflow_status(wf_id, to_persisted_status(&status))
                    .await
                {
                    tracing::warn!(workflow_id = %wf_id, %err, "failed to persist engine status change");
                }
            });
        });

        let trace_bus = self.trace_bus.clone();
        let on_trace: TraceCallback = Arc::new(move |step| trace_bus.emit(step));

        let built = build_engine(
            workflow,
            sources,
            sinks,
            self.catalog.clone(),
            self.adapters.as_ref(),
            self.metrics.clone(),
            &self.buffer_config,
            on_status_change,
            on_trace,
            on_activity,
        )
        .await?;

        built.engine.restore().await.map_err(|err| {
            RegistryError::Catalog(CatalogError::Io(err.to_string()))
        })?;

        let cancel = CancellationToken::new();
        let run_engine = built.engine.clone();
        let run_cancel = cancel.clone();
        let metrics = self.metrics.clone();
        let status_bus = self.status_bus.clone();
        let catalog = self.catalog.clone();

        let handle = tokio::spawn(async move {
            // Crash barrier (spec §9 "Recover-from-panic"): a panic
            // inside the engine's own run loop must not take the whole
            // reconciler/registry process down with it.
            match std::panic::AssertUnwindSafe(run_engine.run(run_cancel))
                .catch_unwind()
                .await
            {
                Ok(status) => status,
                Err(panic) => {
                    let message = panic_message(&panic);
                    metrics.counter("engine_panic_total").inc();
                    tracing::error!(workflow_id = %workflow_id, %message, "engine task panicked");
                    let status = EngineStatus::Error {
                        message: format!("panic: {message}"),
                    };
                    status_bus.emit(StatusEvent {
                        workflow_id,
                        status: status.clone(),
                    });
                    // Keep `active` as the caller left it: a panic is not
                    // a deliberate deactivation, and the reconciler should
                    // retry starting this workflow on the next cycle.
                    let _ = catalog
                        .update_workflow_status(workflow_id, to_persisted_status(&status))
                        .await;
                    status
                }
            }
        });

        self.engines.insert(
            workflow_id,
            ActiveEngine {
                engine: built.engine,
                cancel,
                handle,
                source_ids: built.source_ids,
                sink_ids: built.sink_ids,
                stateful_nodes: built.stateful_nodes,
                tier: workflow.policy.tier,
                idle_timeout: workflow.policy.idle_timeout_ms.map(Duration::from_millis),
                last_activity_millis: AtomicI64::new(last_activity.load(Ordering::Relaxed)),
                signature: serde_json::Value::Null,
            },
        );

        Ok(())
    }

    /// Stop `workflow_id`'s engine if running: cancel its context, wait
    /// up to 30s for a graceful exit, else abort the task and wait 2s
    /// more, then close its adapters and remove it (spec §4.4
    /// `StopEngine`). A no-op if not running.
    pub async fn stop_engine(&self, workflow_id: WorkflowId) {
        let Some((_, active)) = self.engines.remove(&workflow_id) else {
            return;
        };

        active.cancel.cancel();
        let abort_handle = active.handle.abort_handle();
        if tokio::time::timeout(GRACEFUL_STOP_BUDGET, active.handle)
            .await
            .is_err()
        {
            tracing::warn!(
                %workflow_id,
                budget_secs = GRACEFUL_STOP_BUDGET.as_secs(),
                "engine did not stop gracefully in time, hard-stopping"
            );
            abort_handle.abort();
            tokio::time::sleep(HARD_STOP_GRACE).await;
        }

        active.engine.close_adapters().await;
    }

    /// Current engine status for `workflow_id`, if this process runs it.
    #[must_use]
    pub fn status(&self, workflow_id: WorkflowId) -> Option<EngineStatus> {
        self.engines.get(&workflow_id).map(|e| e.engine.status())
    }

    /// The stateful node ids `workflow_id`'s engine tracks, if running
    /// locally — for external inspection of what this engine checkpoints.
    #[must_use]
    pub fn stateful_nodes(&self, workflow_id: WorkflowId) -> Option<Vec<NodeId>> {
        self.engines.get(&workflow_id).map(|e| e.stateful_nodes.clone())
    }

    /// `true` if the live engine's configuration signature no longer
    /// matches `expected` (spec §4.2 step 7's structural-equality drift
    /// check), requiring a stop-then-start. Returns `false` if not
    /// running locally — the reconciler only calls this for workflows it
    /// already owns and runs.
    #[must_use]
    pub fn signature_drifted(&self, workflow_id: WorkflowId, expected: &ConfigSignature) -> bool {
        self.engines
            .get(&workflow_id)
            .is_some_and(|e| &e.signature != expected)
    }

    /// Record the configuration signature an engine was started with, so
    /// a later cycle can detect drift. Called by the reconciler right
    /// after a successful [`Registry::start_workflow`].
    pub fn record_signature(&self, workflow_id: WorkflowId, signature: ConfigSignature) {
        if let Some(mut e) = self.engines.get_mut(&workflow_id) {
            e.signature = signature;
        }
    }

    /// Optionally called after [`Registry::stop_engine`] for a workflow
    /// being deactivated (not merely restarted): clears `active`/status
    /// on the workflow row, and on any source/sink it referenced that no
    /// other workflow still uses (spec §4.4 `StopEngine`, "Optionally
    /// update catalog... clear dependent source/sink status if no other
    /// workflow references them").
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if any catalog write fails.
    pub async fn clear_dependents(
        &self,
        workflow: &Workflow,
        source_ids: &[SourceId],
        sink_ids: &[SinkId],
    ) -> Result<(), CatalogError> {
        for &source_id in source_ids {
            if !self.source_in_use(source_id, workflow.id).await {
                if let Ok(mut source) = self.catalog.get_source(source_id).await {
                    source.worker_id = None;
                    self.catalog.update_source(source).await?;
                }
            }
        }
        for &sink_id in sink_ids {
            if !self.sink_in_use(sink_id, workflow.id).await {
                if let Ok(mut sink) = self.catalog.get_sink(sink_id).await {
                    sink.worker_id = None;
                    self.catalog.update_sink(sink).await?;
                }
            }
        }
        Ok(())
    }

    /// Resolved fail-safe per spec §9's open question: a catalog error
    /// answers "in use" as `true`, since a spuriously-retained
    /// source/sink costs nothing but a stale row while a spuriously
    /// cleared one racing a live workflow is the worse failure.
    async fn source_in_use(&self, source_id: SourceId, excluding: WorkflowId) -> bool {
        match self.catalog.list_workflows().await {
            Ok(workflows) => workflows
                .iter()
                .any(|w| w.id != excluding && references_ref(&w.dag.nodes, NodeType::Source, source_id.to_string().as_str())),
            Err(_) => true,
        }
    }

    /// See [`Registry::source_in_use`].
    async fn sink_in_use(&self, sink_id: SinkId, excluding: WorkflowId) -> bool {
        match self.catalog.list_workflows().await {
            Ok(workflows) => workflows
                .iter()
                .any(|w| w.id != excluding && references_ref(&w.dag.nodes, NodeType::Sink, sink_id.to_string().as_str())),
            Err(_) => true,
        }
    }

    /// Background sweep: stop (and mark `"Parked"`) any engine whose
    /// workflow has an `idle_timeout`, isn't tier `Hot`, and has had no
    /// activity for longer than that timeout (spec §4.4 "Idle parking").
    /// Runs until `cancel` fires.
    pub async fn run_idle_parking(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(IDLE_SWEEP_INTERVAL) => {}
            }
            self.idle_parking_sweep().await;
        }
    }

    async fn idle_parking_sweep(&self) {
        let candidates: Vec<WorkflowId> = self
            .engines
            .iter()
            .filter(|e| {
                let Some(idle_timeout) = e.idle_timeout else {
                    return false;
                };
                if e.tier == Tier::Hot {
                    return false;
                }
                let elapsed_ms = now_millis().saturating_sub(e.last_activity_millis.load(Ordering::Relaxed));
                elapsed_ms as u128 > idle_timeout.as_millis()
            })
            .map(|e| *e.key())
            .collect();

        for workflow_id in candidates {
            tracing::info!(%workflow_id, "idle-parking workflow: no activity within the configured timeout");
            self.stop_engine(workflow_id).await;
            if let Err(err) = self
                .catalog
                .update_workflow_status(workflow_id, WorkflowStatus::Parked)
                .await
            {
                tracing::warn!(%workflow_id, %err, "failed to persist parked status");
            }
        }
    }

    /// Wake a parked workflow: flips its catalog status away from
    /// `"Parked"` so the reconciler's next cycle is free to start it
    /// again. The wake-up trigger itself (an API call, a scheduler) is
    /// deliberately out of this core's scope (spec §9 open question).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the status write fails.
    pub async fn wake(&self, workflow_id: WorkflowId) -> Result<(), CatalogError> {
        self.catalog
            .update_workflow_status(workflow_id, WorkflowStatus::Stopped)
            .await
    }

    /// Background hourly job: purge trace/audit log entries older than
    /// each workflow's configured retention (spec §4.4 "Retention
    /// purge"). Runs until `cancel` fires.
    pub async fn run_retention_purge(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(RETENTION_PURGE_INTERVAL) => {}
            }
            self.retention_purge_once().await;
        }
    }

    async fn retention_purge_once(&self) {
        let workflows = match self.catalog.list_workflows().await {
            Ok(workflows) => workflows,
            Err(err) => {
                tracing::warn!(%err, "retention purge: failed to list workflows");
                return;
            }
        };

        let now = chrono::Utc::now();
        for workflow in workflows {
            let trace_cutoff = now - chrono::Duration::from_std(workflow.policy.retention.traces).unwrap_or_default();
            let audit_cutoff = now - chrono::Duration::from_std(workflow.policy.retention.audit).unwrap_or_default();
            if let Err(err) = self.catalog.purge_logs("trace", trace_cutoff).await {
                tracing::warn!(workflow_id = %workflow.id, %err, "retention purge: trace purge failed");
            }
            if let Err(err) = self.catalog.purge_logs("audit", audit_cutoff).await {
                tracing::warn!(workflow_id = %workflow.id, %err, "retention purge: audit purge failed");
            }
        }
    }

    /// Release every owned engine on process shutdown (spec §5
    /// "Cancellation & shutdown"). Each engine is stopped with the same
    /// graceful-then-hard-stop escalation as [`Registry::stop_engine`];
    /// callers additionally release the corresponding leases.
    pub async fn stop_all(&self) {
        let ids: Vec<WorkflowId> = self.engines.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.stop_engine(id).await;
        }
    }
}

fn references_ref(nodes: &[Node], node_type: NodeType, ref_id: &str) -> bool {
    nodes
        .iter()
        .any(|n| n.node_type == node_type && n.ref_id.as_deref() == Some(ref_id))
}

fn to_persisted_status(status: &EngineStatus) -> WorkflowStatus {
    match status {
        EngineStatus::Initialized | EngineStatus::Connecting => WorkflowStatus::Starting,
        EngineStatus::Running | EngineStatus::Reconnecting { .. } | EngineStatus::CircuitBreakerOpen { .. } => {
            WorkflowStatus::Running
        }
        EngineStatus::Stopped => WorkflowStatus::Stopped,
        EngineStatus::Error { message } => WorkflowStatus::Error {
            reason: message.clone(),
        },
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
