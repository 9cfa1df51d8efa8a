#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Reconciler
//!
//! The worker reconciliation loop (spec §4.2): every `sync_interval`,
//! compare "workflows this worker owns" against "engines running in this
//! process" and start/stop/restart [`hermod_registry::Registry`] engines
//! to match. Assignment is decided by an explicit operator pin or, absent
//! one, resource-aware rendezvous hashing over the online worker set
//! (spec §4.3). A sibling heartbeat loop samples local CPU/memory and
//! writes it to the catalog so other workers' rendezvous scoring sees it.

mod assign;

pub use assign::{assign_workflow, score, weight};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use hermod_catalog::Catalog;
use hermod_core::{SinkId, SourceId, WorkerId, WorkflowId};
use hermod_error::{CatalogError, Classify, ReconcileError};
use hermod_lease::{LeaseManager, Renewer, RenewerOutcome};
use hermod_model::{Node, NodeType, Sink, Source, Worker, Workflow, WorkflowStatus};
use hermod_registry::Registry;
use hermod_system::Sampler;
use hermod_telemetry::MetricsRegistry;

/// Sync cycle cadence (spec §4.2 "default 10 s").
pub const DEFAULT_SYNC_INTERVAL: StdDuration = StdDuration::from_secs(10);
/// The floor below which a configured `sync_interval` is clamped (spec
/// §4.2 "floor 200 ms").
pub const MIN_SYNC_INTERVAL: StdDuration = StdDuration::from_millis(200);
/// Heartbeat cadence (spec §4.2 "Every 30 s").
const HEARTBEAT_INTERVAL: StdDuration = StdDuration::from_secs(30);
/// A worker is online if its heartbeat landed within this window (spec
/// §4.2 "online when now - last_seen < 1 min").
const WORKER_ONLINE_WINDOW: chrono::Duration = chrono::Duration::seconds(60);
/// Candidate worker set cache TTL (spec §4.3 "cached for 10 s").
const CANDIDATE_CACHE_TTL: StdDuration = StdDuration::from_secs(10);
/// Bounded concurrency for per-workflow sync (spec §4.2 "cap 10 concurrent").
const SYNC_CONCURRENCY: usize = 10;
/// Lease TTL granted on acquire/renew. Not spec-mandated as a constant;
/// chosen so the renewer's `ttl/2` floor-5s cadence (spec §4.1) lands at
/// a sensible default rather than thrashing the catalog every 5s.
const LEASE_TTL: chrono::Duration = chrono::Duration::seconds(30);

/// Configuration for one reconciler instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// This process's stable worker identity.
    pub worker_id: WorkerId,
    /// How often to run a full sync cycle.
    pub sync_interval: StdDuration,
}

impl Config {
    /// Clamp `sync_interval` to the spec's floor.
    #[must_use]
    pub fn new(worker_id: WorkerId, sync_interval: StdDuration) -> Self {
        Self {
            worker_id,
            sync_interval: sync_interval.max(MIN_SYNC_INTERVAL),
        }
    }
}

struct CandidateCache {
    sampled_at: Instant,
    workers: Vec<Worker>,
}

/// Drives the per-process worker reconciliation loop over a
/// [`Registry`] (spec §4.2).
pub struct Reconciler {
    config: Config,
    catalog: Arc<dyn Catalog>,
    registry: Arc<Registry>,
    lease_manager: Arc<LeaseManager>,
    sampler: Sampler,
    metrics: Arc<MetricsRegistry>,
    renewers: Mutex<HashMap<WorkflowId, Renewer>>,
    candidates: Mutex<Option<CandidateCache>>,
}

impl Reconciler {
    /// Construct a reconciler over `registry`, sharing `catalog` with it.
    #[must_use]
    pub fn new(
        config: Config,
        catalog: Arc<dyn Catalog>,
        registry: Arc<Registry>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let lease_manager = Arc::new(LeaseManager::new(catalog.clone(), metrics.clone()));
        Self {
            config,
            catalog,
            registry,
            lease_manager,
            sampler: Sampler::new(),
            metrics,
            renewers: Mutex::new(HashMap::new()),
            candidates: Mutex::new(None),
        }
    }

    /// This process's worker id, as a lease owner token.
    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.config.worker_id
    }

    /// Run the sync loop until `cancel` fires: an immediate sync on
    /// startup (spec §4.2 "fires an immediate sync on startup"), then one
    /// every `sync_interval`. Releases every held lease before returning
    /// (spec §4.2 "ensures all held leases are released on shutdown").
    pub async fn run(&self, cancel: CancellationToken) {
        self.sync_once().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.sync_interval) => {}
            }
            self.sync_once().await;
        }
        self.release_all_leases().await;
    }

    /// Run the heartbeat loop until `cancel` fires (spec §4.2 "Every 30s
    /// the worker samples CPU and memory utilisation...").
    pub async fn run_heartbeat(&self, cancel: CancellationToken) {
        self.heartbeat_once().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(HEARTBEAT_INTERVAL) => {}
            }
            self.heartbeat_once().await;
        }
    }

    async fn heartbeat_once(&self) {
        let sample = self.sampler.sample();
        if let Err(err) = self
            .catalog
            .update_worker_heartbeat(
                self.config.worker_id,
                sample.cpu_usage,
                sample.mem_usage,
                chrono::Utc::now(),
            )
            .await
        {
            tracing::warn!(worker_id = %self.config.worker_id, %err, "failed to write heartbeat");
        }
    }

    /// One sync cycle: snapshot the catalog, decide assignment per
    /// workflow, and bring this process's running engines in line (spec
    /// §4.2 "Per cycle").
    pub async fn sync_once(&self) {
        self.reap_lost_leases().await;

        let (workflows, sources, sinks) = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let err = ReconcileError::from(err);
                if err.is_transient() {
                    tracing::warn!(%err, "reconciler: failed to snapshot catalog, retrying next cycle");
                } else {
                    tracing::error!(%err, "reconciler: non-transient catalog failure snapshotting this cycle");
                }
                return;
            }
        };

        let candidates = self.candidate_workers().await;

        // Bounded concurrency pool (spec §4.2 "cap 10 concurrent"); each
        // workflow's sync runs under its own panic barrier so one
        // workflow panicking cannot abort the cycle.
        futures::stream::iter(workflows)
            .for_each_concurrent(SYNC_CONCURRENCY, |workflow| {
                let sources = sources.clone();
                let sinks = sinks.clone();
                let candidates = candidates.clone();
                async move {
                    let workflow_id = workflow.id;
                    let outcome = std::panic::AssertUnwindSafe(self.sync_workflow(
                        &workflow,
                        &sources,
                        &sinks,
                        &candidates,
                    ))
                    .catch_unwind()
                    .await;

                    if let Err(panic) = outcome {
                        let message = panic_message(&panic);
                        self.metrics.counter("reconcile_sync_panic_total").inc();
                        tracing::error!(%workflow_id, %message, "syncWorkflow panicked");
                    }
                }
            })
            .await;
    }

    /// Reap renewers that exited on their own since the last cycle (spec
    /// §4.1 "Failure model": a renewer that loses the lease must stop
    /// the engine immediately). Checked at the top of every sync cycle
    /// rather than via a dedicated watcher task, so the reaction lands
    /// within one `sync_interval` without needing `self` spawned as
    /// `'static`.
    async fn reap_lost_leases(&self) {
        let finished: Vec<WorkflowId> = self
            .renewers
            .lock()
            .iter()
            .filter(|(_, r)| r.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for workflow_id in finished {
            let Some(renewer) = self.renewers.lock().remove(&workflow_id) else {
                continue;
            };
            if let RenewerOutcome::LeaseLost(err) = renewer.join().await {
                tracing::warn!(%workflow_id, %err, "lease lost, stopping engine locally");
                self.registry.stop_engine(workflow_id).await;
            }
        }
    }

    async fn snapshot(
        &self,
    ) -> Result<
        (
            Vec<Workflow>,
            Arc<HashMap<SourceId, Source>>,
            Arc<HashMap<SinkId, Sink>>,
        ),
        CatalogError,
    > {
        let workflows = self.catalog.list_workflows().await?;
        let sources = self
            .catalog
            .list_sources()
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let sinks = self
            .catalog
            .list_sinks()
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        Ok((workflows, Arc::new(sources), Arc::new(sinks)))
    }

    async fn candidate_workers(&self) -> Arc<Vec<Worker>> {
        {
            let cache = self.candidates.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.sampled_at.elapsed() < CANDIDATE_CACHE_TTL {
                    return Arc::new(entry.workers.clone());
                }
            }
        }

        let workers = match self.catalog.list_workers().await {
            Ok(workers) => {
                let now = chrono::Utc::now();
                workers
                    .into_iter()
                    .filter(|w| !w.is_stale(now, WORKER_ONLINE_WINDOW))
                    .collect::<Vec<_>>()
            }
            Err(err) => {
                tracing::warn!(%err, "reconciler: failed to list workers, using stale candidate set");
                self.candidates
                    .lock()
                    .as_ref()
                    .map(|c| c.workers.clone())
                    .unwrap_or_default()
            }
        };

        let mut cache = self.candidates.lock();
        *cache = Some(CandidateCache {
            sampled_at: Instant::now(),
            workers: workers.clone(),
        });
        Arc::new(workers)
    }

    async fn sync_workflow(
        &self,
        workflow: &Workflow,
        sources: &HashMap<SourceId, Source>,
        sinks: &HashMap<SinkId, Sink>,
        candidates: &[Worker],
    ) {
        let current_owner = workflow.ownership.as_ref().map(|o| o.worker_id);
        let assigned_to = assign_workflow(workflow, candidates, current_owner);
        let assigned_to_me = assigned_to == Some(self.config.worker_id);
        let running_locally = self.registry.is_running(workflow.id);

        if !assigned_to_me {
            if running_locally {
                tracing::info!(workflow_id = %workflow.id, "no longer assigned, stopping locally");
                self.stop_and_release(workflow.id).await;
            }
            return;
        }

        let is_owner = self.is_lease_holder(workflow.id).await;
        let is_owner = if is_owner {
            true
        } else {
            match self
                .lease_manager
                .acquire(workflow.id, &self.owner_token(), LEASE_TTL)
                .await
            {
                Ok(true) => {
                    self.spawn_renewer(workflow.id);
                    true
                }
                Ok(false) => false,
                Err(err) => {
                    tracing::warn!(workflow_id = %workflow.id, %err, "lease acquire failed this cycle");
                    false
                }
            }
        };

        if !is_owner {
            return;
        }

        if !workflow.active {
            if running_locally {
                self.stop_and_release(workflow.id).await;
            }
            return;
        }

        if !running_locally {
            if workflow.status == WorkflowStatus::Parked {
                // Parked workflows resume only on an external wake
                // (spec §4.4 "not auto-restarted by the reconciler").
                return;
            }
            self.start_locally(workflow, sources, sinks).await;
            return;
        }

        let (wf_sources, wf_sinks) = referenced(workflow, sources, sinks);
        let signature = hermod_registry::compute_signature(workflow, &wf_sources, &wf_sinks);
        if self.registry.signature_drifted(workflow.id, &signature) {
            tracing::info!(workflow_id = %workflow.id, "configuration drift detected, restarting");
            if let Err(err) = self
                .catalog
                .update_workflow_status(workflow.id, WorkflowStatus::Restarting)
                .await
            {
                tracing::warn!(workflow_id = %workflow.id, %err, "failed to persist restarting status");
            }
            self.registry.stop_engine(workflow.id).await;
            self.start_locally(workflow, sources, sinks).await;
        }
    }

    async fn start_locally(
        &self,
        workflow: &Workflow,
        sources: &HashMap<SourceId, Source>,
        sinks: &HashMap<SinkId, Sink>,
    ) {
        let (wf_sources, wf_sinks) = referenced(workflow, sources, sinks);
        match self
            .registry
            .start_workflow(workflow, &wf_sources, &wf_sinks)
            .await
        {
            Ok(()) => {
                let signature = hermod_registry::compute_signature(workflow, &wf_sources, &wf_sinks);
                self.registry.record_signature(workflow.id, signature);
            }
            Err(err) => {
                tracing::error!(workflow_id = %workflow.id, %err, "failed to start workflow locally");
                let _ = self
                    .catalog
                    .update_workflow_status(
                        workflow.id,
                        WorkflowStatus::Error {
                            reason: err.to_string(),
                        },
                    )
                    .await;
            }
        }
    }

    async fn stop_and_release(&self, workflow_id: WorkflowId) {
        self.registry.stop_engine(workflow_id).await;
        self.stop_renewer(workflow_id);
        if let Err(err) = self
            .lease_manager
            .release(workflow_id, &self.owner_token())
            .await
        {
            tracing::warn!(%workflow_id, %err, "failed to release lease");
        }
    }

    async fn is_lease_holder(&self, workflow_id: WorkflowId) -> bool {
        match self.catalog.get_lease(workflow_id).await {
            Ok(Some(lease)) => {
                !lease.is_expired(chrono::Utc::now()) && lease.owner_id == self.owner_token()
            }
            _ => false,
        }
    }

    fn owner_token(&self) -> String {
        self.config.worker_id.to_string()
    }

    fn spawn_renewer(&self, workflow_id: WorkflowId) {
        let mut renewers = self.renewers.lock();
        if renewers.contains_key(&workflow_id) {
            return;
        }
        let renewer = Renewer::spawn(
            self.lease_manager.clone(),
            workflow_id,
            self.owner_token(),
            LEASE_TTL,
        );
        renewers.insert(workflow_id, renewer);
    }

    fn stop_renewer(&self, workflow_id: WorkflowId) {
        if let Some(renewer) = self.renewers.lock().remove(&workflow_id) {
            renewer.stop();
        }
    }

    /// Release every lease this process holds (spec §4.2 "shutdown"):
    /// stops each renewer, releases its lease, and stops the engine.
    pub async fn release_all_leases(&self) {
        let ids: Vec<WorkflowId> = self.renewers.lock().keys().copied().collect();
        for workflow_id in ids {
            self.stop_and_release(workflow_id).await;
        }
    }
}

/// Split a workflow's source/sink node references out of the full
/// catalog snapshot into the subset `build_engine` needs.
fn referenced(
    workflow: &Workflow,
    sources: &HashMap<SourceId, Source>,
    sinks: &HashMap<SinkId, Sink>,
) -> (HashMap<SourceId, Source>, HashMap<SinkId, Sink>) {
    let mut wf_sources = HashMap::new();
    let mut wf_sinks = HashMap::new();
    for node in &workflow.dag.nodes {
        match node.node_type {
            NodeType::Source => {
                if let Some(id) = node_ref::<SourceId>(node) {
                    if let Some(source) = sources.get(&id) {
                        wf_sources.insert(id, source.clone());
                    }
                }
            }
            NodeType::Sink => {
                if let Some(id) = node_ref::<SinkId>(node) {
                    if let Some(sink) = sinks.get(&id) {
                        wf_sinks.insert(id, sink.clone());
                    }
                }
            }
            _ => {}
        }
    }
    (wf_sources, wf_sinks)
}

fn node_ref<I: std::str::FromStr>(node: &Node) -> Option<I> {
    node.ref_id.as_deref().and_then(|s| s.parse().ok())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_buffer::Config as BufferConfig;
    use hermod_catalog::InMemoryCatalog;
    use hermod_core::{EdgeId, NodeId, WorkflowId};
    use hermod_eventbus::EventBus;
    use hermod_model::{Dag, Edge};
    use hermod_registry::MockAdapterFactory;

    fn reconciler() -> (Reconciler, Arc<dyn Catalog>) {
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let registry = Arc::new(Registry::new(
            catalog.clone(),
            Arc::new(MockAdapterFactory),
            metrics.clone(),
            BufferConfig::default(),
            Arc::new(EventBus::new(64)),
            Arc::new(EventBus::new(64)),
        ));
        let config = Config::new(WorkerId::v4(), StdDuration::from_millis(200));
        (
            Reconciler::new(config, catalog.clone(), registry, metrics),
            catalog,
        )
    }

    fn linear_workflow(active: bool) -> (Workflow, Source, Sink) {
        let source = Source::new(SourceId::v4(), "mock");
        let sink = Sink::new(SinkId::v4(), "mock");
        let source_node = Node::new(NodeId::v4(), NodeType::Source).with_ref(source.id.to_string());
        let sink_node = Node::new(NodeId::v4(), NodeType::Sink).with_ref(sink.id.to_string());

        let mut wf = Workflow::new(WorkflowId::v4(), "wf");
        wf.active = active;
        wf.dag = Dag {
            nodes: vec![source_node.clone(), sink_node.clone()],
            edges: vec![Edge::new(EdgeId::v4(), source_node.id, sink_node.id)],
        };
        (wf, source, sink)
    }

    #[tokio::test]
    async fn sync_starts_an_unassigned_active_workflow_with_no_other_workers_online() {
        let (reconciler, catalog) = reconciler();
        let (wf, source, sink) = linear_workflow(true);
        catalog.update_workflow(wf.clone()).await.unwrap();
        catalog.update_source(source).await.unwrap();
        catalog.update_sink(sink).await.unwrap();

        reconciler.sync_once().await;

        assert!(reconciler.registry.is_running(wf.id));
    }

    #[tokio::test]
    async fn sync_does_not_start_an_inactive_workflow() {
        let (reconciler, catalog) = reconciler();
        let (wf, source, sink) = linear_workflow(false);
        catalog.update_workflow(wf.clone()).await.unwrap();
        catalog.update_source(source).await.unwrap();
        catalog.update_sink(sink).await.unwrap();

        reconciler.sync_once().await;

        assert!(!reconciler.registry.is_running(wf.id));
    }

    #[tokio::test]
    async fn sync_stops_a_parked_workflow_it_already_runs_when_deactivated() {
        let (reconciler, catalog) = reconciler();
        let (mut wf, source, sink) = linear_workflow(true);
        catalog.update_workflow(wf.clone()).await.unwrap();
        catalog.update_source(source).await.unwrap();
        catalog.update_sink(sink).await.unwrap();
        reconciler.sync_once().await;
        assert!(reconciler.registry.is_running(wf.id));

        wf.active = false;
        catalog.update_workflow(wf.clone()).await.unwrap();
        reconciler.sync_once().await;

        assert!(!reconciler.registry.is_running(wf.id));
    }

    #[tokio::test]
    async fn a_parked_workflow_is_not_auto_restarted() {
        let (reconciler, catalog) = reconciler();
        let (wf, source, sink) = linear_workflow(true);
        catalog.update_workflow(wf.clone()).await.unwrap();
        catalog.update_source(source).await.unwrap();
        catalog.update_sink(sink).await.unwrap();
        catalog
            .update_workflow_status(wf.id, WorkflowStatus::Parked)
            .await
            .unwrap();

        reconciler.sync_once().await;

        assert!(!reconciler.registry.is_running(wf.id));
    }

    #[tokio::test]
    async fn release_all_leases_stops_every_owned_engine() {
        let (reconciler, catalog) = reconciler();
        let (wf, source, sink) = linear_workflow(true);
        catalog.update_workflow(wf.clone()).await.unwrap();
        catalog.update_source(source).await.unwrap();
        catalog.update_sink(sink).await.unwrap();
        reconciler.sync_once().await;
        assert!(reconciler.registry.is_running(wf.id));

        reconciler.release_all_leases().await;

        assert!(!reconciler.registry.is_running(wf.id));
    }
}
