//! An in-memory [`Catalog`] reference implementation, backed by
//! `DashMap`s. Not durable across process restarts.

use crate::{Catalog, LogEntry};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use hermod_core::{NodeId, SinkId, SourceId, WorkerId, WorkflowId};
use hermod_error::CatalogError;
use hermod_model::{Lease, Sink, Source, Worker, Workflow, WorkflowStatus};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-memory reference [`Catalog`] implementation. Used by
/// `apps/worker --catalog memory` and by every other crate's test suite;
/// not a production backend (spec §6 note on backing-store agnosticism).
pub struct InMemoryCatalog {
    workflows: DashMap<WorkflowId, Workflow>,
    sources: DashMap<SourceId, Source>,
    sinks: DashMap<SinkId, Sink>,
    node_states: DashMap<(WorkflowId, NodeId), Vec<u8>>,
    leases: DashMap<WorkflowId, Lease>,
    workers: DashMap<WorkerId, Worker>,
    logs: Mutex<Vec<LogEntry>>,
}

impl InMemoryCatalog {
    /// Construct an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            workflows: DashMap::new(),
            sources: DashMap::new(),
            sinks: DashMap::new(),
            node_states: DashMap::new(),
            leases: DashMap::new(),
            workers: DashMap::new(),
            logs: Mutex::new(Vec::new()),
        }
    }

    /// Seed a workflow directly, bypassing `update_workflow`. Convenience
    /// for test setup.
    pub fn seed_workflow(&self, workflow: Workflow) {
        self.workflows.insert(workflow.id, workflow);
    }

    /// Seed a source directly. Convenience for test setup.
    pub fn seed_source(&self, source: Source) {
        self.sources.insert(source.id, source);
    }

    /// Seed a sink directly. Convenience for test setup.
    pub fn seed_sink(&self, sink: Sink) {
        self.sinks.insert(sink.id, sink);
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(kind: &'static str, id: impl ToString) -> CatalogError {
    CatalogError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_workflow(&self, id: WorkflowId) -> Result<Workflow, CatalogError> {
        self.workflows
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("workflow", id))
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, CatalogError> {
        Ok(self.workflows.iter().map(|e| e.value().clone()).collect())
    }

    async fn update_workflow(&self, workflow: Workflow) -> Result<(), CatalogError> {
        self.workflows.insert(workflow.id, workflow);
        Ok(())
    }

    async fn update_workflow_status(
        &self,
        id: WorkflowId,
        status: WorkflowStatus,
    ) -> Result<(), CatalogError> {
        let mut entry = self
            .workflows
            .get_mut(&id)
            .ok_or_else(|| not_found("workflow", id))?;
        entry.status = status;
        Ok(())
    }

    async fn get_source(&self, id: SourceId) -> Result<Source, CatalogError> {
        self.sources
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("source", id))
    }

    async fn list_sources(&self) -> Result<Vec<Source>, CatalogError> {
        Ok(self.sources.iter().map(|e| e.value().clone()).collect())
    }

    async fn update_source(&self, source: Source) -> Result<(), CatalogError> {
        self.sources.insert(source.id, source);
        Ok(())
    }

    async fn update_source_state(
        &self,
        id: SourceId,
        state: BTreeMap<String, String>,
    ) -> Result<(), CatalogError> {
        let mut entry = self
            .sources
            .get_mut(&id)
            .ok_or_else(|| not_found("source", id))?;
        entry.state = Some(state);
        Ok(())
    }

    async fn get_sink(&self, id: SinkId) -> Result<Sink, CatalogError> {
        self.sinks
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("sink", id))
    }

    async fn list_sinks(&self) -> Result<Vec<Sink>, CatalogError> {
        Ok(self.sinks.iter().map(|e| e.value().clone()).collect())
    }

    async fn update_sink(&self, sink: Sink) -> Result<(), CatalogError> {
        self.sinks.insert(sink.id, sink);
        Ok(())
    }

    async fn update_node_state(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        data: Vec<u8>,
    ) -> Result<(), CatalogError> {
        self.node_states.insert((workflow_id, node_id), data);
        Ok(())
    }

    async fn get_node_states(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<BTreeMap<NodeId, Vec<u8>>, CatalogError> {
        Ok(self
            .node_states
            .iter()
            .filter(|entry| entry.key().0 == workflow_id)
            .map(|entry| (entry.key().1, entry.value().clone()))
            .collect())
    }

    async fn acquire_workflow_lease(
        &self,
        id: WorkflowId,
        owner_id: &str,
        ttl: Duration,
    ) -> Result<bool, CatalogError> {
        let now = Utc::now();
        // `entry` holds the shard's write lock for the whole read-then-write
        // decision, so a concurrent `acquire`/`renew` on the same workflow
        // cannot interleave between the expiry check and the write (spec
        // §4.1 "a single conditional catalog update").
        let mut acquired = false;
        self.leases
            .entry(id)
            .and_modify(|entry| {
                if entry.is_expired(now) {
                    *entry = Lease {
                        workflow_id: id,
                        worker_id: WorkerId::nil(),
                        owner_id: owner_id.to_owned(),
                        lease_until: now + ttl,
                    };
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                Lease {
                    workflow_id: id,
                    worker_id: WorkerId::nil(),
                    owner_id: owner_id.to_owned(),
                    lease_until: now + ttl,
                }
            });
        if acquired {
            tracing::debug!(workflow_id = %id, owner_id, "lease acquired");
        }
        Ok(acquired)
    }

    async fn renew_workflow_lease(
        &self,
        id: WorkflowId,
        owner_id: &str,
        ttl: Duration,
    ) -> Result<bool, CatalogError> {
        let now = Utc::now();
        let Some(mut entry) = self.leases.get_mut(&id) else {
            return Ok(false);
        };
        if entry.owner_id != owner_id || entry.is_expired(now) {
            return Ok(false);
        }
        entry.lease_until = now + ttl;
        Ok(true)
    }

    async fn release_workflow_lease(
        &self,
        id: WorkflowId,
        owner_id: &str,
    ) -> Result<(), CatalogError> {
        // `remove_if` checks-and-removes under a single write lock, so a
        // racing `acquire` by a new owner can't be clobbered by a release
        // issued by the previous one (spec §3 "Release is idempotent and
        // no-ops if the caller is not the owner").
        self.leases.remove_if(&id, |_, entry| entry.owner_id == owner_id);
        Ok(())
    }

    async fn get_lease(&self, id: WorkflowId) -> Result<Option<Lease>, CatalogError> {
        Ok(self.leases.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_worker(&self, id: WorkerId) -> Result<Worker, CatalogError> {
        self.workers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found("worker", id))
    }

    async fn create_worker(&self, worker: Worker) -> Result<(), CatalogError> {
        self.workers.insert(worker.id, worker);
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, CatalogError> {
        Ok(self.workers.iter().map(|e| e.value().clone()).collect())
    }

    async fn update_worker_heartbeat(
        &self,
        id: WorkerId,
        cpu: f64,
        mem: f64,
        now: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        let mut entry = self
            .workers
            .get_mut(&id)
            .ok_or_else(|| not_found("worker", id))?;
        entry.cpu_usage = cpu;
        entry.mem_usage = mem;
        entry.last_seen = now;
        Ok(())
    }

    async fn append_log(&self, entry: LogEntry) -> Result<(), CatalogError> {
        self.logs
            .lock()
            .expect("catalog log mutex poisoned")
            .push(entry);
        Ok(())
    }

    async fn purge_logs(
        &self,
        kind: &'static str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, CatalogError> {
        let mut logs = self.logs.lock().expect("catalog log mutex poisoned");
        let before = logs.len();
        logs.retain(|entry| entry.kind != kind || entry.recorded_at >= cutoff);
        Ok((before - logs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_model::{Source, Workflow};

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new()
    }

    #[tokio::test]
    async fn get_workflow_not_found() {
        let cat = catalog();
        let err = cat.get_workflow(WorkflowId::v4()).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { kind: "workflow", .. }));
    }

    #[tokio::test]
    async fn update_then_get_roundtrips() {
        let cat = catalog();
        let wf = Workflow::new(WorkflowId::v4(), "orders");
        cat.update_workflow(wf.clone()).await.unwrap();
        let fetched = cat.get_workflow(wf.id).await.unwrap();
        assert_eq!(fetched.name, "orders");
    }

    #[tokio::test]
    async fn acquire_lease_succeeds_once_then_fails() {
        let cat = catalog();
        let id = WorkflowId::v4();
        assert!(cat
            .acquire_workflow_lease(id, "worker-a", Duration::seconds(30))
            .await
            .unwrap());
        assert!(!cat
            .acquire_workflow_lease(id, "worker-b", Duration::seconds(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn renew_requires_matching_owner() {
        let cat = catalog();
        let id = WorkflowId::v4();
        cat.acquire_workflow_lease(id, "worker-a", Duration::seconds(30))
            .await
            .unwrap();
        assert!(!cat
            .renew_workflow_lease(id, "worker-b", Duration::seconds(30))
            .await
            .unwrap());
        assert!(cat
            .renew_workflow_lease(id, "worker-a", Duration::seconds(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn release_is_a_no_op_for_a_non_owner() {
        let cat = catalog();
        let id = WorkflowId::v4();
        cat.acquire_workflow_lease(id, "worker-a", Duration::seconds(30))
            .await
            .unwrap();
        cat.release_workflow_lease(id, "worker-b").await.unwrap();
        assert!(cat.get_lease(id).await.unwrap().is_some());
        cat.release_workflow_lease(id, "worker-a").await.unwrap();
        assert!(cat.get_lease(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_lease_can_be_stolen() {
        let cat = catalog();
        let id = WorkflowId::v4();
        cat.acquire_workflow_lease(id, "worker-a", Duration::seconds(-1))
            .await
            .unwrap();
        assert!(cat
            .acquire_workflow_lease(id, "worker-b", Duration::seconds(30))
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquires_on_a_fresh_lease_have_exactly_one_winner() {
        let cat = std::sync::Arc::new(catalog());
        let id = WorkflowId::v4();
        let mut tasks = Vec::new();
        for n in 0..16 {
            let cat = cat.clone();
            tasks.push(tokio::spawn(async move {
                cat.acquire_workflow_lease(id, &format!("worker-{n}"), Duration::seconds(30))
                    .await
                    .unwrap()
            }));
        }
        let mut wins = 0;
        for t in tasks {
            if t.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1, "exactly one concurrent acquire on a fresh lease must win");
    }

    #[tokio::test]
    async fn purge_logs_removes_only_matching_kind_before_cutoff() {
        let cat = catalog();
        let wf = WorkflowId::v4();
        let now = Utc::now();
        cat.append_log(LogEntry {
            workflow_id: wf,
            kind: "trace",
            recorded_at: now - Duration::days(10),
            body: "old".into(),
        })
        .await
        .unwrap();
        cat.append_log(LogEntry {
            workflow_id: wf,
            kind: "audit",
            recorded_at: now - Duration::days(10),
            body: "old-audit".into(),
        })
        .await
        .unwrap();
        let purged = cat.purge_logs("trace", now - Duration::days(1)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(cat.logs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn node_states_filter_by_workflow() {
        let cat = catalog();
        let wf_a = WorkflowId::v4();
        let wf_b = WorkflowId::v4();
        let node = NodeId::v4();
        cat.update_node_state(wf_a, node, vec![1]).await.unwrap();
        cat.update_node_state(wf_b, node, vec![2]).await.unwrap();
        let states = cat.get_node_states(wf_a).await.unwrap();
        assert_eq!(states.get(&node), Some(&vec![1]));
    }

    #[tokio::test]
    async fn seeded_source_state_updates() {
        let cat = catalog();
        let source = Source::new(SourceId::v4(), "postgres_cdc");
        let id = source.id;
        cat.seed_source(source);
        let mut state = BTreeMap::new();
        state.insert("lsn".to_string(), "0/1A2B3C".to_string());
        cat.update_source_state(id, state.clone()).await.unwrap();
        let fetched = cat.get_source(id).await.unwrap();
        assert_eq!(fetched.state, Some(state));
    }
}
