//! Background renewer: one task per owned workflow, re-issuing `Renew`
//! every `ttl/2` (floor 5 s) (spec §4.1 "Background renewer").

use crate::manager::LeaseManager;
use hermod_core::WorkflowId;
use hermod_error::{Classify, LeaseError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;

const MIN_RENEW_INTERVAL: StdDuration = StdDuration::from_secs(5);
const CONSECUTIVE_FAILURES_BEFORE_STOP: u32 = 3;

/// The outcome signalled to the engine when the renewer gives up (spec
/// §4.1 "Failure model").
#[derive(Debug)]
pub enum RenewerOutcome {
    /// Three consecutive renews returned `renewed=false`, or a
    /// non-transient catalog error occurred: the engine must hard-stop
    /// and allow another worker to steal the lease.
    LeaseLost(LeaseError),
    /// The renewer was cancelled by the caller (engine stopped for an
    /// unrelated reason).
    Cancelled,
}

/// A running background renewer. Dropping or calling [`Renewer::stop`]
/// cancels it.
pub struct Renewer {
    handle: JoinHandle<RenewerOutcome>,
    stop_flag: Arc<AtomicBool>,
}

impl Renewer {
    /// Spawn a renewer that re-issues `Renew(workflow, owner_id, ttl)`
    /// every `max(ttl/2, 5s)` until cancelled or the lease is lost.
    pub fn spawn(
        manager: Arc<LeaseManager>,
        workflow: WorkflowId,
        owner_id: String,
        ttl: chrono::Duration,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let interval = renew_interval(ttl);
        let task_stop_flag = stop_flag.clone();

        let handle = tokio::spawn(async move {
            let mut consecutive_failures = 0u32;
            loop {
                tokio::time::sleep(interval).await;
                if task_stop_flag.load(Ordering::Acquire) {
                    return RenewerOutcome::Cancelled;
                }

                match manager.renew(workflow, &owner_id, ttl).await {
                    Ok(true) => consecutive_failures = 0,
                    Ok(false) => {
                        consecutive_failures += 1;
                        if consecutive_failures >= CONSECUTIVE_FAILURES_BEFORE_STOP {
                            return RenewerOutcome::LeaseLost(LeaseError::RenewExhausted(
                                consecutive_failures,
                            ));
                        }
                    }
                    Err(err) => {
                        if is_permanent(&err) {
                            return RenewerOutcome::LeaseLost(err);
                        }
                        tracing::warn!(workflow_id = %workflow, error = %err, "transient lease renew error, retrying next tick");
                    }
                }
            }
        });

        Self { handle, stop_flag }
    }

    /// Cancel the renewer; its task exits at the next tick.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    /// `true` once the renewer's task has exited, either cancelled or
    /// because it lost the lease. Lets a caller holding many renewers
    /// poll for outcomes without consuming one it still wants to keep
    /// running.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the renewer to exit, returning why it stopped.
    ///
    /// # Panics
    ///
    /// Panics if the renewer task itself panicked.
    pub async fn join(self) -> RenewerOutcome {
        self.handle.await.expect("lease renewer task panicked")
    }
}

fn renew_interval(ttl: chrono::Duration) -> StdDuration {
    let half = ttl
        .to_std()
        .map(|d| d / 2)
        .unwrap_or(MIN_RENEW_INTERVAL);
    half.max(MIN_RENEW_INTERVAL)
}

fn is_permanent(err: &LeaseError) -> bool {
    !err.is_transient()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_catalog::{Catalog, InMemoryCatalog};
    use hermod_telemetry::MetricsRegistry;

    #[test]
    fn renew_interval_floors_at_five_seconds() {
        assert_eq!(renew_interval(chrono::Duration::seconds(4)), MIN_RENEW_INTERVAL);
    }

    #[test]
    fn renew_interval_is_half_the_ttl_above_the_floor() {
        assert_eq!(
            renew_interval(chrono::Duration::seconds(60)),
            StdDuration::from_secs(30)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_before_any_tick_reports_cancelled() {
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let manager = Arc::new(LeaseManager::new(catalog, metrics));
        let workflow = WorkflowId::v4();

        let renewer = Renewer::spawn(
            manager,
            workflow,
            "worker-a".to_owned(),
            chrono::Duration::seconds(10),
        );
        renewer.stop();
        tokio::time::advance(StdDuration::from_secs(6)).await;
        assert!(matches!(renewer.join().await, RenewerOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn losing_the_lease_reports_lease_lost() {
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let manager = Arc::new(LeaseManager::new(catalog.clone(), metrics));
        let workflow = WorkflowId::v4();
        let ttl = chrono::Duration::seconds(10);

        manager.acquire(workflow, "worker-a", ttl).await.unwrap();
        // another owner steals the lease once it's gone stale enough that
        // our renewer's `renewed_by_owner` checks start failing.
        catalog
            .release_workflow_lease(workflow, "worker-a")
            .await
            .unwrap();
        catalog
            .acquire_workflow_lease(workflow, "worker-b", ttl)
            .await
            .unwrap();

        let renewer = Renewer::spawn(manager, workflow, "worker-a".to_owned(), ttl);
        for _ in 0..3 {
            tokio::time::advance(renew_interval(ttl)).await;
        }
        match renewer.join().await {
            RenewerOutcome::LeaseLost(LeaseError::RenewExhausted(n)) => assert_eq!(n, 3),
            other => panic!("expected RenewExhausted, got {other:?}"),
        }
    }
}
