//! Worker record (spec §3, §4.2, §4.4 "heartbeat").

use chrono::{DateTime, Utc};
use hermod_core::WorkerId;
use serde::{Deserialize, Serialize};

/// A worker process, as tracked by the catalog (spec §3).
///
/// Populated from the periodic heartbeat (spec §4.4); the reconciler reads
/// `cpu_usage`/`mem_usage` to compute rendezvous hash weights (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// Catalog-unique id, stable across process restarts if configured
    /// with a persistent identity.
    pub id: WorkerId,
    /// Timestamp of the most recently accepted heartbeat.
    pub last_seen: DateTime<Utc>,
    /// Most recent CPU utilization sample, in `[0, 1]`.
    pub cpu_usage: f64,
    /// Most recent memory utilization sample, in `[0, 1]`.
    pub mem_usage: f64,
}

impl Worker {
    /// Construct a worker record with a zeroed utilization snapshot.
    #[must_use]
    pub fn new(id: WorkerId, last_seen: DateTime<Utc>) -> Self {
        Self {
            id,
            last_seen,
            cpu_usage: 0.0,
            mem_usage: 0.0,
        }
    }

    /// `true` if no heartbeat has landed within `max_age`, meaning the
    /// reconciler should treat this worker's leases as orphaned.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.last_seen > max_age
    }
}
