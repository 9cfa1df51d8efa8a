//! Source and Sink records (spec §3, §6).

use hermod_core::{SinkId, SourceId, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A catalog-registered data source (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Catalog-unique id.
    pub id: SourceId,
    /// Adapter type, e.g. `"postgres_cdc"`, `"kafka"`, `"webhook"`.
    pub source_type: String,
    /// Adapter-specific configuration (connection strings, topics, etc).
    pub config: BTreeMap<String, String>,
    /// Opaque resume position (e.g. WAL LSN, Kafka offsets), persisted by
    /// the engine after each checkpoint (spec §4.5 "Checkpoint &
    /// recovery").
    pub state: Option<BTreeMap<String, String>>,
    /// `false` disables routing from this source without removing it.
    #[serde(default = "default_true")]
    pub active: bool,
    /// The worker currently reading this source, if any workflow using it
    /// is assigned. Cleared by the registry when no remaining workflow
    /// references it (spec §4.4 `StopEngine`).
    #[serde(default)]
    pub worker_id: Option<WorkerId>,
}

fn default_true() -> bool {
    true
}

impl Source {
    /// Construct an active source with empty config and no persisted state.
    #[must_use]
    pub fn new(id: SourceId, source_type: impl Into<String>) -> Self {
        Self {
            id,
            source_type: source_type.into(),
            config: BTreeMap::new(),
            state: None,
            active: true,
            worker_id: None,
        }
    }
}

/// Runtime status of a sink's circuit breaker, surfaced for operators
/// (spec §4.5, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkStatus {
    /// Accepting writes.
    Closed,
    /// Rejecting writes until the cool-off elapses.
    Open,
    /// Probing with a single write.
    HalfOpen,
}

impl Default for SinkStatus {
    fn default() -> Self {
        Self::Closed
    }
}

/// A catalog-registered data sink (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sink {
    /// Catalog-unique id.
    pub id: SinkId,
    /// Adapter type, e.g. `"postgres"`, `"s3"`, `"http"`.
    pub sink_type: String,
    /// Adapter-specific configuration.
    pub config: BTreeMap<String, String>,
    /// `false` disables routing to this sink without removing it.
    pub active: bool,
    /// Current circuit-breaker status.
    #[serde(default)]
    pub status: SinkStatus,
    /// The worker currently writing to this sink, if any workflow using it
    /// is assigned.
    pub worker_id: Option<WorkerId>,
}

impl Sink {
    /// Construct an active sink with empty config.
    #[must_use]
    pub fn new(id: SinkId, sink_type: impl Into<String>) -> Self {
        Self {
            id,
            sink_type: sink_type.into(),
            config: BTreeMap::new(),
            active: true,
            status: SinkStatus::default(),
            worker_id: None,
        }
    }
}
