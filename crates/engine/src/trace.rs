//! Trace steps emitted per node execution when sampled (spec §3 "Trace
//! step", §4.6 "Tracing").

use chrono::{DateTime, Utc};
use hermod_core::{MessageId, NodeId, WorkflowId};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// One sampled node execution: when it ran, how long it took, whether it
/// errored, and a snapshot of the message data at that point (spec §3).
#[derive(Debug, Clone)]
pub struct TraceStep {
    /// The workflow this step belongs to.
    pub workflow_id: WorkflowId,
    /// The message being routed.
    pub message_id: Option<MessageId>,
    /// The node that executed.
    pub node_id: NodeId,
    /// When evaluation started.
    pub timestamp: DateTime<Utc>,
    /// How long evaluation took.
    pub elapsed: Duration,
    /// The evaluation error, if any.
    pub error: Option<String>,
    /// A snapshot of the message payload after this node ran.
    pub data: JsonValue,
}

/// A cheap counter-based sampler, avoiding a `rand` dependency for a
/// single boolean coin flip: accepts roughly `rate` of calls by
/// advancing a saturating counter and comparing against a fixed
/// denominator, which is deterministic (useful for tests) and close
/// enough to uniform for trace/backpressure sampling.
pub struct RateSampler {
    rate: f64,
    counter: std::sync::atomic::AtomicU64,
}

impl RateSampler {
    /// Build a sampler that accepts roughly `rate` (clamped to `[0,
    /// 1]`) of `should_sample` calls.
    #[must_use]
    pub fn new(rate: f64) -> Self {
        Self { rate: rate.clamp(0.0, 1.0), counter: std::sync::atomic::AtomicU64::new(0) }
    }

    /// `true` roughly `rate` of the time, deterministically.
    pub fn should_sample(&self) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        if self.rate >= 1.0 {
            return true;
        }
        const DENOMINATOR: u64 = 1000;
        let threshold = (self.rate * DENOMINATOR as f64) as u64;
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % DENOMINATOR;
        n < threshold
    }
}
