//! Workflow policy knobs (spec §3, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Resource tier, governing idle-parking eligibility (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Never idle-parked.
    Hot,
    /// Default tier; idle-parked after `idle_timeout`.
    Warm,
    /// Same as `Warm`; a hint for placement, not parking eligibility.
    Cold,
}

impl Default for Tier {
    fn default() -> Self {
        Self::Warm
    }
}

/// Resource requests used by placement (spec §3 "resource requests").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Requested CPU, in fractional cores.
    pub cpu: f64,
    /// Requested memory, in bytes.
    pub memory_bytes: u64,
    /// Requested sustained throughput, in messages/sec.
    pub throughput: f64,
}

/// Schema validation configuration (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaPolicy {
    /// The schema document (shape depends on `schema_type`).
    pub schema: JsonValue,
    /// Schema dialect, e.g. `"json_schema"`, `"avro"`.
    pub schema_type: String,
}

/// Retention windows for observability data (spec §3, §4.4 "Retention purge").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Retention {
    /// How long trace steps are kept.
    #[serde(with = "duration_secs")]
    pub traces: Duration,
    /// How long audit log entries are kept.
    #[serde(with = "duration_secs")]
    pub audit: Duration,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            traces: Duration::from_secs(7 * 24 * 3600),
            audit: Duration::from_secs(90 * 24 * 3600),
        }
    }
}

/// Backpressure strategy for a sink (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureStrategy {
    /// Propagate back to the buffer producer.
    Block,
    /// Drop the message, record a metric.
    Drop,
    /// Apply a per-sink sampling rate.
    Sample,
    /// Spill to disk, bounded by `spill_max_size`.
    Spill,
}

impl Default for BackpressureStrategy {
    fn default() -> Self {
        Self::Block
    }
}

/// Per-sink policy (spec §4.5, §6 "Configuration knobs").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkPolicy {
    /// Maximum retry attempts before a message is declared poison.
    pub max_retries: usize,
    /// Explicit retry interval list; empty means use exponential backoff.
    #[serde(default)]
    pub retry_intervals_ms: Vec<u64>,
    /// Batch size for writes.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batch timeout, in milliseconds.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Consecutive-error count that opens the circuit breaker.
    pub circuit_breaker_threshold: usize,
    /// Sliding window for the circuit breaker, in milliseconds.
    pub circuit_breaker_interval_ms: u64,
    /// Cool-off before a half-open probe, in milliseconds.
    pub circuit_breaker_cooldown_ms: u64,
    /// Backpressure strategy.
    #[serde(default)]
    pub backpressure_strategy: BackpressureStrategy,
    /// Backpressure buffer size (ring capacity feeding this sink).
    #[serde(default = "default_backpressure_buffer")]
    pub backpressure_buffer: usize,
    /// Sampling rate for the `sample` backpressure strategy, in `[0, 1]`.
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Spill directory for the `spill` backpressure strategy.
    pub spill_path: Option<String>,
    /// Spill size cap, in bytes.
    pub spill_max_size: Option<u64>,
}

fn default_batch_size() -> usize {
    1
}
fn default_batch_timeout_ms() -> u64 {
    1000
}
fn default_backpressure_buffer() -> usize {
    1000
}
fn default_sampling_rate() -> f64 {
    1.0
}

impl Default for SinkPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_intervals_ms: Vec::new(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            circuit_breaker_threshold: 5,
            circuit_breaker_interval_ms: 60_000,
            circuit_breaker_cooldown_ms: 30_000,
            backpressure_strategy: BackpressureStrategy::default(),
            backpressure_buffer: default_backpressure_buffer(),
            sampling_rate: default_sampling_rate(),
            spill_path: None,
            spill_max_size: None,
        }
    }
}

/// Workflow-level policy knobs (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Reconnect interval schedule for the source health gate; the final
    /// entry repeats once exhausted (spec §4.5).
    #[serde(default = "default_reconnect_intervals_ms")]
    pub reconnect_intervals_ms: Vec<u64>,
    /// Idle timeout before parking, if `tier != Hot` (spec §4.4).
    pub idle_timeout_ms: Option<u64>,
    /// Placement/parking tier.
    #[serde(default)]
    pub tier: Tier,
    /// DLQ sink reference (catalog sink id), if configured.
    pub dlq_sink_ref: Option<String>,
    /// If `true`, drain the DLQ sink as a secondary input before normal
    /// processing (spec §4.5).
    #[serde(default)]
    pub prioritize_dlq: bool,
    /// If `true`, evaluate the pipeline but do not write to sinks.
    #[serde(default)]
    pub dry_run: bool,
    /// DLQ count threshold that fires an alert notification.
    #[serde(default = "default_dlq_alert_threshold")]
    pub dlq_alert_threshold: u64,
    /// Optional payload schema validation.
    pub schema: Option<SchemaPolicy>,
    /// Retention windows for traces/audit.
    #[serde(default)]
    pub retention: Retention,
    /// Placement resource request.
    #[serde(default)]
    pub resources: ResourceRequest,
    /// Fraction of node executions sampled into trace steps, in `[0, 1]`.
    #[serde(default = "default_trace_sample_rate")]
    pub trace_sample_rate: f64,
    /// Per-sink policy, keyed by sink node id as a string.
    #[serde(default)]
    pub sink_policies: std::collections::BTreeMap<String, SinkPolicy>,
}

fn default_reconnect_intervals_ms() -> Vec<u64> {
    vec![1000, 2000, 5000, 10_000]
}
fn default_dlq_alert_threshold() -> u64 {
    100
}
fn default_trace_sample_rate() -> f64 {
    0.0
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            reconnect_intervals_ms: default_reconnect_intervals_ms(),
            idle_timeout_ms: None,
            tier: Tier::default(),
            dlq_sink_ref: None,
            prioritize_dlq: false,
            dry_run: false,
            dlq_alert_threshold: default_dlq_alert_threshold(),
            schema: None,
            retention: Retention::default(),
            resources: ResourceRequest::default(),
            trace_sample_rate: default_trace_sample_rate(),
            sink_policies: std::collections::BTreeMap::new(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tier_is_warm() {
        assert_eq!(Tier::default(), Tier::Warm);
    }

    #[test]
    fn default_policy_has_reasonable_reconnect_schedule() {
        let policy = Policy::default();
        assert_eq!(policy.reconnect_intervals_ms.last(), Some(&10_000));
    }

    #[test]
    fn retention_serde_roundtrip() {
        let r = Retention::default();
        let json = serde_json::to_string(&r).unwrap();
        let back: Retention = serde_json::from_str(&json).unwrap();
        assert_eq!(r.traces, back.traces);
    }
}
