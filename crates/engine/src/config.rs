//! Per-engine configuration resolved from a workflow's
//! [`Policy`](hermod_model::Policy) (spec §6 "Configuration knobs").

use hermod_model::{BackpressureStrategy, Policy};
use std::time::Duration;

/// Resolved, engine-ready configuration. Built once at
/// [`crate::Engine`] construction from the workflow's [`Policy`]; the
/// engine itself never re-reads the catalog mid-run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Reconnect schedule for the health gate (spec §4.5 "a list with a
    /// final repeating interval").
    pub reconnect_intervals: Vec<Duration>,
    /// How often the checkpoint coordinator is invoked while running.
    pub checkpoint_interval: Duration,
    /// Idle-parking threshold, if this workflow's tier allows parking.
    pub idle_timeout: Option<Duration>,
    /// If `true`, evaluate the pipeline but skip sink writes.
    pub dry_run: bool,
    /// Fraction of node executions sampled into trace steps.
    pub trace_sample_rate: f64,
    /// Strategy applied when the shared buffer is full (spec §4.5
    /// "Backpressure"). Resolved as the strictest (most conservative)
    /// strategy configured across this workflow's sinks, since the
    /// buffer sits upstream of per-sink fan-out and so cannot honor a
    /// different strategy per sink the way the dispatch stage can.
    pub backpressure: BackpressureStrategy,
    /// Sampling rate for the `sample` backpressure strategy.
    pub sampling_rate: f64,
    /// Whether the DLQ sink should also be opened as a secondary input
    /// and drained before normal processing (spec §4.5). Carried through
    /// from policy but not yet acted on by the engine: see `DESIGN.md`
    /// ("`prioritize_dlq` drain-on-start") for why this is a recorded,
    /// scoped-out decision rather than a bug. Not consulted by the
    /// unrouted dead-letter path — that path writes to `dlq_sink_ref`
    /// regardless of this flag.
    pub prioritize_dlq: bool,
    /// Dead-letter count at which a notification fires (spec §3 "DLQ
    /// alert threshold"), deduplicated per workflow for 5 minutes.
    pub dlq_alert_threshold: u64,
}

impl EngineConfig {
    /// Resolve engine configuration from a workflow's policy.
    #[must_use]
    pub fn from_policy(policy: &Policy) -> Self {
        let backpressure = policy
            .sink_policies
            .values()
            .map(|sp| sp.backpressure_strategy)
            .max_by_key(strategy_severity)
            .unwrap_or_default();
        let sampling_rate = policy
            .sink_policies
            .values()
            .map(|sp| sp.sampling_rate)
            .fold(1.0_f64, f64::min);

        Self {
            reconnect_intervals: policy
                .reconnect_intervals_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            checkpoint_interval: Duration::from_secs(60),
            idle_timeout: policy.idle_timeout_ms.map(Duration::from_millis),
            dry_run: policy.dry_run,
            trace_sample_rate: policy.trace_sample_rate,
            backpressure,
            sampling_rate,
            prioritize_dlq: policy.prioritize_dlq,
            dlq_alert_threshold: policy.dlq_alert_threshold,
        }
    }
}

/// Ordinal severity used to pick the "most conservative" backpressure
/// strategy when a workflow configures different ones per sink: `spill`
/// loses the least data, `block` the next, then `sample`, then `drop`.
fn strategy_severity(strategy: &BackpressureStrategy) -> u8 {
    match strategy {
        BackpressureStrategy::Spill => 3,
        BackpressureStrategy::Block => 2,
        BackpressureStrategy::Sample => 1,
        BackpressureStrategy::Drop => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_resolves_block_backpressure() {
        let config = EngineConfig::from_policy(&Policy::default());
        assert_eq!(config.backpressure, BackpressureStrategy::Block);
    }

    #[test]
    fn reconnect_intervals_translate_from_millis() {
        let mut policy = Policy::default();
        policy.reconnect_intervals_ms = vec![1, 2, 3];
        let config = EngineConfig::from_policy(&policy);
        assert_eq!(config.reconnect_intervals, vec![
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(3),
        ]);
    }
}
