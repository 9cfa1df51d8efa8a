#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Telemetry
//!
//! Metrics registry and notification deduplication used across the
//! engine, lease manager, and reconciler.

pub mod dedup;
pub mod metrics;

pub use dedup::NotificationDedup;
pub use metrics::{Counter, Gauge, MetricsRegistry, workflow_scoped};
