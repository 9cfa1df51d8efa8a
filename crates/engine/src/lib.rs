#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Engine
//!
//! The per-workflow engine runtime (spec §4.5): owns one workflow's
//! multi-source fan-in, its DAG router, a [`dispatch::SinkDispatcher`]
//! per sink node, the shared buffer, and checkpoint/schema/circuit
//! breaker machinery, and drives the health gate → read → validate →
//! route → dispatch → ack main loop until cancelled.

pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod idempotency;
pub mod multi_source;
pub mod runtime;
pub mod schema;
pub mod status;
pub mod trace;

pub use checkpoint::CheckpointCoordinator;
pub use config::EngineConfig;
pub use dispatch::{DispatchOutcome, SinkDispatcher};
pub use idempotency::{IdempotencyKey, IdempotencyStore, InMemoryIdempotencyStore};
pub use multi_source::MultiSource;
pub use runtime::{ActivityCallback, Engine, StatusCallback, TraceCallback};
pub use schema::{SchemaValidator, SchemaViolation};
pub use status::{EngineStatus, Role, can_transition, validate_transition};
pub use trace::{RateSampler, TraceStep};
