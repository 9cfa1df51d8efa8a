use crate::error::AdapterError;
use async_trait::async_trait;
use hermod_message::Message;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A source that persists driver-opaque state (CDC offsets, cursor
/// positions) across restarts (spec §6 "Source adapter capability set").
pub trait Stateful: Send + Sync {
    /// Snapshot the adapter's current state for checkpointing.
    fn get_state(&self) -> BTreeMap<String, String>;
    /// Restore state previously returned by [`Stateful::get_state`].
    fn set_state(&self, state: BTreeMap<String, String>);
}

/// An adapter that can enumerate the databases/tables it has access to.
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// List databases (or schemas) visible to this adapter.
    async fn databases(&self) -> Result<Vec<String>, AdapterError>;
    /// List tables within `database`.
    async fn tables(&self, database: &str) -> Result<Vec<String>, AdapterError>;
}

/// An adapter that can return a bounded preview of a table's rows.
#[async_trait]
pub trait Sampler: Send + Sync {
    /// Return up to `limit` sample messages from `table`.
    async fn sample(&self, table: &str, limit: usize) -> Result<Vec<Message>, AdapterError>;
}

/// A source that can report readiness independent of `ping` (e.g. a
/// consumer group has finished rebalancing).
#[async_trait]
pub trait ReadyChecker: Send + Sync {
    /// Returns `true` once the adapter is ready to be read from.
    async fn is_ready(&self) -> bool;
}

/// A source that supports a one-shot full-table snapshot ahead of
/// incremental reads.
#[async_trait]
pub trait Snapshottable: Send + Sync {
    /// Request a snapshot of `tables`, to be interleaved with or
    /// completed before incremental `read` calls resume.
    async fn snapshot(&self, tables: &[String]) -> Result<(), AdapterError>;
}

/// An adapter that accepts an external log sink instead of, or in
/// addition to, the process-wide `tracing` subscriber.
pub trait Loggable: Send + Sync {
    /// Install `logger` as the adapter's destination for driver-level
    /// diagnostics.
    fn set_logger(&self, logger: Arc<dyn Fn(&str) + Send + Sync>);
}

/// A sink that can return a bounded preview of what it has written.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Return up to `limit` of the most recently written messages.
    async fn browse(&self, limit: usize) -> Result<Vec<Message>, AdapterError>;
}

/// A named byte-stream compressor an adapter can be configured with
/// (spec §6 "Compressible (SetCompressor)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorKind {
    /// No compression.
    None,
    /// gzip.
    Gzip,
    /// zstd.
    Zstd,
}

/// A sink whose wire encoding can be compressed.
pub trait Compressible: Send + Sync {
    /// Select the compressor used for subsequent writes.
    fn set_compressor(&self, compressor: CompressorKind);
}

/// A sink that can deduplicate writes by an idempotency key.
pub trait Idempotent: Send + Sync {
    /// Enable or disable idempotency checks.
    fn enable_idempotency(&self, enabled: bool);
    /// Install the template used to derive an idempotency key from a
    /// message (spec §6 "SetIdempotencyKeyTemplate").
    fn set_idempotency_key_template(&self, template: String);
}
