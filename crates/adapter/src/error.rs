use thiserror::Error;

/// Errors surfaced by a source or sink adapter's own I/O, distinct from
/// [`hermod_error::EngineError`] which wraps these once the engine
/// decides whether to reconnect (spec §4.1/§7 transient/permanent split
/// lives one layer up, in the engine).
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The underlying connection/driver failed.
    #[error("adapter I/O error: {0}")]
    Io(String),
    /// The adapter has been closed and rejects further calls.
    #[error("adapter is closed")]
    Closed,
    /// An optional capability was invoked on an adapter that declared it
    /// but cannot currently honor it (e.g. snapshot requested mid-close).
    #[error("capability not available: {0}")]
    Unsupported(&'static str),
}
