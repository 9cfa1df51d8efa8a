//! Buffer errors (spec §4.7).

use thiserror::Error;

/// Errors surfaced by a [`Producer`](crate::Producer).
#[derive(Debug, Error)]
pub enum BufferError {
    /// The buffer is at capacity and the caller asked for a non-blocking
    /// enqueue (spec §4.7 "backpressure on full").
    #[error("buffer is full")]
    Full,
    /// The buffer has been closed; no further messages will be accepted.
    #[error("buffer closed")]
    Closed,
    /// A file-backed page failed to read or write.
    #[error("file buffer I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A spilled page failed to (de)serialize.
    #[error("file buffer codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
