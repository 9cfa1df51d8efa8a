#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Error
//!
//! Per-boundary error taxonomy (spec §7). Every crate that crosses an
//! `async_trait` call defines its own error enum here rather than sharing
//! one giant error type — each carries [`Classify::is_transient`] so
//! callers can apply the transient/permanent split spec §4.1 and §7
//! require without string-matching on error messages.

use thiserror::Error;

/// Whether an error should be retried locally or bubbled up as a
/// persistent failure (spec §7 "Propagation policy").
pub trait Classify {
    /// `true` if the failure is expected to clear on its own (network
    /// blip, catalog unavailable) and the caller should retry at the
    /// next tick/schedule entry rather than surface the failure.
    fn is_transient(&self) -> bool;
}

/// Errors from catalog operations (spec §6).
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The backing store is unreachable or returned a transient failure.
    #[error("catalog I/O error: {0}")]
    Io(String),
    /// The requested row does not exist.
    #[error("not found: {kind} {id}")]
    NotFound {
        /// Row kind, e.g. `"workflow"`.
        kind: &'static str,
        /// String form of the row's id.
        id: String,
    },
    /// A conditional update (lease CAS, status write) lost the race.
    #[error("conflict updating {0}")]
    Conflict(String),
}

impl Classify for CatalogError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Errors from lease acquire/renew/release (spec §4.1).
#[derive(Debug, Error)]
pub enum LeaseError {
    /// The catalog call itself failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Renew failed three times consecutively — treated as permanent.
    #[error("lease renewal failed {0} consecutive times")]
    RenewExhausted(u32),
}

impl Classify for LeaseError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Catalog(e) => e.is_transient(),
            Self::RenewExhausted(_) => false,
        }
    }
}

/// Errors surfaced by node evaluation (spec §4.6).
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// A configured transformer, validator, or condition failed.
    #[error("node {node_id} failed: {message}")]
    Evaluation {
        /// The node that failed, as a string (avoids a dependency on
        /// `hermod-core` from this crate).
        node_id: String,
        /// Human-readable failure description.
        message: String,
    },
    /// The node referenced a field or path that does not exist in the
    /// message payload.
    #[error("path not found: {0}")]
    PathNotFound(String),
}

/// Errors from the engine runtime (spec §4.5, §7).
#[derive(Debug, Error)]
pub enum EngineError {
    /// DAG validation failed before the engine could start (spec §7
    /// "Configuration" class) — surfaced synchronously from
    /// `StartWorkflow`, never retried.
    #[error("invalid workflow configuration: {0}")]
    Configuration(String),
    /// Source or sink I/O failed after the reconnect/retry schedule was
    /// exhausted, or is still within it (caller decides retry vs. surface
    /// using [`Classify::is_transient`]).
    #[error("adapter I/O error ({role}): {message}")]
    AdapterIo {
        /// `"source"` or `"sink:<id>"`.
        role: String,
        /// Human-readable description.
        message: String,
    },
    /// The lease was lost; the engine must stop immediately, no retry.
    #[error("lease lost for workflow")]
    LeaseLost,
    /// The sink's circuit breaker is open; rejects writes as a
    /// non-retryable terminal for the current message until it closes.
    #[error("circuit breaker open for sink {0}")]
    CircuitOpen(String),
    /// A node evaluation error with no `error` edge to catch it.
    #[error(transparent)]
    Node(#[from] NodeError),
}

impl Classify for EngineError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::AdapterIo { .. })
    }
}

/// Errors from the worker reconciliation loop (spec §4.2).
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Listing the catalog failed this cycle; the reconciler logs and
    /// retries at the next tick.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// A `syncWorkflow` task panicked; caught by the crash barrier so one
    /// workflow's panic cannot abort the whole cycle.
    #[error("sync panicked for workflow: {0}")]
    Panic(String),
}

impl Classify for ReconcileError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Catalog(e) => e.is_transient(),
            Self::Panic(_) => true,
        }
    }
}

/// Top-level error type for call sites (the reconciler's outer loop,
/// `apps/worker`'s `main`) that need to collapse every boundary error
/// into one type.
#[derive(Debug, Error)]
pub enum HermodError {
    /// See [`CatalogError`].
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// See [`LeaseError`].
    #[error(transparent)]
    Lease(#[from] LeaseError),
    /// See [`EngineError`].
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// See [`ReconcileError`].
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_io_is_transient() {
        assert!(CatalogError::Io("timeout".into()).is_transient());
    }

    #[test]
    fn catalog_not_found_is_permanent() {
        let err = CatalogError::NotFound {
            kind: "workflow",
            id: "abc".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn lease_renew_exhausted_is_permanent() {
        assert!(!LeaseError::RenewExhausted(3).is_transient());
    }

    #[test]
    fn lease_lost_is_not_retried() {
        assert!(!EngineError::LeaseLost.is_transient());
    }

    #[test]
    fn adapter_io_is_transient() {
        let err = EngineError::AdapterIo {
            role: "source".into(),
            message: "connection reset".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn reconcile_panic_is_treated_as_transient_for_this_cycle() {
        assert!(ReconcileError::Panic("boom".into()).is_transient());
    }
}
