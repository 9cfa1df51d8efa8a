//! Engine runtime status (spec §4.5's state machine:
//! `initialized → connecting → running ↔ reconnecting:<role> → stopped |
//! error:<msg> | circuit_breaker_open:<sink>`).

use hermod_error::EngineError;
use serde::{Deserialize, Serialize};

/// Which side of the engine a `reconnecting` status refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The source adapter is reconnecting.
    Source,
    /// A sink adapter is reconnecting.
    Sink,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Sink => write!(f, "sink"),
        }
    }
}

/// Runtime status of one engine instance (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineStatus {
    /// Constructed, health gate not yet run.
    Initialized,
    /// Health gate in progress: pinging source and every sink.
    Connecting,
    /// Health gate passed; the read/route/dispatch/ack loop is active.
    Running,
    /// A ping or I/O call failed; working through the reconnect schedule
    /// for the named role before either resuming `running` or giving up.
    Reconnecting {
        /// Which side is reconnecting.
        role: Role,
    },
    /// Stopped, either gracefully or after a hard-stop deadline.
    Stopped,
    /// Terminated after exhausting the reconnect schedule, or any other
    /// non-retryable failure.
    Error {
        /// Human-readable failure reason.
        message: String,
    },
    /// A sink's circuit breaker opened; the engine keeps running for
    /// every other sink but this one rejects writes until it closes.
    CircuitBreakerOpen {
        /// The sink whose breaker is open.
        sink_id: String,
    },
}

impl EngineStatus {
    /// `true` once the engine has stopped for good and will not resume
    /// on its own (only `Stopped` and `Error`; `CircuitBreakerOpen` is
    /// per-sink and the engine keeps serving other sinks).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Error { .. })
    }

    /// `true` if the engine is actively processing messages (`running`
    /// or degraded-but-still-serving, i.e. a sink breaker being open).
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::CircuitBreakerOpen { .. })
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Connecting => write!(f, "connecting"),
            Self::Running => write!(f, "running"),
            Self::Reconnecting { role } => write!(f, "reconnecting:{role}"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error { message } => write!(f, "error:{message}"),
            Self::CircuitBreakerOpen { sink_id } => write!(f, "circuit_breaker_open:{sink_id}"),
        }
    }
}

/// `true` if `to` is a legal successor of `from` (spec §4.5's diagram,
/// read as a strict state machine rather than a loose set of labels).
#[must_use]
pub fn can_transition(from: &EngineStatus, to: &EngineStatus) -> bool {
    use EngineStatus::{CircuitBreakerOpen, Connecting, Error, Initialized, Reconnecting, Running, Stopped};

    match (from, to) {
        (Initialized, Connecting) => true,
        (Connecting, Running) => true,
        (Connecting, Reconnecting { .. } | Error { .. } | Stopped) => true,
        (Running, Reconnecting { .. } | CircuitBreakerOpen { .. } | Stopped | Error { .. }) => true,
        (Reconnecting { .. }, Running) => true,
        (Reconnecting { .. }, Error { .. } | Stopped) => true,
        (CircuitBreakerOpen { .. }, Running | Stopped | Error { .. }) => true,
        // A circuit breaker opening or closing while already degraded
        // for a different sink is legal; same-sink re-announcement is a
        // no-op the caller just shouldn't bother making.
        (CircuitBreakerOpen { sink_id: from_id }, CircuitBreakerOpen { sink_id: to_id }) => from_id != to_id,
        _ => false,
    }
}

/// [`can_transition`], surfaced as a [`Result`] for call sites that want
/// `?` rather than a bare `bool`.
///
/// # Errors
///
/// Returns [`EngineError::Configuration`] naming both states if the
/// transition isn't in the state machine.
pub fn validate_transition(from: &EngineStatus, to: &EngineStatus) -> Result<(), EngineError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(EngineError::Configuration(format!(
            "illegal engine status transition: {from} -> {to}"
        )))
    }
}
