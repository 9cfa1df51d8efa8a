#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod Log
//!
//! Process-wide `tracing` setup. Trimmed from nebula's `nebula-log`
//! (which also wires Sentry, OpenTelemetry export, and rotating file
//! appenders) down to the one subscriber a Hermod worker process needs:
//! an `EnvFilter`-driven stdout writer in either human or JSON format.
//! A worker process runs under a supervisor that already captures
//! stdout; shipping logs elsewhere is that supervisor's job, not the
//! core's.

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for the process-wide log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable, ANSI-colored (the default for interactive use).
    #[default]
    Pretty,
    /// Newline-delimited JSON, for log aggregators.
    Json,
}

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `RUST_LOG`-style filter directive, e.g. `"hermod=debug,info"`.
    pub filter: String,
    /// Output format.
    pub format: Format,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: Format::default(),
        }
    }
}

/// Errors initializing the subscriber.
#[derive(Debug, Error)]
pub enum LogError {
    /// The filter directive string did not parse.
    #[error("invalid log filter {directive:?}: {source}")]
    InvalidFilter {
        /// The offending directive string.
        directive: String,
        /// Underlying parse error.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber was already installed (e.g. by a test
    /// harness); `init` is a no-op rather than an error in that case.
    #[error("global subscriber already set")]
    AlreadySet,
}

/// Install the process-wide `tracing` subscriber.
///
/// Idempotent: if a subscriber is already installed (common in test
/// binaries that call `init` from multiple integration tests), returns
/// `Err(LogError::AlreadySet)` rather than panicking.
pub fn init(config: &Config) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|source| LogError::InvalidFilter {
        directive: config.filter.clone(),
        source,
    })?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        Format::Pretty => registry.with(fmt::layer().with_ansi(true)).try_init(),
        Format::Json => registry.with(fmt::layer().json()).try_init(),
    };

    result.map_err(|_| LogError::AlreadySet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_info_pretty() {
        let config = Config::default();
        assert_eq!(config.filter, "info");
        assert_eq!(config.format, Format::Pretty);
    }

    #[test]
    fn invalid_filter_is_rejected() {
        let config = Config {
            filter: "not a valid directive ===".to_string(),
            format: Format::Pretty,
        };
        assert!(init(&config).is_err());
    }
}
