//! Per-sink circuit breaker (spec §4.5, §7).
//!
//! Tracks consecutive errors within a sliding window; when the count
//! reaches `threshold` within `interval`, the breaker opens for
//! `cool_off` and rejects writes with [`BreakerOpen`], which the dispatch
//! loop treats as a non-retryable terminal for that message until the
//! breaker closes.
//!
//! Trimmed from nebula's const-generic, compile-time-validated
//! `CircuitBreakerConfig<const N, const M>` (`crates/resilience/src/patterns/
//! circuit_breaker.rs`): Hermod's thresholds are per-workflow catalog
//! data, not known at compile time, so the config here is a plain runtime
//! struct instead.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Operations are allowed.
    Closed,
    /// Operations are rejected.
    Open,
    /// A single probe operation is allowed to test recovery.
    HalfOpen,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration (per-sink, loaded from workflow policy).
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive-error count that opens the breaker.
    pub threshold: usize,
    /// Window within which `threshold` errors must occur to open.
    pub interval: Duration,
    /// How long the breaker stays open before allowing a probe.
    pub cool_off: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            interval: Duration::from_secs(60),
            cool_off: Duration::from_secs(30),
        }
    }
}

/// Error returned when a write is rejected because the breaker is open.
#[derive(Debug, Clone, thiserror::Error)]
#[error("circuit breaker open for sink {sink_id}")]
pub struct BreakerOpen {
    /// The sink this breaker guards.
    pub sink_id: String,
}

struct Inner {
    state: State,
    errors: VecDeque<Instant>,
    opened_at: Option<Instant>,
}

/// A per-sink circuit breaker.
pub struct CircuitBreaker {
    sink_id: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker for the given sink.
    #[must_use]
    pub fn new(sink_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            sink_id: sink_id.into(),
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                errors: VecDeque::new(),
                opened_at: None,
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Call before attempting a write. Returns `Err(BreakerOpen)` if the
    /// breaker is open and the cool-off has not elapsed; transitions to
    /// half-open and allows exactly one probe once it has.
    pub fn check(&self) -> Result<(), BreakerOpen> {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => Ok(()),
            State::HalfOpen => Ok(()),
            State::Open => {
                let opened_at = inner.opened_at.expect("open implies opened_at set");
                if opened_at.elapsed() >= self.config.cool_off {
                    inner.state = State::HalfOpen;
                    Ok(())
                } else {
                    Err(BreakerOpen {
                        sink_id: self.sink_id.clone(),
                    })
                }
            }
        }
    }

    /// Record a successful write.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.errors.clear();
        inner.state = State::Closed;
        inner.opened_at = None;
    }

    /// Record a failed write. Returns `true` if this call opened the
    /// breaker.
    pub fn record_failure(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.state == State::HalfOpen {
            inner.state = State::Open;
            inner.opened_at = Some(now);
            inner.errors.clear();
            return true;
        }

        inner.errors.push_back(now);
        let interval = self.config.interval;
        while let Some(front) = inner.errors.front() {
            if now.duration_since(*front) > interval {
                inner.errors.pop_front();
            } else {
                break;
            }
        }

        if inner.errors.len() >= self.config.threshold && inner.state == State::Closed {
            inner.state = State::Open;
            inner.opened_at = Some(now);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: usize) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            threshold,
            interval: Duration::from_secs(60),
            cool_off: Duration::from_millis(20),
        }
    }

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::new("sink-1", config(3));
        assert_eq!(cb.state(), State::Closed);
        assert!(cb.check().is_ok());
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new("sink-1", config(3));
        assert!(!cb.record_failure());
        assert!(!cb.record_failure());
        assert!(cb.record_failure());
        assert_eq!(cb.state(), State::Open);
        assert!(cb.check().is_err());
    }

    #[test]
    fn success_resets_the_failure_count() {
        let cb = CircuitBreaker::new("sink-1", config(3));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert!(!cb.record_failure());
        assert_eq!(cb.state(), State::Closed);
    }

    #[test]
    fn half_open_after_cool_off_allows_one_probe() {
        let cb = CircuitBreaker::new("sink-1", config(1));
        cb.record_failure();
        assert_eq!(cb.state(), State::Open);
        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.check().is_ok());
        assert_eq!(cb.state(), State::HalfOpen);
    }

    #[test]
    fn failed_probe_in_half_open_reopens() {
        let cb = CircuitBreaker::new("sink-1", config(1));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        cb.check().unwrap();
        assert!(cb.record_failure());
        assert_eq!(cb.state(), State::Open);
    }

    #[test]
    fn successful_probe_in_half_open_closes() {
        let cb = CircuitBreaker::new("sink-1", config(1));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        cb.check().unwrap();
        cb.record_success();
        assert_eq!(cb.state(), State::Closed);
    }
}
