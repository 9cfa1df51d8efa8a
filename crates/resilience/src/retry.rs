//! Retry schedules shared by source reconnection and sink retries
//! (spec §4.5: "exponential schedule (or explicit `retry_intervals`
//! list)").

use std::time::Duration;

/// A retry/reconnect backoff schedule.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// An explicit list of intervals; the final entry repeats once
    /// exhausted (spec §4.5 "a list with a final repeating interval").
    Intervals(Vec<Duration>),
    /// Exponential backoff from `base`, doubling each attempt, capped at
    /// `max`.
    Exponential {
        /// First retry delay.
        base: Duration,
        /// Upper bound on any single delay.
        max: Duration,
    },
}

impl Schedule {
    /// The delay before the `attempt`-th retry (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            Self::Intervals(intervals) => intervals
                .get(attempt)
                .copied()
                .or_else(|| intervals.last().copied())
                .unwrap_or(Duration::ZERO),
            Self::Exponential { base, max } => {
                let factor = 1u64.checked_shl(attempt.min(32) as u32).unwrap_or(u64::MAX);
                base.checked_mul(factor as u32)
                    .map_or(*max, |d| d.min(*max))
            }
        }
    }
}

/// `max_retries` + schedule: governs how many attempts a sink write or
/// source reconnect gets before the message is treated as poison (spec
/// §7 "Poison message").
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_retries: usize,
    /// Delay schedule between attempts.
    pub schedule: Schedule,
}

impl RetryPolicy {
    /// `true` once `attempt` (0-indexed) has exhausted the policy.
    #[must_use]
    pub fn exhausted(&self, attempt: usize) -> bool {
        attempt >= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            schedule: Schedule::Exponential {
                base: Duration::from_millis(100),
                max: Duration::from_secs(30),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_repeat_last_entry_once_exhausted() {
        let schedule = Schedule::Intervals(vec![
            Duration::from_millis(10),
            Duration::from_millis(100),
        ]);
        assert_eq!(schedule.delay(0), Duration::from_millis(10));
        assert_eq!(schedule.delay(1), Duration::from_millis(100));
        assert_eq!(schedule.delay(2), Duration::from_millis(100));
        assert_eq!(schedule.delay(50), Duration::from_millis(100));
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let schedule = Schedule::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };
        assert_eq!(schedule.delay(0), Duration::from_millis(100));
        assert_eq!(schedule.delay(1), Duration::from_millis(200));
        assert_eq!(schedule.delay(2), Duration::from_millis(400));
        assert_eq!(schedule.delay(10), Duration::from_secs(1));
    }

    #[test]
    fn policy_exhaustion() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..RetryPolicy::default()
        };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
    }
}
