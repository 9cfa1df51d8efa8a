#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Hermod System
//!
//! Point-in-time CPU/memory utilization sampling for the worker heartbeat
//! (spec §4.2) and resource-aware rendezvous hashing (spec §4.3). Trimmed
//! from nebula's `nebula-system` (which also covers cache topology, NUMA,
//! and CPU feature-flag detection) down to the one sample the reconciler
//! actually consumes: `cpu_usage` and `mem_usage` as fractions in `[0, 1]`.

use parking_lot::Mutex;
use sysinfo::System;

/// A single CPU/memory utilization sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utilization {
    /// Average CPU usage across all cores, in `[0.0, 1.0]`.
    pub cpu_usage: f64,
    /// Memory usage as a fraction of total physical memory, in `[0.0, 1.0]`.
    pub mem_usage: f64,
}

impl Utilization {
    /// An all-zero sample, useful as a safe default before the first real
    /// sample is taken.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            cpu_usage: 0.0,
            mem_usage: 0.0,
        }
    }
}

/// Samples the local machine's CPU and memory utilization.
///
/// `sysinfo::System::global_cpu_usage` requires two refreshes separated
/// by a delay to produce a meaningful reading, so the sampler retains
/// its `System` handle across calls rather than constructing a fresh one
/// per sample.
pub struct Sampler {
    system: Mutex<System>,
}

impl Sampler {
    /// Create a sampler, taking an initial baseline reading.
    #[must_use]
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self {
            system: Mutex::new(system),
        }
    }

    /// Refresh and return the current utilization sample.
    pub fn sample(&self) -> Utilization {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_usage = f64::from(system.global_cpu_usage()) / 100.0;
        let total = system.total_memory();
        let used = system.used_memory();
        let mem_usage = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64
        };

        Utilization {
            cpu_usage: cpu_usage.clamp(0.0, 1.0),
            mem_usage: mem_usage.clamp(0.0, 1.0),
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_within_unit_range() {
        let sampler = Sampler::new();
        let sample = sampler.sample();
        assert!((0.0..=1.0).contains(&sample.cpu_usage));
        assert!((0.0..=1.0).contains(&sample.mem_usage));
    }

    #[test]
    fn zero_is_all_zero() {
        let z = Utilization::zero();
        assert_eq!(z.cpu_usage, 0.0);
        assert_eq!(z.mem_usage, 0.0);
    }
}
