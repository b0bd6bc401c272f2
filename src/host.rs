//! Host metrics provider adapter.
//!
//! The engine never inspects the host directly; it consumes the narrow
//! [`HostMetrics`] seam and treats a failed sample as "no memory
//! available" rather than a fatal error. [`SystemMetrics`] is the real
//! implementation, backed by the `sysinfo` crate; tests substitute fixed
//! profiles.

use std::sync::Mutex;
use std::time::Instant;

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::{MuninnError, Result};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// A point-in-time snapshot of host memory and CPU facts.
///
/// Produced fresh on every [`HostMetrics::sample`] call and never mutated
/// afterwards.
#[derive(Debug, Clone, Copy)]
pub struct MemoryProfile {
    /// Total physical memory in megabytes.
    pub total_mb: u64,
    /// Memory currently available for new allocations, in megabytes.
    pub available_mb: u64,
    /// Number of logical CPUs.
    pub cpu_count: usize,
    /// When this snapshot was taken.
    pub sampled_at: Instant,
}

impl MemoryProfile {
    /// Construct a snapshot with explicit values (tests, degraded mode).
    pub fn new(total_mb: u64, available_mb: u64, cpu_count: usize) -> Self {
        Self {
            total_mb,
            available_mb,
            cpu_count,
            sampled_at: Instant::now(),
        }
    }

    /// The profile the router assumes when the host cannot be queried:
    /// zero available memory, which forces the remote fallback.
    pub fn exhausted() -> Self {
        Self::new(0, 0, 1)
    }

    /// Megabytes currently in use.
    pub fn used_mb(&self) -> u64 {
        self.total_mb.saturating_sub(self.available_mb)
    }

    /// Used memory as a percentage of total. Zero-total profiles report
    /// 100% so that pressure logic stays conservative.
    pub fn used_pct(&self) -> f64 {
        if self.total_mb == 0 {
            return 100.0;
        }
        self.used_mb() as f64 / self.total_mb as f64 * 100.0
    }
}

/// Narrow interface to the host metrics collaborator.
pub trait HostMetrics: Send + Sync {
    /// Take a fresh memory snapshot.
    ///
    /// Fails with [`MuninnError::MetricsUnavailable`] when the host cannot
    /// be queried; callers degrade rather than propagate.
    fn sample(&self) -> Result<MemoryProfile>;
}

/// Host metrics backed by `sysinfo`.
///
/// The `System` handle is kept behind a mutex so repeated samples reuse
/// the same refresh state; each call refreshes memory counters only.
pub struct SystemMetrics {
    system: Mutex<System>,
}

impl SystemMetrics {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMetrics for SystemMetrics {
    fn sample(&self) -> Result<MemoryProfile> {
        let mut system = self
            .system
            .lock()
            .map_err(|e| MuninnError::MetricsUnavailable(format!("metrics lock poisoned: {e}")))?;
        system.refresh_memory();

        let total_mb = system.total_memory() / BYTES_PER_MB;
        if total_mb == 0 {
            // Some sandboxed platforms report nothing at all
            return Err(MuninnError::MetricsUnavailable(
                "host reported zero total memory".to_string(),
            ));
        }

        Ok(MemoryProfile {
            total_mb,
            available_mb: system.available_memory() / BYTES_PER_MB,
            cpu_count: num_cpus(),
            sampled_at: Instant::now(),
        })
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A fixed-profile provider for tests and degraded environments.
pub struct StaticMetrics {
    profile: MemoryProfile,
}

impl StaticMetrics {
    pub fn new(profile: MemoryProfile) -> Self {
        Self { profile }
    }
}

impl HostMetrics for StaticMetrics {
    fn sample(&self) -> Result<MemoryProfile> {
        // Fresh timestamp, fixed numbers
        Ok(MemoryProfile {
            sampled_at: Instant::now(),
            ..self.profile
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_mb_and_pct() {
        let p = MemoryProfile::new(8192, 2048, 8);
        assert_eq!(p.used_mb(), 6144);
        assert!((p.used_pct() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn exhausted_profile_forces_pressure() {
        let p = MemoryProfile::exhausted();
        assert_eq!(p.available_mb, 0);
        assert_eq!(p.used_pct(), 100.0);
    }

    #[test]
    fn static_metrics_returns_fresh_timestamps() {
        let provider = StaticMetrics::new(MemoryProfile::new(4096, 1000, 4));
        let a = provider.sample().unwrap();
        let b = provider.sample().unwrap();
        assert_eq!(a.available_mb, b.available_mb);
        assert!(b.sampled_at >= a.sampled_at);
    }

    #[test]
    fn system_metrics_samples_this_host() {
        // Host-dependent, but every CI box has some memory
        let provider = SystemMetrics::new();
        if let Ok(profile) = provider.sample() {
            assert!(profile.total_mb > 0);
            assert!(profile.available_mb <= profile.total_mb);
            assert!(profile.cpu_count >= 1);
        }
    }
}
