//! Free-memory watchdog
//!
//! Checked before every capture attempt. A reading below the floor vetoes
//! the capture for that cycle and forces a reclamation pass. Independently
//! of the veto path, a reclamation pass also runs every `reclaim_every`
//! completed frames.

use std::fs;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::pipeline::stats::Stats;

/// Source of free-memory readings and the reclamation hook.
pub trait MemoryProbe: Send + Sync {
    /// Bytes currently available, or `None` if they cannot be measured.
    fn free_bytes(&self) -> Option<u64>;

    /// Return freed memory to the system.
    fn reclaim(&self);
}

/// Host probe backed by `/proc/meminfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl MemoryProbe for SystemMemory {
    fn free_bytes(&self) -> Option<u64> {
        match fs::read_to_string("/proc/meminfo") {
            Ok(content) => parse_mem_available(&content),
            Err(e) => {
                debug!("Failed to read /proc/meminfo: {}", e);
                None
            }
        }
    }

    fn reclaim(&self) {
        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        // SAFETY: malloc_trim only releases free heap pages back to the OS.
        unsafe {
            libc::malloc_trim(0);
        }
    }
}

/// Extract `MemAvailable` in bytes.
fn parse_mem_available(content: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with("MemAvailable:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryHealth {
    Healthy,
    Unhealthy { free: u64 },
}

pub struct MemoryWatchdog {
    probe: Arc<dyn MemoryProbe>,
    floor: u64,
    reclaim_every: u64,
    stats: Arc<Stats>,
}

impl MemoryWatchdog {
    pub fn new(probe: Arc<dyn MemoryProbe>, floor: u64, reclaim_every: u64, stats: Arc<Stats>) -> Self {
        Self {
            probe,
            floor,
            reclaim_every,
            stats,
        }
    }

    /// Compare free memory against the floor.
    ///
    /// An unhealthy reading reclaims immediately and counts one memory error.
    /// An unmeasurable reading is treated as healthy.
    pub fn check(&self) -> MemoryHealth {
        match self.probe.free_bytes() {
            Some(free) if free < self.floor => {
                warn!(free, floor = self.floor, "Low memory, skipping capture");
                self.stats.record_memory_error();
                self.probe.reclaim();
                MemoryHealth::Unhealthy { free }
            }
            _ => MemoryHealth::Healthy,
        }
    }

    /// Proactive reclamation at a fixed cadence of completed frames.
    ///
    /// Returns `true` if a pass ran.
    pub fn periodic(&self, completed_frames: u64) -> bool {
        if self.reclaim_every == 0 || completed_frames == 0 || completed_frames % self.reclaim_every != 0 {
            return false;
        }
        self.probe.reclaim();
        true
    }

    pub fn free_bytes(&self) -> Option<u64> {
        self.probe.free_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct SimMemory {
        free: AtomicU64,
        reclaims: AtomicU64,
    }

    impl MemoryProbe for SimMemory {
        fn free_bytes(&self) -> Option<u64> {
            Some(self.free.load(Ordering::Relaxed))
        }

        fn reclaim(&self) {
            self.reclaims.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn watchdog(free: u64) -> (MemoryWatchdog, Arc<SimMemory>, Arc<Stats>) {
        let probe = Arc::new(SimMemory::default());
        probe.free.store(free, Ordering::Relaxed);
        let stats = Arc::new(Stats::new());
        let dog = MemoryWatchdog::new(probe.clone(), 8192, 5, stats.clone());
        (dog, probe, stats)
    }

    #[test]
    fn test_healthy_above_floor() {
        let (dog, probe, stats) = watchdog(8192);
        assert_eq!(dog.check(), MemoryHealth::Healthy);
        assert_eq!(probe.reclaims.load(Ordering::Relaxed), 0);
        assert_eq!(stats.snapshot().memory_errors, 0);
    }

    #[test]
    fn test_unhealthy_reclaims_and_counts_once_per_reading() {
        let (dog, probe, stats) = watchdog(4096);
        assert_eq!(dog.check(), MemoryHealth::Unhealthy { free: 4096 });
        assert_eq!(stats.snapshot().memory_errors, 1);
        assert_eq!(probe.reclaims.load(Ordering::Relaxed), 1);

        assert!(matches!(dog.check(), MemoryHealth::Unhealthy { .. }));
        assert_eq!(stats.snapshot().memory_errors, 2);
    }

    #[test]
    fn test_periodic_cadence() {
        let (dog, probe, _) = watchdog(1 << 20);
        let ran: Vec<u64> = (0..=15).filter(|&n| dog.periodic(n)).collect();
        assert_eq!(ran, vec![5, 10, 15]);
        assert_eq!(probe.reclaims.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_parse_mem_available() {
        let content = "MemTotal:        3884344 kB\nMemFree:          123456 kB\nMemAvailable:    2000000 kB\n";
        assert_eq!(parse_mem_available(content), Some(2_000_000 * 1024));
        assert_eq!(parse_mem_available("MemTotal: 1 kB\n"), None);
    }
}
