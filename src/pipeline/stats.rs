//! Pipeline counters shared by the capture loop and the transmit worker
//!
//! Every field has a single writer: the producer owns `fps`,
//! `capture_time`, `dropped`, `skipped`, `total` and `memory_errors`; the
//! consumer owns `send_time`, `successful_sends` and `network_errors`.
//! Per-field atomics are therefore enough, no whole-struct lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::utils::CachePadded;

#[derive(Debug, Default)]
pub struct Stats {
    fps_bits: AtomicU64,
    capture_time_us: AtomicU64,
    send_time_us: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
    total: CachePadded<AtomicU64>,
    network_errors: CachePadded<AtomicU64>,
    successful_sends: AtomicU64,
    memory_errors: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fps(&self, fps: f64) {
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }

    /// A frame was captured and published.
    pub fn record_capture(&self, took: Duration) {
        self.capture_time_us.store(took.as_micros() as u64, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Release);
        metrics::counter!("frames_captured").increment(1);
        metrics::histogram!("capture_time_us").record(took.as_micros() as f64);
    }

    /// A capture attempt produced no frame (sensor failure, memory veto).
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_dropped").increment(1);
    }

    /// A pacing tick passed while the consumer still held the slot.
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_skipped").increment(1);
    }

    pub fn record_memory_error(&self) {
        self.memory_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("memory_errors").increment(1);
    }

    pub fn record_send(&self, took: Duration) {
        self.send_time_us.store(took.as_micros() as u64, Ordering::Relaxed);
        self.successful_sends.fetch_add(1, Ordering::Release);
        metrics::counter!("frames_sent").increment(1);
        metrics::histogram!("send_time_us").record(took.as_micros() as f64);
    }

    pub fn record_network_error(&self, took: Duration) {
        self.send_time_us.store(took.as_micros() as u64, Ordering::Relaxed);
        self.network_errors.fetch_add(1, Ordering::Release);
        metrics::counter!("network_errors").increment(1);
    }

    pub fn total_frames(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fps: f64::from_bits(self.fps_bits.load(Ordering::Relaxed)),
            capture_time: Duration::from_micros(self.capture_time_us.load(Ordering::Relaxed)),
            send_time: Duration::from_micros(self.send_time_us.load(Ordering::Relaxed)),
            dropped: self.dropped.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            total_frames: self.total.load(Ordering::Acquire),
            network_errors: self.network_errors.load(Ordering::Acquire),
            successful_sends: self.successful_sends.load(Ordering::Acquire),
            memory_errors: self.memory_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    pub fps: f64,
    pub capture_time: Duration,
    pub send_time: Duration,
    pub dropped: u64,
    pub skipped: u64,
    pub total_frames: u64,
    pub network_errors: u64,
    pub successful_sends: u64,
    pub memory_errors: u64,
}

impl StatsSnapshot {
    /// Fraction of captured frames the collector accepted, in percent.
    pub fn efficiency(&self) -> f64 {
        self.successful_sends as f64 / self.total_frames.max(1) as f64 * 100.0
    }

    /// Frames published whose send attempt has not finished yet.
    pub fn unsettled(&self) -> u64 {
        self.total_frames
            .saturating_sub(self.successful_sends + self.network_errors)
    }
}

/// Human-readable periodic summary line.
pub struct Report<'a> {
    pub snapshot: &'a StatsSnapshot,
    pub free_memory: Option<u64>,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot;
        match self.free_memory {
            Some(free) => write!(f, "Mem: {}KB", free / 1024)?,
            None => write!(f, "Mem: ?")?,
        }
        write!(
            f,
            " | FPS: {:.1} | Cap: {}ms | Send: {}ms | Drops: {} | Skips: {} | Eff: {:.0}%",
            s.fps,
            s.capture_time.as_millis(),
            s.send_time.as_millis(),
            s.dropped,
            s.skipped,
            s.efficiency()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = Stats::new();
        stats.record_capture(Duration::from_millis(10));
        stats.record_capture(Duration::from_millis(12));
        stats.record_send(Duration::from_millis(80));
        stats.record_network_error(Duration::from_millis(120));
        stats.record_drop();
        stats.record_skip();
        stats.record_skip();
        stats.set_fps(19.5);

        let snap = stats.snapshot();
        assert_eq!(snap.total_frames, 2);
        assert_eq!(snap.successful_sends, 1);
        assert_eq!(snap.network_errors, 1);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.skipped, 2);
        assert_eq!(snap.capture_time, Duration::from_millis(12));
        assert_eq!(snap.send_time, Duration::from_millis(120));
        assert_eq!(snap.fps, 19.5);
        assert_eq!(snap.unsettled(), 0);
    }

    #[test]
    fn test_efficiency() {
        let snap = StatsSnapshot {
            total_frames: 4,
            successful_sends: 3,
            ..Default::default()
        };
        assert_eq!(snap.efficiency(), 75.0);
        assert_eq!(StatsSnapshot::default().efficiency(), 0.0);
    }

    #[test]
    fn test_report_line() {
        let snap = StatsSnapshot {
            fps: 12.5,
            capture_time: Duration::from_millis(10),
            send_time: Duration::from_millis(80),
            dropped: 2,
            skipped: 7,
            total_frames: 10,
            successful_sends: 9,
            ..Default::default()
        };
        let line = Report {
            snapshot: &snap,
            free_memory: Some(64 * 1024),
        }
        .to_string();
        assert_eq!(
            line,
            "Mem: 64KB | FPS: 12.5 | Cap: 10ms | Send: 80ms | Drops: 2 | Skips: 7 | Eff: 90%"
        );
    }
}
