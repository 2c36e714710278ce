//! Frame-rate pacing
//!
//! Sleeps out whatever is left of the target interval since the previous
//! tick. An overrun cycle proceeds immediately and the next tick is
//! measured from that late start, so lost time is never made up with a
//! burst of captures.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct FrameRatePacer {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl FrameRatePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
        }
    }

    /// Pacer for `fps` frames per second. Zero is clamped to one.
    pub fn from_fps(fps: u32) -> Self {
        Self::new(Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1))))
    }

    /// Time left before the next capture is due, measured at `now`.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_tick {
            Some(last) => self.interval.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Wait for the next tick; returns the achieved instantaneous fps.
    pub async fn tick(&mut self) -> f64 {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
        self.mark(Instant::now())
    }

    /// Record a tick at `now` and derive fps from the gap since the last one.
    pub fn mark(&mut self, now: Instant) -> f64 {
        let fps = match self.last_tick {
            Some(last) => {
                let elapsed = now.duration_since(last).as_secs_f64();
                if elapsed > 0.0 {
                    1.0 / elapsed
                } else {
                    f64::INFINITY
                }
            }
            None => 0.0,
        };
        self.last_tick = Some(now);
        fps
    }
}
