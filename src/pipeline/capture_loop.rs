//! Producer side of the pipeline
//!
//! One cycle per pacing tick:
//!
//! 1. wait for the tick and record the achieved fps
//! 2. if the link is down, suspend and run a bounded reconnect
//! 3. if the slot still holds a frame, skip the tick (backpressure)
//! 4. if the watchdog vetoes, drop the cycle
//! 5. capture into the Active buffer, swap roles, publish the sequence
//!
//! The producer is therefore never more than one frame ahead of the
//! consumer, and a slow uplink costs capture opportunities, not memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::frame::{FrameDescriptor, FrameGeometry};
use crate::capture::sensor::Sensor;
use crate::error::{LinkError, SensorError};
use crate::indicator::{blink_phase, Indicator};
use crate::pipeline::buffers::BufferPool;
use crate::pipeline::pacer::FrameRatePacer;
use crate::pipeline::signal::PipelineSignal;
use crate::pipeline::stats::{Report, Stats, StatsSnapshot};
use crate::pipeline::watchdog::{MemoryHealth, MemoryWatchdog};
use crate::transport::link::{LinkDriver, LinkInfo, Reconnector};

/// Producer state. `Ready` lasts until the consumer empties the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
    Ready,
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Captured(FrameDescriptor),
    /// Slot still occupied; not a drop
    Skipped,
    MemoryVeto,
    SensorFailed,
}

/// Everything the producer needs, assembled by the orchestrator.
pub struct CaptureParts<S, L> {
    pub sensor: S,
    pub geometry: FrameGeometry,
    pub pool: BufferPool,
    pub pacer: FrameRatePacer,
    pub watchdog: MemoryWatchdog,
    pub stats: Arc<Stats>,
    pub signal: Arc<PipelineSignal>,
    pub link: Arc<L>,
    pub reconnector: Reconnector,
    pub indicator: Box<dyn Indicator>,
    pub capture_timeout: Duration,
    pub report_every: u64,
}

pub struct CaptureLoop<S, L> {
    sensor: S,
    geometry: FrameGeometry,
    pool: BufferPool,
    pacer: FrameRatePacer,
    watchdog: MemoryWatchdog,
    stats: Arc<Stats>,
    signal: Arc<PipelineSignal>,
    link: Arc<L>,
    reconnector: Reconnector,
    indicator: Box<dyn Indicator>,
    capture_timeout: Duration,
    report_every: u64,
    sequence: u64,
    state: CaptureState,
}

impl<S: Sensor, L: LinkDriver> CaptureLoop<S, L> {
    pub fn new(parts: CaptureParts<S, L>) -> Self {
        Self {
            sensor: parts.sensor,
            geometry: parts.geometry,
            pool: parts.pool,
            pacer: parts.pacer,
            watchdog: parts.watchdog,
            stats: parts.stats,
            signal: parts.signal,
            link: parts.link,
            reconnector: parts.reconnector,
            indicator: parts.indicator,
            capture_timeout: parts.capture_timeout,
            report_every: parts.report_every,
            sequence: 0,
            state: CaptureState::Idle,
        }
    }

    pub fn state(&self) -> CaptureState {
        match self.state {
            CaptureState::Ready if !self.signal.is_occupied() => CaptureState::Idle,
            state => state,
        }
    }

    /// Sequence number of the last published frame (0 before the first).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Run a bounded connect cycle on the link.
    pub async fn connect(&mut self) -> Result<LinkInfo, LinkError> {
        self.reconnector.connect(&*self.link).await
    }

    /// One pacing tick. Only an exhausted reconnect is returned as an error.
    pub async fn cycle(&mut self) -> Result<CycleOutcome, LinkError> {
        let fps = self.pacer.tick().await;
        self.stats.set_fps(fps);

        if !self.link.is_connected() {
            warn!("Link lost, suspending capture");
            self.reconnector.on_lost();
            let restored = self.connect().await?;
            info!("Link restored at {}", restored.address);
        }

        let outcome = if self.signal.is_occupied() {
            self.stats.record_skip();
            CycleOutcome::Skipped
        } else if let MemoryHealth::Unhealthy { .. } = self.watchdog.check() {
            self.stats.record_drop();
            CycleOutcome::MemoryVeto
        } else {
            self.capture().await
        };

        if let CycleOutcome::Captured(frame) = outcome {
            if self.watchdog.periodic(frame.sequence) {
                debug!(sequence = frame.sequence, "Periodic reclamation");
            }
            if self.report_every > 0 && frame.sequence % self.report_every == 0 {
                self.report();
            }
        }
        self.indicator.set(blink_phase(self.sequence));

        Ok(outcome)
    }

    async fn capture(&mut self) -> CycleOutcome {
        self.state = CaptureState::Capturing;
        let start = Instant::now();

        let captured = tokio::time::timeout(
            self.capture_timeout,
            self.sensor.capture_into(self.pool.active_mut()),
        )
        .await;
        let took = start.elapsed();

        // A sensor that blocks the thread never yields to the timer, so
        // the bound is also enforced on the measured duration.
        let captured = match captured {
            Ok(Ok(())) if took > self.capture_timeout => Err(SensorError::Timeout(took)),
            Ok(result) => result,
            Err(_) => Err(SensorError::Timeout(self.capture_timeout)),
        };

        match captured {
            Ok(()) => {
                self.pool.swap();
                self.sequence += 1;
                self.stats.record_capture(took);
                let published = self.signal.publish(self.sequence);
                debug_assert!(published, "slot filled while producer held it empty");
                self.state = CaptureState::Ready;

                CycleOutcome::Captured(FrameDescriptor {
                    sequence: self.sequence,
                    width: self.geometry.width,
                    height: self.geometry.height,
                    capture_time: took,
                })
            }
            Err(e) => {
                warn!("Capture failed: {}", e);
                self.stats.record_drop();
                self.state = CaptureState::Idle;
                CycleOutcome::SensorFailed
            }
        }
    }

    /// Log the periodic summary and return the snapshot it was built from.
    pub fn report(&self) -> StatsSnapshot {
        let snapshot = self.stats.snapshot();
        let free_memory = self.watchdog.free_bytes();
        info!(
            "{}",
            Report {
                snapshot: &snapshot,
                free_memory,
            }
        );
        snapshot
    }

    /// Cycle until `shutdown` flips or the link cannot be restored.
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), LinkError> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            tokio::select! {
                cycle = self.cycle() => {
                    cycle?;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Turn the indicator off.
    pub fn finish(&mut self) {
        self.indicator.set(false);
    }
}
