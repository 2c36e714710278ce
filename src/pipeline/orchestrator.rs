//! Process lifecycle: init → (connect → stream)* → shutdown
//!
//! Sensor configuration and buffer allocation happen once and are the only
//! fatal failures. The device identity is resolved on the first successful
//! join. Each connect-and-stream cycle spawns a transmit worker and runs
//! the capture loop on the calling task. A cycle ends on shutdown or when
//! the link cannot be restored; in the latter case the whole cycle is
//! retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::capture::sensor::Sensor;
use crate::error::Result;
use crate::indicator::{Indicator, NoIndicator};
use crate::pipeline::buffers::BufferPool;
use crate::pipeline::capture_loop::{CaptureLoop, CaptureParts};
use crate::pipeline::pacer::FrameRatePacer;
use crate::pipeline::signal::PipelineSignal;
use crate::pipeline::stats::{Stats, StatsSnapshot};
use crate::pipeline::watchdog::{MemoryProbe, MemoryWatchdog};
use crate::transport::link::{DeviceInfo, LinkDriver, Reconnector};
use crate::transport::uplink::Uplink;
use crate::transport::worker::{TransmitWorker, WorkerContext};
use crate::Config;

pub struct Orchestrator<S, L, U> {
    config: Config,
    sensor: S,
    link: Arc<L>,
    uplink: Arc<U>,
    memory: Arc<dyn MemoryProbe>,
    indicator: Box<dyn Indicator>,
    stats: Arc<Stats>,
}

impl<S, L, U> Orchestrator<S, L, U>
where
    S: Sensor,
    L: LinkDriver,
    U: Uplink,
{
    pub fn new(config: Config, sensor: S, link: L, uplink: U, memory: Arc<dyn MemoryProbe>) -> Self {
        Self {
            config,
            sensor,
            link: Arc::new(link),
            uplink: Arc::new(uplink),
            memory,
            indicator: Box::new(NoIndicator),
            stats: Arc::new(Stats::new()),
        }
    }

    pub fn with_indicator(mut self, indicator: Box<dyn Indicator>) -> Self {
        self.indicator = indicator;
        self
    }

    /// Live counters, readable while `run` is in progress.
    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    /// Stream until `shutdown` flips; returns the final counters.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<StatsSnapshot> {
        let Self {
            config,
            mut sensor,
            link,
            uplink,
            memory,
            indicator,
            stats,
        } = self;

        info!("Starting stream");
        memory.reclaim();
        if let Some(free) = memory.free_bytes() {
            info!("Free memory at start: {} bytes", free);
        }

        let geometry = sensor.configure(&config.capture)?;
        info!("Sensor configured: {}x{}", geometry.width, geometry.height);
        let pool = BufferPool::allocate(geometry, &*memory, config.memory.startup_headroom)?;
        let outbound = pool.outbound();

        let signal = Arc::new(PipelineSignal::new());
        let watchdog = MemoryWatchdog::new(
            memory.clone(),
            config.memory.min_free_bytes,
            config.memory.reclaim_every,
            stats.clone(),
        );

        let mut capture = CaptureLoop::new(CaptureParts {
            sensor,
            geometry,
            pool,
            pacer: FrameRatePacer::from_fps(config.capture.target_fps),
            watchdog,
            stats: stats.clone(),
            signal: signal.clone(),
            link,
            reconnector: Reconnector::new(&config.link),
            indicator,
            capture_timeout: config.capture.capture_timeout(),
            report_every: config.report.every_frames,
        });

        let restart_delay = config.link.cycle_restart_delay();
        // Resolved on the first successful join, fixed for the process lifetime.
        let mut identity: Option<Arc<DeviceInfo>> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let joined = tokio::select! {
                joined = capture.connect() => joined,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let link_info = match joined {
                Ok(info) => info,
                Err(e) => {
                    warn!("Connect cycle failed: {}", e);
                    if wait_or_shutdown(restart_delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            let device = match &identity {
                Some(device) => {
                    info!("Link rejoined at {}", link_info.address);
                    device.clone()
                }
                None => {
                    let device = Arc::new(DeviceInfo::resolve(&config.device.id_prefix, &link_info));
                    info!(
                        "Device {} at {} ({})",
                        device.device_id, device.address, device.hardware_address
                    );
                    identity = Some(device.clone());
                    device
                }
            };

            let (stop_tx, stop_rx) = watch::channel(false);
            let worker = TransmitWorker::new(
                uplink.clone(),
                WorkerContext {
                    outbound: outbound.clone(),
                    signal: signal.clone(),
                    stats: stats.clone(),
                    memory: memory.clone(),
                    device,
                    geometry,
                },
                config.uplink.send_timeout(),
                config.uplink.poll_interval(),
            );
            let sender = tokio::spawn(worker.run(stop_rx));

            let streamed = capture.run(&mut shutdown).await;

            // Producer is stopped; let the worker finish and drain.
            let _ = stop_tx.send(true);
            if let Err(e) = sender.await {
                error!("Transmit worker failed: {}", e);
                signal.complete();
            }

            match streamed {
                Ok(()) => break,
                Err(e) => {
                    warn!("Restarting connect cycle: {}", e);
                    if wait_or_shutdown(restart_delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        capture.finish();
        let snapshot = stats.snapshot();
        info!("Streaming stopped");
        info!("Frames total: {}", snapshot.total_frames);
        info!("Sent: {}", snapshot.successful_sends);
        info!("Dropped: {}", snapshot.dropped);
        Ok(snapshot)
    }
}

/// Sleep for `delay`; returns `true` if shutdown was requested meanwhile.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
