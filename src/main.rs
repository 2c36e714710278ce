//! Flashcam frame streamer

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::Result;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flashcam::capture::{PatternSensor, Sensor, V4l2Sensor};
use flashcam::pipeline::{MemoryProbe, Orchestrator, SystemMemory};
use flashcam::transport::{HostLink, HttpUplink};
use flashcam::{indicator, Config, SensorSource, StatsSnapshot};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flashcam=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Flashcam launching...");

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(path.as_deref())?;
    info!("Uploading to {}", config.uplink.url());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    let summary = match config.capture.source {
        SensorSource::Pattern => stream(config, PatternSensor::new(), shutdown_rx).await?,
        SensorSource::V4l2 => stream(config, V4l2Sensor::new(), shutdown_rx).await?,
    };

    info!(
        "Done: {} frames, {} sent, {} network errors, {} dropped, {} skipped ({:.0}% delivered)",
        summary.total_frames,
        summary.successful_sends,
        summary.network_errors,
        summary.dropped,
        summary.skipped,
        summary.efficiency()
    );
    Ok(())
}

async fn stream<S: Sensor>(
    config: Config,
    sensor: S,
    shutdown: watch::Receiver<bool>,
) -> Result<StatsSnapshot> {
    let link = HostLink::new(&config.link);
    let uplink = HttpUplink::new(&config.uplink)?;
    let memory: Arc<dyn MemoryProbe> = Arc::new(SystemMemory);
    let led = indicator::from_config(config.indicator.led.as_deref());

    let orchestrator = Orchestrator::new(config, sensor, link, uplink, memory).with_indicator(led);
    Ok(orchestrator.run(shutdown).await?)
}
