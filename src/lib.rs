pub mod capture;
pub mod error;
pub mod indicator;
pub mod pipeline;
pub mod transport;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::frame::{FrameDescriptor, FrameGeometry, PixelFormat};
pub use error::{PipelineError, Result};
pub use pipeline::stats::{Stats, StatsSnapshot};

/// Environment prefix for configuration overrides, e.g. `FLASHCAM_UPLINK__SERVER_URL`.
pub const ENV_PREFIX: &str = "FLASHCAM";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub uplink: UplinkConfig,
    pub capture: CaptureConfig,
    pub memory: MemoryConfig,
    pub report: ReportConfig,
    pub indicator: IndicatorConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub ssid: String,
    pub password: String,
    /// Collector `host:port` probed to decide the link is up
    pub probe_addr: String,
    /// Network interface whose state and hardware address we report
    pub interface: Option<String>,
    pub join_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Pause before the orchestrator restarts a failed connect cycle
    pub cycle_restart_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    pub server_url: String,
    pub endpoint: String,
    pub send_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    /// Synthetic colour bars
    Pattern,
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SensorSource,
    /// V4L2 device path; empty means auto-detect
    pub device: String,
    pub width: u16,
    pub height: u16,
    pub target_fps: u32,
    pub capture_timeout_ms: u64,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Captures are vetoed below this many free bytes
    pub min_free_bytes: u64,
    /// Proactive reclamation cadence, in completed frames
    pub reclaim_every: u64,
    /// Extra free bytes required at startup beyond the buffers themselves
    pub startup_headroom: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Emit a summary every this many produced frames
    pub every_frames: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// LED name under `/sys/class/leds`
    pub led: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub id_prefix: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            probe_addr: "192.168.1.141:8000".into(),
            interface: None,
            join_timeout_ms: 8_000,
            max_retries: 2,
            retry_delay_ms: 1_000,
            cycle_restart_delay_ms: 1_000,
        }
    }
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            server_url: "http://192.168.1.141:8000".into(),
            endpoint: "/upload_raw_image_flash/".into(),
            send_timeout_ms: 120_000,
            poll_interval_ms: 2,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SensorSource::Pattern,
            device: String::new(),
            // VGA divided by four
            width: 160,
            height: 120,
            target_fps: 20,
            capture_timeout_ms: 10_000,
            buffer_count: 2,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_free_bytes: 8_192,
            reclaim_every: 5,
            startup_headroom: 10_000,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { every_frames: 25 }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id_prefix: "PicoW".into(),
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `FLASHCAM_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.unwrap_or_else(|| Path::new("flashcam.toml"));
        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Config::default())?)
            .add_source(::config::File::from(file).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

impl LinkConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn cycle_restart_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_restart_delay_ms)
    }
}

impl UplinkConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), self.endpoint)
    }
}

impl CaptureConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}
