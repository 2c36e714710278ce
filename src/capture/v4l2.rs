//! V4L2 sensor driver producing big-endian RGB565 frames

use std::io;
use std::time::Duration;

use tracing::{info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::FrameGeometry;
use crate::capture::sensor::Sensor;
use crate::error::SensorError;
use crate::{utils, CaptureConfig};

/// RGB565 big-endian, the collector's byte order
pub const FOURCC_RGB565_BE: [u8; 4] = *b"RGBR";
/// RGB565 little-endian, swapped per pixel after capture
pub const FOURCC_RGB565_LE: [u8; 4] = *b"RGBP";

/// V4L2 capture into caller-owned buffers
pub struct V4l2Sensor {
    stream: Option<MmapStream<'static>>,
    geometry: Option<FrameGeometry>,
    swap_bytes: bool,
    timeout: Duration,
}

impl V4l2Sensor {
    pub fn new() -> Self {
        Self {
            stream: None,
            geometry: None,
            swap_bytes: false,
            timeout: Duration::ZERO,
        }
    }
}

impl Default for V4l2Sensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for V4l2Sensor {
    fn configure(&mut self, config: &CaptureConfig) -> Result<FrameGeometry, SensorError> {
        let path = if config.device.is_empty() {
            utils::auto_detect_device()?
        } else {
            config.device.clone()
        };
        info!("Initializing V4L2 sensor: {}", path);

        let device = Device::with_path(&path)?;

        // Query capabilities
        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(SensorError::Unsupported(format!(
                "{} does not support video capture",
                path
            )));
        }

        // Prefer the wire byte order, fall back to little-endian RGB565
        let mut fmt = device.format()?;
        fmt.width = u32::from(config.width);
        fmt.height = u32::from(config.height);
        fmt.fourcc = FourCC::new(&FOURCC_RGB565_BE);
        let mut actual = device.set_format(&fmt)?;
        if actual.fourcc != FourCC::new(&FOURCC_RGB565_BE) {
            fmt.fourcc = FourCC::new(&FOURCC_RGB565_LE);
            actual = device.set_format(&fmt)?;
        }

        self.swap_bytes = match actual.fourcc.repr {
            FOURCC_RGB565_BE => false,
            FOURCC_RGB565_LE => true,
            _ => {
                return Err(SensorError::Unsupported(format!(
                    "device offers {} instead of RGB565",
                    actual.fourcc
                )))
            }
        };

        let width = u16::try_from(actual.width)
            .map_err(|_| SensorError::Unsupported(format!("width {}", actual.width)))?;
        let height = u16::try_from(actual.height)
            .map_err(|_| SensorError::Unsupported(format!("height {}", actual.height)))?;
        if (width, height) != (config.width, config.height) {
            warn!(
                "Requested {}x{}, device negotiated {}x{}",
                config.width, config.height, width, height
            );
        }

        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count.max(1))?;
        // Without a poll timeout a stalled device blocks the dequeue forever.
        stream.set_timeout(config.capture_timeout());
        self.timeout = config.capture_timeout();
        info!(
            "Capture stream started with {} buffers, {}",
            config.buffer_count.max(1),
            actual.fourcc
        );

        let geometry = FrameGeometry::rgb565(width, height);
        self.stream = Some(stream);
        self.geometry = Some(geometry);
        Ok(geometry)
    }

    /// Dequeue one frame. The dequeue blocks the calling unit until the
    /// driver delivers, fails, or the capture timeout passes.
    #[instrument(skip_all)]
    async fn capture_into(&mut self, buf: &mut [u8]) -> Result<(), SensorError> {
        let expected = self
            .geometry
            .ok_or(SensorError::NotConfigured)?
            .frame_len();
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(SensorError::NotConfigured)?;

        let (data, meta) = stream.next().map_err(|e| dequeue_error(e, timeout))?;
        let used = match meta.bytesused as usize {
            0 => data.len(),
            n => n.min(data.len()),
        };

        if used < expected || buf.len() != expected {
            return Err(SensorError::ShortFrame {
                got: used.min(buf.len()),
                expected,
            });
        }

        buf.copy_from_slice(&data[..expected]);
        if self.swap_bytes {
            for px in buf.chunks_exact_mut(2) {
                px.swap(0, 1);
            }
        }
        Ok(())
    }
}

fn dequeue_error(err: io::Error, timeout: Duration) -> SensorError {
    match err.kind() {
        io::ErrorKind::TimedOut => SensorError::Timeout(timeout),
        _ => SensorError::Io(err),
    }
}
