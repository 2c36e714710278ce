//! Sensor driver contract and the synthetic test source

use std::future::Future;

use crate::capture::frame::FrameGeometry;
use crate::error::SensorError;
use crate::CaptureConfig;

/// A frame source that fills caller-owned buffers.
///
/// The capture loop owns the sensor and awaits it on the main unit, so
/// the returned future does not need to be `Send`.
pub trait Sensor {
    /// Negotiate the output format; returns the geometry actually in effect.
    fn configure(&mut self, config: &CaptureConfig) -> Result<FrameGeometry, SensorError>;

    /// Fill `buf` with one frame. `buf.len()` is the configured frame length.
    fn capture_into(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<(), SensorError>>;
}

/// Synthetic RGB565 colour bars with a moving white stripe.
#[derive(Debug, Default)]
pub struct PatternSensor {
    geometry: Option<FrameGeometry>,
    frame: u64,
}

const BARS: [u16; 8] = [
    0xFFFF, // white
    0xFFE0, // yellow
    0x07FF, // cyan
    0x07E0, // green
    0xF81F, // magenta
    0xF800, // red
    0x001F, // blue
    0x0000, // black
];

impl PatternSensor {
    pub fn new() -> Self {
        Self::default()
    }

    fn render(&self, geometry: FrameGeometry, buf: &mut [u8]) {
        let width = geometry.width as usize;
        let bar_width = (width / BARS.len()).max(1);
        let stripe = (self.frame as usize) % geometry.height.max(1) as usize;

        for (i, px) in buf.chunks_exact_mut(2).enumerate() {
            let (x, y) = (i % width, i / width);
            let color = if y == stripe {
                0xFFFF
            } else {
                BARS[(x / bar_width).min(BARS.len() - 1)]
            };
            px.copy_from_slice(&color.to_be_bytes());
        }
    }
}

impl Sensor for PatternSensor {
    fn configure(&mut self, config: &CaptureConfig) -> Result<FrameGeometry, SensorError> {
        if config.width == 0 || config.height == 0 {
            return Err(SensorError::Unsupported(format!(
                "{}x{}",
                config.width, config.height
            )));
        }
        let geometry = FrameGeometry::rgb565(config.width, config.height);
        self.geometry = Some(geometry);
        Ok(geometry)
    }

    async fn capture_into(&mut self, buf: &mut [u8]) -> Result<(), SensorError> {
        let geometry = self.geometry.ok_or(SensorError::NotConfigured)?;
        let expected = geometry.frame_len();
        if buf.len() != expected {
            return Err(SensorError::ShortFrame {
                got: buf.len(),
                expected,
            });
        }
        self.render(geometry, buf);
        self.frame += 1;
        Ok(())
    }
}
