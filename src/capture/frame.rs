use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of one of the two frame buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u8);

/// Fixed-length pixel storage. Never resized after allocation.
#[derive(Debug)]
pub struct FrameBuffer {
    id: BufferId,
    data: Box<[u8]>,
}

impl FrameBuffer {
    pub fn new(id: BufferId, len: usize) -> Self {
        Self {
            id,
            data: vec![0u8; len].into_boxed_slice(),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Metadata for one successfully captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    /// Monotonic, starts at 1
    pub sequence: u64,
    pub width: u16,
    pub height: u16,
    pub capture_time: Duration,
}

/// Frame geometry negotiated with the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
}

impl FrameGeometry {
    pub fn rgb565(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgb565,
        }
    }

    /// Bytes needed to hold one frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 16-bit packed RGB, the only format the collector accepts
    Rgb565,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_len_is_two_bytes_per_pixel() {
        assert_eq!(FrameGeometry::rgb565(80, 60).frame_len(), 80 * 60 * 2);
        assert_eq!(FrameGeometry::rgb565(160, 120).frame_len(), 38_400);
    }

    #[test]
    fn buffer_is_zeroed_and_fixed() {
        let buf = FrameBuffer::new(BufferId(1), 16);
        assert_eq!(buf.as_slice().len(), 16);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
        assert_eq!(buf.id(), BufferId(1));
    }
}
