pub mod frame;
pub mod sensor;
pub mod v4l2;

pub use frame::{FrameBuffer, FrameDescriptor, PixelFormat};
pub use sensor::{PatternSensor, Sensor};
pub use v4l2::V4l2Sensor;
