//! Error types for the capture and transmission pipeline.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by a frame sensor.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The capture did not finish within the configured bound.
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),

    /// The sensor delivered fewer bytes than one frame.
    #[error("short frame: got {got} bytes, expected {expected}")]
    ShortFrame { got: usize, expected: usize },

    /// The device refused the requested format or geometry.
    #[error("unsupported sensor format: {0}")]
    Unsupported(String),

    /// The sensor has not been configured yet.
    #[error("sensor not configured")]
    NotConfigured,

    #[error("sensor I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the wireless link collaborator.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A single join attempt did not complete within its timeout.
    #[error("link join timed out after {0:?}")]
    JoinTimeout(Duration),

    /// Every join attempt of a connect cycle failed.
    #[error("link down after {attempts} join attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single frame upload.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Receiver-side envelope validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("payload too short: {0} bytes")]
    TooShort(usize),

    #[error("pixel length mismatch: got {got} bytes, expected {expected}")]
    LengthMismatch { got: usize, expected: usize },
}

/// Errors that end a pipeline run or a connect cycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Not enough free memory to allocate the frame buffers.
    #[error("insufficient memory for double buffer: need {required} bytes, {available} available")]
    InsufficientMemory { required: u64, available: u64 },

    #[error("sensor initialization failed: {0}")]
    Sensor(#[from] SensorError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
