//! Frame upload to the remote collector

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::envelope;
use crate::UplinkConfig;

pub const HEADER_DEVICE_ID: &str = "X-Device-ID";
pub const HEADER_SEQUENCE: &str = "X-Sequence";
pub const HEADER_MEMORY: &str = "X-Memory";

/// Per-frame metadata carried alongside the envelope.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeaders<'a> {
    pub device_id: &'a str,
    pub sequence: u64,
    pub free_memory: Option<u64>,
}

/// Status codes the collector answers for an accepted frame.
pub fn is_delivered(status: u16) -> bool {
    matches!(status, 200 | 201)
}

/// One blocking upload per call; the worker never overlaps two.
pub trait Uplink: Send + Sync + 'static {
    /// Send `payload`; returns the collector's status code.
    fn send(
        &self,
        payload: Bytes,
        headers: &FrameHeaders<'_>,
        timeout: Duration,
    ) -> impl Future<Output = Result<u16, TransportError>> + Send;
}

/// HTTP POST uplink.
#[derive(Debug, Clone)]
pub struct HttpUplink {
    client: reqwest::Client,
    url: String,
}

impl HttpUplink {
    pub fn new(config: &UplinkConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.send_timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Uplink for HttpUplink {
    async fn send(
        &self,
        payload: Bytes,
        headers: &FrameHeaders<'_>,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .header(CONTENT_TYPE, envelope::CONTENT_TYPE)
            .header(HEADER_DEVICE_ID, headers.device_id)
            .header(HEADER_SEQUENCE, headers.sequence.to_string());
        if let Some(free) = headers.free_memory {
            request = request.header(HEADER_MEMORY, free.to_string());
        }

        let response = request.body(payload).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(timeout)
            } else {
                TransportError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        debug!(sequence = headers.sequence, status, "Upload finished");
        Ok(status)
    }
}
