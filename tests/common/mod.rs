//! Simulated collaborators for pipeline tests.
//!
//! Each sim keeps its state behind an `Arc` so a test can hold a clone
//! and steer or inspect it while the pipeline owns the original.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;

use flashcam::capture::Sensor;
use flashcam::error::{LinkError, SensorError, TransportError};
use flashcam::pipeline::MemoryProbe;
use flashcam::transport::link::{Credentials, LinkInfo};
use flashcam::transport::uplink::FrameHeaders;
use flashcam::transport::{LinkDriver, Uplink};
use flashcam::{CaptureConfig, FrameGeometry};

pub const MAC: [u8; 6] = [0x28, 0xcd, 0xc1, 0x0a, 0xbc, 0xde];

/// Fills every byte of a frame with the low byte of its capture count.
#[derive(Clone, Default)]
pub struct SimSensor {
    pub latency: Arc<AtomicU64>,
    /// Sleep on the thread instead of the timer, like a blocking driver call
    pub blocking: Arc<AtomicBool>,
    pub failing: Arc<AtomicBool>,
    pub captures: Arc<AtomicU64>,
}

impl SimSensor {
    pub fn with_latency(latency: Duration) -> Self {
        let sensor = Self::default();
        sensor.latency.store(latency.as_millis() as u64, Ordering::SeqCst);
        sensor
    }

    pub fn blocking(latency: Duration) -> Self {
        let sensor = Self::with_latency(latency);
        sensor.blocking.store(true, Ordering::SeqCst);
        sensor
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Sensor for SimSensor {
    fn configure(&mut self, config: &CaptureConfig) -> Result<FrameGeometry, SensorError> {
        Ok(FrameGeometry::rgb565(config.width, config.height))
    }

    async fn capture_into(&mut self, buf: &mut [u8]) -> Result<(), SensorError> {
        let latency = self.latency.load(Ordering::SeqCst);
        if latency > 0 {
            let latency = Duration::from_millis(latency);
            if self.blocking.load(Ordering::SeqCst) {
                std::thread::sleep(latency);
            } else {
                tokio::time::sleep(latency).await;
            }
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SensorError::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        let n = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        buf.fill(n as u8);
        Ok(())
    }
}

/// Link whose health and join outcome are flipped by the test.
#[derive(Clone, Default)]
pub struct SimLink {
    pub connected: Arc<AtomicBool>,
    pub refusing: Arc<AtomicBool>,
    pub joins: Arc<AtomicU32>,
    /// Hardware address reported by later joins; `MAC` until set
    pub hardware_address: Arc<Mutex<Option<[u8; 6]>>>,
}

impl SimLink {
    pub fn drop_link(&self, refuse_rejoin: bool) {
        self.refusing.store(refuse_rejoin, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn allow_rejoin(&self) {
        self.refusing.store(false, Ordering::SeqCst);
    }

    pub fn set_hardware_address(&self, mac: [u8; 6]) {
        *self.hardware_address.lock().unwrap() = Some(mac);
    }

    pub fn joins(&self) -> u32 {
        self.joins.load(Ordering::SeqCst)
    }
}

impl LinkDriver for SimLink {
    async fn join(&self, _: &Credentials, _: Duration) -> Result<LinkInfo, LinkError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(LinkError::Io(std::io::ErrorKind::ConnectionRefused.into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        let hardware_address = self.hardware_address.lock().unwrap().unwrap_or(MAC);
        Ok(LinkInfo {
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 77)),
            hardware_address,
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// One recorded upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub sequence: u64,
    pub device_id: String,
    pub payload: Bytes,
}

struct UplinkState {
    latency: Duration,
    status: AtomicU32,
    open: watch::Sender<bool>,
    uploads: Mutex<Vec<Upload>>,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

/// Collector stand-in with a fixed latency and an optional gate.
#[derive(Clone)]
pub struct SimUplink {
    state: Arc<UplinkState>,
}

impl SimUplink {
    pub fn new(latency: Duration) -> Self {
        let (open, _) = watch::channel(true);
        Self {
            state: Arc::new(UplinkState {
                latency,
                status: AtomicU32::new(200),
                open,
                uploads: Mutex::new(Vec::new()),
                in_flight: AtomicU32::new(0),
                max_in_flight: AtomicU32::new(0),
            }),
        }
    }

    pub fn set_status(&self, status: u16) {
        self.state.status.store(u32::from(status), Ordering::SeqCst);
    }

    /// While closed, every upload waits until the gate reopens.
    pub fn set_open(&self, open: bool) {
        self.state.open.send_replace(open);
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.uploads().iter().map(|u| u.sequence).collect()
    }

    pub fn max_in_flight(&self) -> u32 {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Uplink for SimUplink {
    async fn send(
        &self,
        payload: Bytes,
        headers: &FrameHeaders<'_>,
        _timeout: Duration,
    ) -> Result<u16, TransportError> {
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.state.uploads.lock().unwrap().push(Upload {
            sequence: headers.sequence,
            device_id: headers.device_id.to_string(),
            payload,
        });

        let mut gate = self.state.open.subscribe();
        loop {
            let open = *gate.borrow_and_update();
            if open || gate.changed().await.is_err() {
                break;
            }
        }
        tokio::time::sleep(self.state.latency).await;

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.state.status.load(Ordering::SeqCst) as u16)
    }
}

/// Free-memory reading set by the test.
#[derive(Default)]
pub struct SimMemory {
    pub free: AtomicU64,
    pub reclaims: AtomicU64,
}

impl SimMemory {
    pub fn new(free: u64) -> Arc<Self> {
        Arc::new(Self {
            free: AtomicU64::new(free),
            reclaims: AtomicU64::new(0),
        })
    }

    pub fn set_free(&self, free: u64) {
        self.free.store(free, Ordering::SeqCst);
    }

    pub fn reclaims(&self) -> u64 {
        self.reclaims.load(Ordering::SeqCst)
    }
}

impl MemoryProbe for SimMemory {
    fn free_bytes(&self) -> Option<u64> {
        Some(self.free.load(Ordering::SeqCst))
    }

    fn reclaim(&self) {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
    }
}

/// Flip `shutdown` after `after` of (possibly paused) time.
pub fn shutdown_after(after: Duration) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = tx.send(true);
    });
    rx
}
