//! Consumer side of the pipeline
//!
//! Each cycle the worker looks at the pipeline slot. A ready frame is
//! claimed (marking the slot busy), its Outbound bytes are copied into the
//! envelope under the buffer lock, and the envelope is uploaded with a
//! bounded timeout. Whatever the result, the slot is emptied afterwards;
//! failed frames are counted and discarded, never retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::capture::frame::FrameGeometry;
use crate::pipeline::buffers::OutboundBuffer;
use crate::pipeline::signal::{PipelineSignal, SlotState};
use crate::pipeline::stats::Stats;
use crate::pipeline::watchdog::MemoryProbe;
use crate::transport::envelope::TransferEnvelope;
use crate::transport::link::DeviceInfo;
use crate::transport::uplink::{is_delivered, FrameHeaders, Uplink};

/// Result of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered { sequence: u64, status: u16 },
    Failed { sequence: u64 },
}

impl SendOutcome {
    pub fn sequence(&self) -> u64 {
        match *self {
            SendOutcome::Delivered { sequence, .. } | SendOutcome::Failed { sequence } => sequence,
        }
    }
}

/// Shared state the worker reads from.
pub struct WorkerContext {
    pub outbound: Arc<OutboundBuffer>,
    pub signal: Arc<PipelineSignal>,
    pub stats: Arc<Stats>,
    pub memory: Arc<dyn MemoryProbe>,
    pub device: Arc<DeviceInfo>,
    pub geometry: FrameGeometry,
}

pub struct TransmitWorker<U> {
    uplink: Arc<U>,
    ctx: WorkerContext,
    envelope: TransferEnvelope,
    send_timeout: Duration,
    poll_interval: Duration,
}

impl<U: Uplink> TransmitWorker<U> {
    pub fn new(uplink: Arc<U>, ctx: WorkerContext, send_timeout: Duration, poll_interval: Duration) -> Self {
        let envelope = TransferEnvelope::new(ctx.geometry.frame_len());
        Self {
            uplink,
            ctx,
            envelope,
            send_timeout,
            poll_interval,
        }
    }

    /// Send the ready frame, if any. Returns `None` when the slot had nothing to claim.
    #[instrument(skip(self), level = "debug")]
    pub async fn step(&mut self) -> Option<SendOutcome> {
        let sequence = self.ctx.signal.claim()?;

        let FrameGeometry { width, height, .. } = self.ctx.geometry;
        let envelope = &mut self.envelope;
        let payload = self
            .ctx
            .outbound
            .read(|pixels| envelope.seal(width, height, pixels));

        let headers = FrameHeaders {
            device_id: &self.ctx.device.device_id,
            sequence,
            free_memory: self.ctx.memory.free_bytes(),
        };

        let start = Instant::now();
        let result = tokio::time::timeout(
            self.send_timeout,
            self.uplink.send(payload, &headers, self.send_timeout),
        )
        .await;
        let took = start.elapsed();

        let outcome = match result {
            Ok(Ok(status)) if is_delivered(status) => {
                self.ctx.stats.record_send(took);
                SendOutcome::Delivered { sequence, status }
            }
            Ok(Ok(status)) => {
                warn!(sequence, status, "Collector rejected frame");
                self.ctx.stats.record_network_error(took);
                SendOutcome::Failed { sequence }
            }
            Ok(Err(e)) => {
                warn!(sequence, "Send failed: {}", e);
                self.ctx.stats.record_network_error(took);
                SendOutcome::Failed { sequence }
            }
            Err(_) => {
                warn!(sequence, "Send timed out after {:?}", self.send_timeout);
                self.ctx.stats.record_network_error(took);
                SendOutcome::Failed { sequence }
            }
        };

        // Counters first, so a reader that sees the slot empty also sees the outcome.
        self.ctx.signal.complete();
        Some(outcome)
    }

    /// Poll the slot until `stop` flips.
    ///
    /// A send in flight when `stop` flips is finished, and a frame still
    /// waiting in the slot is sent before returning.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!("Transmit worker started");

        loop {
            if *stop.borrow() {
                break;
            }
            if self.step().await.is_some() {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let SlotState::Ready(sequence) = self.ctx.signal.state() {
            debug!(sequence, "Draining pending frame before exit");
            self.step().await;
        }

        info!("Transmit worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::pipeline::buffers::BufferPool;
    use crate::transport::envelope::decode_envelope;
    use bytes::Bytes;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    struct NoMemory;

    impl MemoryProbe for NoMemory {
        fn free_bytes(&self) -> Option<u64> {
            Some(100_000)
        }

        fn reclaim(&self) {}
    }

    /// Answers every upload with a fixed status and keeps the payloads.
    struct FixedStatus {
        status: Result<u16, ()>,
        payloads: Mutex<Vec<(u64, Option<u64>, Bytes)>>,
    }

    impl FixedStatus {
        fn new(status: Result<u16, ()>) -> Self {
            Self {
                status,
                payloads: Mutex::new(Vec::new()),
            }
        }
    }

    impl Uplink for FixedStatus {
        async fn send(
            &self,
            payload: Bytes,
            headers: &FrameHeaders<'_>,
            _timeout: Duration,
        ) -> Result<u16, TransportError> {
            self.payloads
                .lock()
                .unwrap()
                .push((headers.sequence, headers.free_memory, payload));
            self.status
                .map_err(|_| TransportError::Timeout(Duration::from_millis(1)))
        }
    }

    fn worker(uplink: Arc<FixedStatus>) -> (TransmitWorker<FixedStatus>, BufferPool, Arc<PipelineSignal>, Arc<Stats>) {
        let geometry = FrameGeometry::rgb565(4, 2);
        let pool = BufferPool::new(geometry);
        let signal = Arc::new(PipelineSignal::new());
        let stats = Arc::new(Stats::new());
        let ctx = WorkerContext {
            outbound: pool.outbound(),
            signal: signal.clone(),
            stats: stats.clone(),
            memory: Arc::new(NoMemory),
            device: Arc::new(DeviceInfo {
                device_id: "PicoW_0abcde".into(),
                address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                hardware_address: "28cdc10abcde".into(),
            }),
            geometry,
        };
        let worker = TransmitWorker::new(uplink, ctx, Duration::from_secs(1), Duration::from_millis(2));
        (worker, pool, signal, stats)
    }

    #[tokio::test]
    async fn test_empty_slot_sends_nothing() {
        let uplink = Arc::new(FixedStatus::new(Ok(200)));
        let (mut worker, _pool, _signal, _stats) = worker(uplink.clone());
        assert_eq!(worker.step().await, None);
        assert!(uplink.payloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivered_frame_carries_outbound_bytes() {
        let uplink = Arc::new(FixedStatus::new(Ok(201)));
        let (mut worker, mut pool, signal, stats) = worker(uplink.clone());

        pool.active_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
        pool.swap();
        signal.publish(1);

        let outcome = worker.step().await;
        assert_eq!(outcome, Some(SendOutcome::Delivered { sequence: 1, status: 201 }));
        assert_eq!(signal.state(), SlotState::Empty);
        assert_eq!(stats.snapshot().successful_sends, 1);

        let payloads = uplink.payloads.lock().unwrap();
        let (sequence, free, payload) = &payloads[0];
        assert_eq!(*sequence, 1);
        assert_eq!(*free, Some(100_000));
        let decoded = decode_envelope(payload).unwrap();
        assert_eq!((decoded.width, decoded.height), (4, 2));
        assert_eq!(decoded.pixels, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
    }

    #[tokio::test]
    async fn test_rejected_and_failed_frames_are_discarded() {
        for status in [Ok(500), Err(())] {
            let uplink = Arc::new(FixedStatus::new(status));
            let (mut worker, _pool, signal, stats) = worker(uplink.clone());

            signal.publish(4);
            assert_eq!(worker.step().await, Some(SendOutcome::Failed { sequence: 4 }));
            assert_eq!(signal.state(), SlotState::Empty);
            // Not retried.
            assert_eq!(worker.step().await, None);

            let snap = stats.snapshot();
            assert_eq!(snap.network_errors, 1);
            assert_eq!(snap.successful_sends, 0);
            assert_eq!(uplink.payloads.lock().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_run_drains_pending_frame_on_stop() {
        let uplink = Arc::new(FixedStatus::new(Ok(200)));
        let (worker, _pool, signal, stats) = worker(uplink.clone());

        let (stop_tx, stop_rx) = watch::channel(true);
        signal.publish(9);
        worker.run(stop_rx).await;
        drop(stop_tx);

        assert_eq!(signal.state(), SlotState::Empty);
        assert_eq!(stats.snapshot().successful_sends, 1);
        assert_eq!(uplink.payloads.lock().unwrap()[0].0, 9);
    }
}
