//! Double-buffered frame storage
//!
//! The pool holds exactly two [`FrameBuffer`]s for the lifetime of the
//! stream. The Active buffer is owned by value by the pool (and therefore
//! by whoever owns the pool, the capture loop), so only the producer can
//! ever write to it. The Outbound buffer lives behind a mutex shared with
//! the transmit worker, which only ever reads it.
//!
//! [`BufferPool::swap`] exchanges the two boxed slices under that mutex, so
//! a role change can never interleave with the worker copying the
//! Outbound bytes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::capture::frame::{BufferId, FrameBuffer, FrameGeometry};
use crate::error::{PipelineError, Result};
use crate::pipeline::watchdog::MemoryProbe;

/// Role a buffer currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Active,
    Outbound,
}

/// Read side of the Outbound buffer, shared with the transmit worker.
#[derive(Debug)]
pub struct OutboundBuffer {
    inner: Mutex<FrameBuffer>,
}

impl OutboundBuffer {
    fn lock(&self) -> MutexGuard<'_, FrameBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` over the Outbound bytes while holding off any swap.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let guard = self.lock();
        f(guard.as_slice())
    }

    pub fn id(&self) -> BufferId {
        self.lock().id()
    }
}

/// Owner of the two frame buffers and their role assignment.
#[derive(Debug)]
pub struct BufferPool {
    active: FrameBuffer,
    outbound: Arc<OutboundBuffer>,
    frame_len: usize,
    swaps: u64,
}

impl BufferPool {
    /// Allocate both buffers for `geometry` without checking memory.
    pub fn new(geometry: FrameGeometry) -> Self {
        let frame_len = geometry.frame_len();
        Self {
            active: FrameBuffer::new(BufferId(0), frame_len),
            outbound: Arc::new(OutboundBuffer {
                inner: Mutex::new(FrameBuffer::new(BufferId(1), frame_len)),
            }),
            frame_len,
            swaps: 0,
        }
    }

    /// Allocate both buffers only if the probe reports room for them, the
    /// send envelope and `headroom` extra bytes.
    pub fn allocate(geometry: FrameGeometry, probe: &dyn MemoryProbe, headroom: u64) -> Result<Self> {
        let frame_len = geometry.frame_len() as u64;
        let required = 2 * frame_len + (frame_len + 4) + headroom;

        probe.reclaim();
        match probe.free_bytes() {
            Some(available) if available < required => {
                return Err(PipelineError::InsufficientMemory {
                    required,
                    available,
                });
            }
            Some(available) => {
                info!(required, available, "Allocating double buffer");
            }
            None => {
                warn!(required, "Free memory unknown, allocating double buffer anyway");
            }
        }

        Ok(Self::new(geometry))
    }

    /// Exchange the Active and Outbound roles. O(1), never copies pixels.
    ///
    /// Only the producer calls this, and only while the pipeline slot is
    /// empty, so the worker is never mid-read of the buffer being handed back.
    pub fn swap(&mut self) {
        let mut outbound = self.outbound.lock();
        std::mem::swap(&mut self.active, &mut *outbound);
        self.swaps += 1;
    }

    /// Writable view of the Active buffer.
    pub fn active_mut(&mut self) -> &mut [u8] {
        self.active.as_mut_slice()
    }

    pub fn active_id(&self) -> BufferId {
        self.active.id()
    }

    pub fn outbound(&self) -> Arc<OutboundBuffer> {
        self.outbound.clone()
    }

    pub fn role_of(&self, id: BufferId) -> Role {
        if self.active.id() == id {
            Role::Active
        } else {
            Role::Outbound
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Number of role swaps performed so far.
    pub fn swap_count(&self) -> u64 {
        self.swaps
    }
}
