//! Single-slot producer/consumer handoff
//!
//! The whole slot is one atomic word, so "frame ready" and "send in
//! progress" can never be observed half-updated:
//!
//! - `0`: empty, the producer may capture
//! - `seq`: frame `seq` is ready, unclaimed
//! - `seq | IN_FLIGHT`: the consumer claimed frame `seq` and is sending it
//!
//! Sequence numbers start at 1, so `0` never names a frame.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

const EMPTY: u64 = 0;
const IN_FLIGHT: u64 = 1 << 63;

/// Observable slot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Ready(u64),
    InFlight(u64),
}

#[derive(Debug, Default)]
pub struct PipelineSignal {
    slot: CachePadded<AtomicU64>,
}

impl PipelineSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer: publish frame `sequence`.
    ///
    /// Returns `false` without touching the slot if it still holds a frame;
    /// the pending frame is never overwritten.
    pub fn publish(&self, sequence: u64) -> bool {
        debug_assert!(sequence != EMPTY && sequence & IN_FLIGHT == 0);
        self.slot
            .compare_exchange(EMPTY, sequence, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Consumer: claim the ready frame and mark it in flight.
    pub fn claim(&self) -> Option<u64> {
        let current = self.slot.load(Ordering::Acquire);
        if current == EMPTY || current & IN_FLIGHT != 0 {
            return None;
        }
        self.slot
            .compare_exchange(current, current | IN_FLIGHT, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| current)
    }

    /// Consumer: finish the claimed frame, clearing busy and ready together.
    pub fn complete(&self) {
        self.slot.store(EMPTY, Ordering::Release);
    }

    /// True while a frame is ready or in flight.
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.slot.load(Ordering::Acquire) != EMPTY
    }

    pub fn state(&self) -> SlotState {
        match self.slot.load(Ordering::Acquire) {
            EMPTY => SlotState::Empty,
            v if v & IN_FLIGHT != 0 => SlotState::InFlight(v & !IN_FLIGHT),
            v => SlotState::Ready(v),
        }
    }
}
