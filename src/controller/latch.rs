//! One-shot guard for the startup load

use std::sync::atomic::{AtomicU8, Ordering};

/// Progress of the guarded routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    NotStarted,
    Loading,
    Done,
}

impl LatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LatchState::NotStarted,
            1 => LatchState::Loading,
            _ => LatchState::Done,
        }
    }
}

/// Moves only `NotStarted -> Loading -> Done`
#[derive(Debug, Default)]
pub struct LoadLatch(AtomicU8);

impl LoadLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the latch; `false` if someone already did
    pub fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mark the claimed run as finished
    pub fn finish(&self) {
        let _ = self
            .0
            .compare_exchange(1, 2, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn state(&self) -> LatchState {
        LatchState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_done(&self) -> bool {
        self.state() == LatchState::Done
    }
}
