use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const SNAPSHOT_BIT: u8 = 0b01;
const STOP_BIT: u8 = 0b10;

/// A request the driver can make of a running solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverAction {
    Snapshot,
    Stop,
}

impl SolverAction {
    fn bit(self) -> u8 {
        match self {
            SolverAction::Snapshot => SNAPSHOT_BIT,
            SolverAction::Stop => STOP_BIT,
        }
    }
}

/// Requests raised since the last poll. Both may be set at once, in which
/// case the snapshot is written before the solver stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingActions {
    pub snapshot: bool,
    pub stop: bool,
}

impl PendingActions {
    fn from_bits(bits: u8) -> Self {
        Self {
            snapshot: bits & SNAPSHOT_BIT != 0,
            stop: bits & STOP_BIT != 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.snapshot && !self.stop
    }
}

/// Shared, thread-safe channel for snapshot and stop requests.
///
/// Clones share the same flags, so a signal handler or a UI thread can keep one
/// clone while the solver polls another. Requests accumulate until consumed by
/// [`ActionSignal::take`]; a snapshot request never masks a pending stop.
#[derive(Debug, Clone, Default)]
pub struct ActionSignal {
    pending: Arc<AtomicU8>,
}

impl ActionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, action: SolverAction) {
        self.pending.fetch_or(action.bit(), Ordering::SeqCst);
    }

    /// Returns every pending request and clears them.
    pub fn take(&self) -> PendingActions {
        PendingActions::from_bits(self.pending.swap(0, Ordering::SeqCst))
    }

    pub fn peek(&self) -> PendingActions {
        PendingActions::from_bits(self.pending.load(Ordering::SeqCst))
    }
}
