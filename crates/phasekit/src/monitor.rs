//! Progress reporting and cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callback for engine runs
///
/// Implement this trait to receive progress updates. Cancellation is
/// cooperative: the engine polls [`ProgressMonitor::is_canceled`] between
/// operands and between phases.
pub trait ProgressMonitor: Send + Sync {
    /// Called once with the sum of all phase weights
    fn begin(&self, _total_work: u64) {}

    /// Called when a phase starts, with its progress weight
    fn phase_started(&self, _phase_id: &str, _weight: u64) {}

    /// Called before each operand is processed
    fn sub_task(&self, _description: &str) {}

    /// Called with completed work units
    fn worked(&self, _work: u64) {}

    /// Called when the run finishes, successfully or not
    fn done(&self) {}

    fn is_canceled(&self) -> bool {
        false
    }
}

/// No-op monitor
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl ProgressMonitor for NullMonitor {}

/// Monitor that only carries a cancellation flag
///
/// Share it by reference with the thread that should be able to cancel.
#[derive(Debug, Default)]
pub struct CancelFlag {
    canceled: AtomicBool,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}

impl ProgressMonitor for CancelFlag {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}
