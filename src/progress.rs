//! Byte-level progress reporting from the burn-in engine.

use indicatif::ProgressBar;

use crate::error::Phase;

/// Observer notified as the engine moves bytes.
pub trait Progress {
    /// A new sub-phase begins; `total` bytes will be moved.
    fn begin(&self, phase: Phase, action: &'static str, total: u64);
    /// `bytes` more were moved in the current sub-phase.
    fn advance(&self, bytes: u64);
}

/// Discards all progress.
pub struct NoProgress;

impl Progress for NoProgress {
    fn begin(&self, _phase: Phase, _action: &'static str, _total: u64) {}
    fn advance(&self, _bytes: u64) {}
}

impl Progress for ProgressBar {
    fn begin(&self, phase: Phase, action: &'static str, total: u64) {
        self.set_length(total);
        self.set_position(0);
        self.set_message(format!("{phase} {action}"));
    }

    fn advance(&self, bytes: u64) {
        self.inc(bytes);
    }
}
