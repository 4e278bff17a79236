//! Sizing for a single device test.

use crate::config::BLOCK_SIZE;

/// Byte volumes for one burn-in run, derived from the device size and the
/// configured write budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPlan {
    /// Raw device size.
    pub device_size: i64,
    /// Largest multiple of [`BLOCK_SIZE`] not exceeding `device_size`.
    pub aligned_size: i64,
    /// Bytes written (and read) by each phase.
    pub phase_bytes: i64,
}

impl TestPlan {
    /// Half the budget goes to each phase, capped at the aligned size.
    pub fn new(device_size: i64, write_budget: i64) -> Self {
        let aligned_size = device_size - device_size % BLOCK_SIZE;
        let half = (write_budget / 2).max(0);
        let phase_bytes = (half - half % BLOCK_SIZE).min(aligned_size);
        Self {
            device_size,
            aligned_size,
            phase_bytes,
        }
    }

    /// Number of blocks available for random placement.
    pub fn total_blocks(&self) -> i64 {
        self.aligned_size / BLOCK_SIZE
    }

    /// Number of distinct blocks written by the random phase.
    pub fn random_blocks(&self) -> i64 {
        self.phase_bytes / BLOCK_SIZE
    }

    /// Bytes written across both phases (equal to bytes read).
    pub fn total_bytes(&self) -> i64 {
        self.phase_bytes * 2
    }
}
