use std::fmt;

use thiserror::Error;

/// I/O step of a burn-in run, used to name where a device failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Open,
    Size,
    Seek,
    Write,
    Read,
    Sync,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Open => "open",
            Step::Size => "size",
            Step::Seek => "seek",
            Step::Write => "write",
            Step::Read => "read",
            Step::Sync => "sync",
        };
        f.write_str(name)
    }
}

/// Phase of the burn-in test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Contiguous,
    Random,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Contiguous => f.write_str("contiguous"),
            Phase::Random => f.write_str("random"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BurnInError {
    /// Invalid startup configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Device I/O failed during a named step.
    #[error("{step} failed on {device}: {source}")]
    Device {
        step: Step,
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// The device moved fewer bytes than requested.
    #[error("short {step} on {device}: {actual} of {expected} bytes")]
    ShortTransfer {
        step: Step,
        device: String,
        expected: i64,
        actual: i64,
    },

    /// Write and read-back digests differ.
    #[error("{phase} write and read hashes do not match on {device}: {read} != {written}")]
    Integrity {
        phase: Phase,
        device: String,
        written: String,
        read: String,
    },

    /// Device has no room for a single test block.
    #[error("{device} is too small to test: {size} bytes")]
    DeviceTooSmall { device: String, size: i64 },

    /// A persisted history record could not be decoded.
    #[error("failed to decode history record {record}: {source}")]
    HistoryDecode {
        record: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A completed record could not be durably appended.
    #[error("failed to append history record for {device}: {source}")]
    HistoryAppend {
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// The history store has already been closed.
    #[error("history store is closed")]
    HistoryClosed,

    /// Rejected input to a store operation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Device discovery failed.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Propagated I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BurnInError {
    /// True when the failure indicates corrupted storage rather than an I/O fault.
    pub fn is_integrity(&self) -> bool {
        matches!(self, BurnInError::Integrity { .. })
    }
}

pub type Result<T, E = BurnInError> = std::result::Result<T, E>;
