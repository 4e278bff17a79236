//! Destructive burn-in testing for block devices.
//!
//! Devices matching a discovery pattern are written with pseudo-random data,
//! read back and verified by content hash, first as one contiguous range and
//! then as randomly placed blocks. Devices that pass are recorded in an
//! append-only history log so they are never tested twice, even across
//! restarts.

pub mod config;
pub mod device;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod hash_io;
pub mod history;
pub mod human;
pub mod io_utils;
pub mod plan;
pub mod progress;
pub mod tester;

pub use config::{RunConfig, TestConfig, BLOCK_SIZE, GB};
pub use device::{device_size, open_device, Device};
pub use discovery::{Discover, GlobDiscovery};
pub use dispatch::{run, BurnInTester, DeviceTester, RunSummary, Sampler, WorkerPool, WorkerStats};
pub use error::{BurnInError, Phase, Result, Step};
pub use history::{HistoryRecord, HistoryStore};
pub use plan::TestPlan;
pub use progress::{NoProgress, Progress};
pub use tester::{burn_in, pick_blocks, test_disk, TestResult, Throughput};
