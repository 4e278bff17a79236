//! Discovery sampling and the worker pool that runs burn-in tests.
//!
//! The sampler enumerates devices, marks unknown ones active in the
//! [`HistoryStore`] and pushes them onto a bounded queue; a fixed pool of
//! worker threads drains the queue. A full queue blocks the sampler rather
//! than dropping paths. Shutdown closes the queue and waits for every queued
//! and in-flight test to finish; running tests are never interrupted.

use std::ops::AddAssign;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::config::{RunConfig, TestConfig};
use crate::discovery::Discover;
use crate::error::{BurnInError, Result};
use crate::history::HistoryStore;
use crate::progress::NoProgress;
use crate::tester::{test_disk, TestResult};

/// Runs one complete test against a device path.
pub trait DeviceTester: Send + Sync {
    fn test(&self, path: &str) -> Result<TestResult>;
}

/// Tester backed by the real burn-in engine, optionally drawing one progress
/// bar per in-flight device.
pub struct BurnInTester {
    config: TestConfig,
    bars: Option<MultiProgress>,
}

impl BurnInTester {
    pub fn new(config: TestConfig) -> Self {
        Self { config, bars: None }
    }

    pub fn with_progress(mut self, bars: MultiProgress) -> Self {
        self.bars = Some(bars);
        self
    }
}

impl DeviceTester for BurnInTester {
    fn test(&self, path: &str) -> Result<TestResult> {
        let Some(multi) = &self.bars else {
            return test_disk(Path::new(path), &self.config, &NoProgress);
        };
        let style = ProgressStyle::with_template(
            "{prefix} {msg:>16} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        let bar = multi.add(ProgressBar::new(0).with_style(style));
        bar.set_prefix(path.to_string());
        let result = test_disk(Path::new(path), &self.config, &bar);
        bar.finish_and_clear();
        multi.remove(&bar);
        result
    }
}

/// Per-worker outcome counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tests that passed and were recorded.
    pub passed: usize,
    /// Tests aborted by an I/O failure.
    pub failed: usize,
    /// Tests that detected corrupted data.
    pub corrupted: usize,
    /// Tests that passed but could not be recorded.
    pub unrecorded: usize,
}

impl AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.corrupted += other.corrupted;
        self.unrecorded += other.unrecorded;
    }
}

/// Feeds newly seen devices into the dispatch queue.
pub struct Sampler<D> {
    discovery: D,
    store: Arc<HistoryStore>,
    tx: Sender<String>,
}

impl<D: Discover> Sampler<D> {
    pub fn new(discovery: D, store: Arc<HistoryStore>, tx: Sender<String>) -> Self {
        Self {
            discovery,
            store,
            tx,
        }
    }

    /// Enumerate once and queue every unknown device. Returns how many were
    /// queued. Blocks while the queue is full.
    pub fn sample(&self) -> Result<usize> {
        let mut queued = 0;
        for path in self.discovery.discover()? {
            if self.store.check(&path) {
                continue;
            }
            self.store.mark_active(&path);
            info!(device = %path, "queued for burn-in");
            if let Err(err) = self.tx.send(path) {
                self.store.release(&err.0);
                return Err(BurnInError::Discovery("dispatch queue closed".into()));
            }
            queued += 1;
        }
        Ok(queued)
    }
}

/// Fixed set of worker threads draining the dispatch queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        rx: Receiver<String>,
        store: Arc<HistoryStore>,
        tester: Arc<dyn DeviceTester>,
    ) -> Result<Self> {
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let rx = rx.clone();
            let store = Arc::clone(&store);
            let tester = Arc::clone(&tester);
            let handle = thread::Builder::new()
                .name(format!("burnin-worker-{id}"))
                .spawn(move || worker(id, rx, &store, tester.as_ref()))?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    /// Wait for every worker to exit. Workers exit once the queue is closed
    /// and drained.
    pub fn join(self) -> WorkerStats {
        let mut total = WorkerStats::default();
        for handle in self.handles {
            match handle.join() {
                Ok(stats) => total += stats,
                Err(_) => error!("worker thread panicked"),
            }
        }
        total
    }
}

fn worker(
    id: usize,
    rx: Receiver<String>,
    store: &HistoryStore,
    tester: &dyn DeviceTester,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    for path in rx.iter() {
        info!(worker = id, device = %path, "starting burn-in");
        match tester.test(&path) {
            Ok(result) => {
                let elapsed = result.elapsed;
                let written = result.written;
                match store.add(&path, SystemTime::now(), result) {
                    Ok(()) => {
                        stats.passed += 1;
                        info!(device = %path, ?elapsed, written, "burn-in passed");
                    }
                    Err(err) => {
                        stats.unrecorded += 1;
                        store.release(&path);
                        error!(device = %path, error = %err, "failed to record result");
                    }
                }
            }
            Err(err) => {
                store.release(&path);
                if err.is_integrity() {
                    stats.corrupted += 1;
                    error!(device = %path, error = %err, "data corruption detected");
                } else {
                    stats.failed += 1;
                    warn!(device = %path, error = %err, "burn-in failed");
                }
            }
        }
    }
    stats
}

/// Totals for one `run`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Sampling passes performed.
    pub samples: usize,
    /// Devices handed to the queue.
    pub queued: usize,
    pub workers: WorkerStats,
}

/// Sample immediately, then every `config.interval` until `shutdown` fires
/// (or its sender is dropped), then drain the queue and join the workers.
///
/// A discovery failure stops sampling and is returned after the drain.
pub fn run<D: Discover>(
    config: &RunConfig,
    discovery: D,
    store: Arc<HistoryStore>,
    tester: Arc<dyn DeviceTester>,
    shutdown: &Receiver<()>,
) -> Result<RunSummary> {
    let (tx, rx) = bounded(config.queue_depth);
    let pool = WorkerPool::spawn(config.workers, rx, Arc::clone(&store), tester)?;
    info!(workers = config.workers, "worker pool started");

    let sampler = Sampler::new(discovery, store, tx);
    let mut summary = RunSummary::default();
    let outcome = sample_until_shutdown(&sampler, config, shutdown, &mut summary);
    drop(sampler);

    info!("draining dispatch queue");
    summary.workers = pool.join();
    outcome?;
    Ok(summary)
}

fn sample_until_shutdown<D: Discover>(
    sampler: &Sampler<D>,
    config: &RunConfig,
    shutdown: &Receiver<()>,
    summary: &mut RunSummary,
) -> Result<()> {
    summary.queued += sampler.sample()?;
    summary.samples += 1;
    let ticker = tick(config.interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                summary.queued += sampler.sample()?;
                summary.samples += 1;
            }
            recv(shutdown) -> _ => {
                info!("shutdown requested");
                return Ok(());
            }
        }
    }
}
