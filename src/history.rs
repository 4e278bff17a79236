//! Durable record of tested devices plus the in-memory set of devices
//! currently under test.
//!
//! The log is a stream of pretty-printed JSON records appended in completion
//! order. It is replayed in full on [`HistoryStore::load`]; a record that fails
//! to decode aborts the load, since there is then no safe way to know which
//! devices were already tested.
//!
//! All operations take one lock covering both the active set and the log, so
//! a `check` always observes every `mark_active`, `release` and `add` that
//! completed before it.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::{debug, warn};

use crate::error::{BurnInError, Result};
use crate::io_utils::io_error;
use crate::tester::TestResult;

/// One completed device test. Never modified once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub path: String,
    pub ts: SystemTime,
    pub results: TestResult,
}

struct Inner {
    file: Option<File>,
    records: Vec<HistoryRecord>,
    tested: HashSet<String>,
    active: HashSet<String>,
}

pub struct HistoryStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl HistoryStore {
    /// Open or create the log at `path` and replay every record in it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut opts = OpenOptions::new();
        opts.read(true).append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o640);
        }
        let file = opts
            .open(path)
            .map_err(|e| io_error("opening history", path, e))?;

        let mut records = Vec::new();
        let stream = serde_json::Deserializer::from_reader(BufReader::new(&file))
            .into_iter::<HistoryRecord>();
        for (idx, item) in stream.enumerate() {
            let record = item.map_err(|source| BurnInError::HistoryDecode {
                record: idx,
                source,
            })?;
            records.push(record);
        }
        let tested = records.iter().map(|r| r.path.clone()).collect();
        debug!(path = %path.display(), records = records.len(), "history replayed");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner {
                file: Some(file),
                records,
                tested,
                active: HashSet::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flag `path` as dispatched. Not persisted.
    pub fn mark_active(&self, path: &str) {
        self.inner.lock().active.insert(path.to_string());
    }

    /// Clear the active flag without recording a result, making `path`
    /// eligible for dispatch again.
    pub fn release(&self, path: &str) {
        self.inner.lock().active.remove(path);
    }

    /// True when `path` is under test or has a history record.
    pub fn check(&self, path: &str) -> bool {
        let inner = self.inner.lock();
        inner.active.contains(path) || inner.tested.contains(path)
    }

    /// Record a completed test. The record is on stable storage before this
    /// returns.
    pub fn add(&self, path: &str, ts: SystemTime, results: TestResult) -> Result<()> {
        if path.is_empty() {
            return Err(BurnInError::Validation("path required".into()));
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.active.remove(path);

        let file = inner.file.as_mut().ok_or(BurnInError::HistoryClosed)?;
        let record = HistoryRecord {
            path: path.to_string(),
            ts,
            results,
        };
        append_record(file, &record).map_err(|source| BurnInError::HistoryAppend {
            device: path.to_string(),
            source,
        })?;
        inner.tested.insert(record.path.clone());
        inner.records.push(record);
        Ok(())
    }

    /// Snapshot of all records in completion order.
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.inner.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush and release the log. Later `add` calls fail with
    /// [`BurnInError::HistoryClosed`]; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let file = self.inner.lock().file.take();
        if let Some(mut file) = file {
            file.flush()
                .and_then(|_| file.sync_all())
                .map_err(|e| io_error("closing history", &self.path, e))?;
        }
        Ok(())
    }
}

/// Append one record and sync it. A failed append truncates the log back to
/// its previous length so later records never land after a torn one.
fn append_record(file: &mut File, record: &HistoryRecord) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
    record.serialize(&mut ser)?;
    buf.push(b'\n');

    let start = file.metadata()?.len();
    if let Err(e) = file.write_all(&buf).and_then(|_| file.sync_data()) {
        if let Err(undo) = file.set_len(start).and_then(|_| file.sync_data()) {
            warn!(error = %undo, len = start, "could not roll back partial history record");
        }
        return Err(e);
    }
    Ok(())
}
