use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BurnInError, Result};

/// Fixed I/O block size in bytes (1 MiB).
pub const BLOCK_SIZE: i64 = 1024 * 1024;
/// One gigabyte in bytes (1 GiB).
pub const GB: i64 = 1024 * 1024 * 1024;

/// Sizing and randomness parameters for a single device test.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Total bytes to write per device, split evenly between the
    /// contiguous and random phases.
    pub write_budget: i64,
    /// Fixed RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl TestConfig {
    /// Budget expressed in gigabytes, as taken on the command line.
    pub fn from_gigabytes(gb: i64) -> Result<Self> {
        if gb <= 0 {
            return Err(BurnInError::Config(format!(
                "write size must be positive, got {gb}"
            )));
        }
        let write_budget = gb
            .checked_mul(GB)
            .ok_or_else(|| BurnInError::Config(format!("write size {gb} GB is too large")))?;
        Ok(Self {
            write_budget,
            seed: None,
        })
    }

    /// Budget in raw bytes; must be a positive multiple of two blocks so each
    /// phase stays block aligned.
    pub fn from_bytes(write_budget: i64) -> Result<Self> {
        if write_budget <= 0 || write_budget % (2 * BLOCK_SIZE) != 0 {
            return Err(BurnInError::Config(format!(
                "write budget {write_budget} must be a positive multiple of {}",
                2 * BLOCK_SIZE
            )));
        }
        Ok(Self {
            write_budget,
            seed: None,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            write_budget: GB,
            seed: None,
        }
    }
}

/// Orchestrator settings for a `run` invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// History log location.
    pub db: PathBuf,
    /// Directory searched for devices.
    pub root: PathBuf,
    /// Glob fragment joined onto `root`.
    pub filter: String,
    pub workers: usize,
    pub queue_depth: usize,
    pub interval: Duration,
    pub test: TestConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            db: PathBuf::from("history.db"),
            root: PathBuf::from("/dev/disk/by-id/"),
            filter: String::new(),
            workers: 64,
            queue_depth: 1024,
            interval: Duration::from_secs(2),
            test: TestConfig::default(),
        }
    }
}

impl RunConfig {
    /// Full discovery pattern: `root` joined with `filter`.
    pub fn pattern(&self) -> String {
        self.root.join(&self.filter).display().to_string()
    }

    /// Check everything that must hold before any device is touched.
    pub fn validate(&self) -> Result<()> {
        if self.db.as_os_str().is_empty() {
            return Err(BurnInError::Config("missing history db path".into()));
        }
        if self.root.as_os_str().is_empty() {
            return Err(BurnInError::Config("missing root directory".into()));
        }
        if self.filter.is_empty() {
            return Err(BurnInError::Config("missing filter".into()));
        }
        check_dir(&self.root)?;
        if self.workers == 0 {
            return Err(BurnInError::Config("worker count must be positive".into()));
        }
        if self.queue_depth == 0 {
            return Err(BurnInError::Config("queue depth must be positive".into()));
        }
        if self.interval.is_zero() {
            return Err(BurnInError::Config("sampling interval must be positive".into()));
        }
        if self.test.write_budget <= 0 {
            return Err(BurnInError::Config("invalid write size".into()));
        }
        let pattern = self.pattern();
        glob::Pattern::new(&pattern)
            .map_err(|e| BurnInError::Config(format!("glob pattern {pattern} is bad: {e}")))?;
        Ok(())
    }
}

fn check_dir(root: &Path) -> Result<()> {
    let meta = std::fs::metadata(root)
        .map_err(|e| BurnInError::Config(format!("failed to stat {}: {e}", root.display())))?;
    if !meta.is_dir() {
        return Err(BurnInError::Config(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> RunConfig {
        RunConfig {
            db: dir.join("history.db"),
            root: dir.to_path_buf(),
            filter: "disk-*".into(),
            ..RunConfig::default()
        }
    }

    #[test]
    fn gigabytes() {
        assert_eq!(TestConfig::from_gigabytes(3).unwrap().write_budget, 3 * GB);
        assert!(TestConfig::from_gigabytes(0).is_err());
        assert!(TestConfig::from_gigabytes(-1).is_err());
        assert!(TestConfig::from_gigabytes(i64::MAX).is_err());
    }

    #[test]
    fn byte_budget_alignment() {
        assert!(TestConfig::from_bytes(2 * BLOCK_SIZE).is_ok());
        assert!(TestConfig::from_bytes(BLOCK_SIZE).is_err());
        assert!(TestConfig::from_bytes(0).is_err());
    }

    #[test]
    fn validate_accepts_good_config() {
        let dir = tempfile::tempdir().unwrap();
        config_in(dir.path()).validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_inputs() {
        let dir = tempfile::tempdir().unwrap();

        let mut cfg = config_in(dir.path());
        cfg.filter.clear();
        assert!(matches!(cfg.validate(), Err(BurnInError::Config(_))));

        let mut cfg = config_in(dir.path());
        cfg.filter = "[".into();
        assert!(matches!(cfg.validate(), Err(BurnInError::Config(_))));

        let mut cfg = config_in(dir.path());
        cfg.root = dir.path().join("missing");
        assert!(matches!(cfg.validate(), Err(BurnInError::Config(_))));

        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        let mut cfg = config_in(dir.path());
        cfg.root = file;
        assert!(matches!(cfg.validate(), Err(BurnInError::Config(_))));

        let mut cfg = config_in(dir.path());
        cfg.workers = 0;
        assert!(cfg.validate().is_err());
    }
}
