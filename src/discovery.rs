use crate::error::{BurnInError, Result};

/// Source of candidate device paths, re-queried on every sampling tick.
pub trait Discover: Send {
    fn discover(&self) -> Result<Vec<String>>;
}

/// Discovers devices by expanding a filesystem glob such as
/// `/dev/disk/by-id/usb-*`.
#[derive(Debug, Clone)]
pub struct GlobDiscovery {
    pattern: String,
}

impl GlobDiscovery {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        glob::Pattern::new(&pattern)
            .map_err(|e| BurnInError::Config(format!("glob pattern {pattern} is bad: {e}")))?;
        Ok(Self { pattern })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Discover for GlobDiscovery {
    fn discover(&self) -> Result<Vec<String>> {
        let entries = glob::glob(&self.pattern)
            .map_err(|e| BurnInError::Discovery(format!("{}: {e}", self.pattern)))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| BurnInError::Discovery(e.to_string()))?;
            paths.push(path.display().to_string());
        }
        Ok(paths)
    }
}
