//! Memory probe backed by `/proc/meminfo`.

use std::path::PathBuf;

use barscan_core::guard::MemoryProbe;
use barscan_core::ResourceError;

const MEMINFO: &str = "/proc/meminfo";

/// Reads `MemAvailable` on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcMeminfoProbe {
    path: PathBuf,
}

impl Default for ProcMeminfoProbe {
    fn default() -> Self {
        Self {
            path: PathBuf::from(MEMINFO),
        }
    }
}

impl ProcMeminfoProbe {
    /// Probe a meminfo-formatted file somewhere other than `/proc`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MemoryProbe for ProcMeminfoProbe {
    fn available_bytes(&self) -> Result<u64, ResourceError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            ResourceError::ProbeFailed(format!("read {}: {e}", self.path.display()))
        })?;
        parse_mem_available(&text).ok_or_else(|| {
            ResourceError::ProbeFailed(format!("no MemAvailable line in {}", self.path.display()))
        })
    }
}

/// Bytes from a `MemAvailable:  <n> kB` line.
pub fn parse_mem_available(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        let mut parts = rest.split_whitespace();
        let value: u64 = parts.next()?.parse().ok()?;
        match parts.next() {
            Some("kB") | None => value.checked_mul(1024),
            Some(_) => None,
        }
    })
}
