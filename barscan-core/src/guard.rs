//! Pre-flight memory guard.
//!
//! Runs once before the scanner starts. A breach produces a structured
//! [`AbortRecord`] inside `ResourceError::BelowFloor`; since nothing has been
//! computed yet, there is nothing to persist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::error::ResourceError;

pub const MB: u64 = 1024 * 1024;

/// Upper bound on how long the check may take.
pub const CHECK_DEADLINE: Duration = Duration::from_secs(3);

/// Source of the currently available memory, in bytes.
pub trait MemoryProbe: Send + Sync {
    fn available_bytes(&self) -> Result<u64, ResourceError>;
}

/// Reports a fixed amount. Used by tests and by callers that measured elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticMemoryProbe(pub u64);

impl MemoryProbe for StaticMemoryProbe {
    fn available_bytes(&self) -> Result<u64, ResourceError> {
        Ok(self.0)
    }
}

/// Diagnostic emitted when the floor is breached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortRecord {
    pub required: u64,
    pub available: u64,
    pub timestamp: DateTime<Utc>,
    /// Time from the start of the check to the abort decision.
    pub elapsed_ms: u64,
}

impl std::fmt::Display for AbortRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "required {} MB, available {} MB at {}",
            self.required / MB,
            self.available / MB,
            self.timestamp.to_rfc3339()
        )
    }
}

/// Successful check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryHeadroom {
    pub required: u64,
    pub available: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGuard {
    floor_bytes: u64,
    deadline: Duration,
}

impl ResourceGuard {
    pub fn new(floor_bytes: u64) -> Self {
        Self {
            floor_bytes,
            deadline: CHECK_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn floor_bytes(&self) -> u64 {
        self.floor_bytes
    }

    /// Compare available memory to the floor.
    pub fn check(&self, probe: &dyn MemoryProbe) -> Result<MemoryHeadroom, ResourceError> {
        let started = Instant::now();
        let available = probe.available_bytes()?;
        let elapsed = started.elapsed();

        if elapsed > self.deadline {
            return Err(ResourceError::CheckTimedOut {
                elapsed_ms: elapsed.as_millis() as u64,
                limit_ms: self.deadline.as_millis() as u64,
            });
        }

        if available < self.floor_bytes {
            let record = AbortRecord {
                required: self.floor_bytes,
                available,
                timestamp: Utc::now(),
                elapsed_ms: elapsed.as_millis() as u64,
            };
            error!(
                required = record.required,
                available = record.available,
                elapsed_ms = record.elapsed_ms,
                "memory floor breached, aborting before any work"
            );
            return Err(ResourceError::BelowFloor(record));
        }

        info!(
            required_mb = self.floor_bytes / MB,
            available_mb = available / MB,
            "memory check passed"
        );
        Ok(MemoryHeadroom {
            required: self.floor_bytes,
            available,
        })
    }
}
