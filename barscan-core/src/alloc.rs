//! Logical allocation accounting.
//!
//! The scanner and simulator allocate a handful of bulk, index-addressed
//! buffers instead of one object per candle. Each such buffer is recorded
//! here so the report can state how many allocations the run made, how many
//! a per-candle design would have made, and the peak of live tracked bytes.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One recorded bulk allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub label: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationLedger {
    records: Vec<AllocationRecord>,
    live_bytes: u64,
    peak_bytes: u64,
    baseline_count: u64,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a buffer of `capacity` elements of `T`.
    pub fn record<T>(&mut self, label: &str, capacity: usize) {
        let bytes = (capacity * std::mem::size_of::<T>()) as u64;
        self.record_bytes(label, bytes);
    }

    pub fn record_bytes(&mut self, label: &str, bytes: u64) {
        debug!(label, bytes, "buffer allocated");
        self.records.push(AllocationRecord {
            label: label.to_string(),
            bytes,
        });
        self.live_bytes += bytes;
        self.peak_bytes = self.peak_bytes.max(self.live_bytes);
    }

    /// Mark `bytes` as freed. Does not change the allocation count.
    pub fn release(&mut self, bytes: u64) {
        self.live_bytes = self.live_bytes.saturating_sub(bytes);
    }

    /// Counterpart of [`record`](Self::record) for a dropped buffer.
    pub fn release_buffer<T>(&mut self, capacity: usize) {
        self.release((capacity * std::mem::size_of::<T>()) as u64);
    }

    /// Add objects a one-object-per-candle design would have allocated.
    pub fn add_baseline(&mut self, count: u64) {
        self.baseline_count += count;
    }

    pub fn allocation_count(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn baseline_count(&self) -> u64 {
        self.baseline_count
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes
    }

    pub fn records(&self) -> &[AllocationRecord] {
        &self.records
    }

    /// Percentage of baseline allocations avoided, clamped to `[0, 100]`.
    pub fn reduction_pct(&self) -> f64 {
        if self.baseline_count == 0 {
            return 0.0;
        }
        let ratio = self.allocation_count() as f64 / self.baseline_count as f64;
        ((1.0 - ratio) * 100.0).clamp(0.0, 100.0)
    }
}
