//! Signal: a candidate entry detected by the batch scanner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Direction;

/// Candidate trade entry.
///
/// `metadata` holds the snapshot of indicator values at `bar_index`, keyed by
/// name in sorted order so two runs serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    /// Row of the resolved series the signal fired on.
    pub bar_index: usize,
    /// Explicit entry price; when absent the risk manager derives one from the bar.
    pub entry_hint: Option<f64>,
    pub metadata: BTreeMap<String, f64>,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        timestamp: DateTime<Utc>,
        bar_index: usize,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            timestamp,
            bar_index,
            entry_hint: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_entry_hint(mut self, price: f64) -> Self {
        self.entry_hint = Some(price);
        self
    }
}
