//! Domain records for barscan.
//!
//! Lifecycle: `Signal` (scanner) → `OrderPlan` (risk manager) → `ClosedTrade`
//! (simulator). None of them change after construction; the only mutable
//! per-order state is the simulator's `TrailState`.

pub mod candle;
pub mod order;
pub mod signal;
pub mod trade;

pub use candle::Candle;
pub use order::{EntryMode, OrderPlan, TrailingParams};
pub use signal::Signal;
pub use trade::{ClosedTrade, ExitReason, SkipEvent, SkipReason};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short. Multiplies a price move into a signed profit.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which directions a scan evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDirection {
    Long,
    Short,
    #[default]
    Both,
}

impl ScanDirection {
    /// Directions in emission order. LONG precedes SHORT on a shared bar.
    pub fn directions(self) -> &'static [Direction] {
        match self {
            ScanDirection::Long => &[Direction::Long],
            ScanDirection::Short => &[Direction::Short],
            ScanDirection::Both => &[Direction::Long, Direction::Short],
        }
    }

    pub fn includes(self, direction: Direction) -> bool {
        self.directions().contains(&direction)
    }
}

/// Convert epoch milliseconds (the series' storage unit) to a UTC timestamp.
///
/// Out-of-range values clamp to the Unix epoch rather than panicking.
pub fn timestamp_from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
