//! Closed trades and skip records produced by the simulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Direction;
use crate::error::ValidationError;

/// Why a position closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Initial stop touched.
    Stop,
    /// Take-profit touched.
    Target,
    /// Stop touched after it had ratcheted away from its initial level.
    Trailing,
    /// Data ran out or the holding limit expired.
    Timeout,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Stop => "stop",
            ExitReason::Target => "target",
            ExitReason::Trailing => "trailing",
            ExitReason::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: u64,
    pub symbol: String,
    pub direction: Direction,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Initial stop.
    pub stop_price: f64,
    pub target_price: Option<f64>,
    /// Stop level in force when the position closed.
    pub final_stop: f64,
    pub position_size: f64,
    pub pnl: f64,
    /// Signed price move divided by initial risk.
    pub r_multiple: f64,
    pub bars_held: usize,
    pub exit_reason: ExitReason,
}

impl ClosedTrade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Why a signal did not become a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A position for the symbol was still open at the signal bar.
    PositionAlreadyOpen { open_trade_id: u64 },
    /// No bar left after the entry to resolve an exit against.
    NoSubsequentBars,
    /// The risk manager refused to build an order.
    Rejected { error: ValidationError },
}

impl SkipReason {
    /// Machine-readable code; rejection codes come from the validation error.
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::PositionAlreadyOpen { .. } => "position_already_open",
            SkipReason::NoSubsequentBars => "no_subsequent_bars",
            SkipReason::Rejected { error } => error.code(),
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::PositionAlreadyOpen { .. } => f.write_str("position already open"),
            SkipReason::NoSubsequentBars => f.write_str("no subsequent bars"),
            SkipReason::Rejected { error } => write!(f, "rejected: {error}"),
        }
    }
}

impl From<ValidationError> for SkipReason {
    fn from(error: ValidationError) -> Self {
        SkipReason::Rejected { error }
    }
}

/// A signal dropped by the simulator, with its reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipEvent {
    /// Position of the signal in the simulator's input.
    pub signal_index: usize,
    pub symbol: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub bar_index: usize,
    pub reason: SkipReason,
}
