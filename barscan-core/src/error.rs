//! Error taxonomy.
//!
//! Per-item failures (`ValidationError`) are absorbed by the batch and surface
//! as skip records. Everything else aborts the run through `EngineError`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guard::AbortRecord;
use crate::progress::Cancelled;

/// A malformed signal or order. Recovered locally: the item is skipped with
/// this error as its recorded reason and the batch continues.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("degenerate stop distance: entry {entry}, stop {stop}")]
    DegenerateStopDistance { entry: f64, stop: f64 },
    #[error("target {target} is not beyond entry {entry}")]
    InvalidTarget { entry: f64, target: f64 },
    #[error("non-positive position size {size}")]
    NonPositiveSize { size: f64 },
    #[error("position size {size} exceeds maximum {max}")]
    SizeAboveMaximum { size: f64, max: f64 },
    #[error("size {raw} floors to zero at lot step {lot_step}")]
    BelowLotStep { raw: f64, lot_step: f64 },
    #[error("invalid entry price {price}")]
    InvalidEntryPrice { price: f64 },
    #[error("non-positive account equity {equity}")]
    NonPositiveEquity { equity: f64 },
    #[error("indicator '{name}' undefined at bar {index}")]
    UndefinedIndicator { name: String, index: usize },
    #[error("signal symbol '{signal}' does not match series '{series}'")]
    SymbolMismatch { signal: String, series: String },
    #[error("signal bar {index} is outside a series of {len} bars")]
    SignalOutOfRange { index: usize, len: usize },
    #[error("order uses stop policy '{order}' but the simulator runs '{active}'")]
    PolicyMismatch { order: String, active: String },
}

impl ValidationError {
    /// Machine-readable reason code used in skip summaries.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::DegenerateStopDistance { .. } => "degenerate_stop_distance",
            ValidationError::InvalidTarget { .. } => "invalid_target",
            ValidationError::NonPositiveSize { .. } => "non_positive_size",
            ValidationError::SizeAboveMaximum { .. } => "size_above_maximum",
            ValidationError::BelowLotStep { .. } => "below_lot_step",
            ValidationError::InvalidEntryPrice { .. } => "invalid_entry_price",
            ValidationError::NonPositiveEquity { .. } => "non_positive_equity",
            ValidationError::UndefinedIndicator { .. } => "undefined_indicator",
            ValidationError::SymbolMismatch { .. } => "symbol_mismatch",
            ValidationError::SignalOutOfRange { .. } => "signal_out_of_range",
            ValidationError::PolicyMismatch { .. } => "policy_mismatch",
        }
    }
}

/// Input shape or ordering is broken. Always fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIntegrityError {
    #[error("timestamps not strictly increasing at row {index}: {previous} -> {current}")]
    NonMonotonic {
        index: usize,
        previous: i64,
        current: i64,
    },
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("null timestamp at row {0}")]
    NullTimestamp(usize),
    #[error("frame error: {0}")]
    Frame(String),
}

/// Memory floor breached or the probe could not answer in time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("memory floor breached: {0}")]
    BelowFloor(AbortRecord),
    #[error("memory probe failed: {0}")]
    ProbeFailed(String),
    #[error("memory check took {elapsed_ms} ms, limit is {limit_ms} ms")]
    CheckTimedOut { elapsed_ms: u64, limit_ms: u64 },
}

/// Which policy slot a configuration record targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Stop,
    TakeProfit,
    Sizer,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PolicyKind::Stop => "stop",
            PolicyKind::TakeProfit => "take-profit",
            PolicyKind::Sizer => "sizer",
        };
        f.write_str(name)
    }
}

/// Unresolvable or incomplete configuration. Fatal before any work begins.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyConfigError {
    #[error("unknown {kind} policy '{name}'")]
    Unknown { kind: PolicyKind, name: String },
    #[error("policy '{policy}' requires parameter '{param}'")]
    MissingParameter { policy: String, param: String },
    #[error("policy '{policy}' parameter '{param}' = {value}: expected {expected}")]
    InvalidParameter {
        policy: String,
        param: String,
        value: f64,
        expected: &'static str,
    },
    #[error("account parameter '{param}' = {value}: expected {expected}")]
    InvalidAccount {
        param: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("indicator '{0}' is required but absent from the series")]
    MissingIndicator(String),
    #[error("initial balance {0} must be positive and finite")]
    InvalidBalance(f64),
}

/// Systemic failure: the whole run aborts.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    PolicyConfig(#[from] PolicyConfigError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("configuration could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}
