//! OrderPlan: a fully specified trade instruction built from a signal.

use serde::{Deserialize, Serialize};

use super::{Direction, Signal};
use crate::error::ValidationError;

/// Where the entry fills relative to the signal bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// Fill at the signal bar's close; exits are checked from the next bar.
    #[default]
    SignalClose,
    /// Fill at the next bar's open; that same bar's range is checked for exits.
    NextOpen,
}

/// Trailing behaviour carried by trailing stop policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingParams {
    /// Unrealized profit, in multiples of initial risk, before the stop starts to ratchet.
    pub trail_trigger_r: f64,
}

/// Entry, stop, optional target and size for one signal.
///
/// `target_price == None` means trail-only: the position leaves through its
/// stop or runs out of data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlan {
    pub signal: Signal,
    pub entry_mode: EntryMode,
    /// Row the position opens on.
    pub entry_index: usize,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: Option<f64>,
    pub position_size: f64,
    pub stop_policy_type: String,
    pub is_trailing: bool,
    pub trailing_params: Option<TrailingParams>,
}

impl OrderPlan {
    pub fn direction(&self) -> Direction {
        self.signal.direction
    }

    /// Price distance between entry and the initial stop (one R).
    pub fn initial_risk(&self) -> f64 {
        (self.entry_price - self.stop_price).abs()
    }

    /// First row whose high/low range can close the position.
    pub fn first_check_index(&self) -> usize {
        match self.entry_mode {
            EntryMode::SignalClose => self.entry_index + 1,
            EntryMode::NextOpen => self.entry_index,
        }
    }

    /// Check stop/entry/target ordering and size bounds.
    ///
    /// LONG: `stop < entry < target`; SHORT: `target < entry < stop`;
    /// `0 < size <= max_size`.
    pub fn validate(&self, max_size: f64) -> Result<(), ValidationError> {
        let sign = self.direction().sign();
        let risk = (self.entry_price - self.stop_price) * sign;
        if !(risk.is_finite() && risk > 0.0) {
            return Err(ValidationError::DegenerateStopDistance {
                entry: self.entry_price,
                stop: self.stop_price,
            });
        }
        if let Some(target) = self.target_price {
            let reward = (target - self.entry_price) * sign;
            if !(reward.is_finite() && reward > 0.0) {
                return Err(ValidationError::InvalidTarget {
                    entry: self.entry_price,
                    target,
                });
            }
        }
        if !(self.position_size.is_finite() && self.position_size > 0.0) {
            return Err(ValidationError::NonPositiveSize {
                size: self.position_size,
            });
        }
        if self.position_size > max_size {
            return Err(ValidationError::SizeAboveMaximum {
                size: self.position_size,
                max: max_size,
            });
        }
        Ok(())
    }
}
