//! Position sizers.
//!
//! Risk-percent sizing:
//! `size = floor_to_step((balance × risk_pct) / (stop_pips × pip_value), lot_step)`,
//! capped at `max_size`, where `stop_pips = |entry − stop| / pip_size`.
//! A zero or reversed stop distance is a rejection, never a division by zero.

use crate::domain::Direction;
use crate::error::ValidationError;

/// Everything a sizer may read. Equity arrives here explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingRequest {
    pub entry: f64,
    pub stop: f64,
    pub direction: Direction,
    pub balance: f64,
    pub risk_pct: f64,
    pub pip_value: f64,
    pub pip_size: f64,
    pub lot_step: f64,
    pub max_size: f64,
}

impl SizingRequest {
    /// Stop distance in pips, or a rejection if the stop is on the wrong side.
    pub fn stop_pips(&self) -> Result<f64, ValidationError> {
        let distance = (self.entry - self.stop) * self.direction.sign();
        if !(distance.is_finite() && distance > 0.0) {
            return Err(ValidationError::DegenerateStopDistance {
                entry: self.entry,
                stop: self.stop,
            });
        }
        Ok(distance / self.pip_size)
    }
}

pub trait PositionSizer: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn size(&self, request: &SizingRequest) -> Result<f64, ValidationError>;
}

/// Largest multiple of `step` not above `value`.
///
/// The small epsilon keeps exact multiples like `0.2 / 0.01` from flooring
/// to the step below through float error.
pub fn floor_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    let steps = (value / step + 1e-9).floor();
    steps * step
}

/// Unfloored risk-percent size.
pub fn raw_risk_size(request: &SizingRequest) -> Result<f64, ValidationError> {
    if !(request.balance.is_finite() && request.balance > 0.0) {
        return Err(ValidationError::NonPositiveEquity {
            equity: request.balance,
        });
    }
    let pips = request.stop_pips()?;
    Ok((request.balance * request.risk_pct) / (pips * request.pip_value))
}

/// Risk a fixed share of equity per trade.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskPercentSizer;

impl PositionSizer for RiskPercentSizer {
    fn name(&self) -> &str {
        "risk_percent_sizer"
    }

    fn size(&self, request: &SizingRequest) -> Result<f64, ValidationError> {
        let raw = raw_risk_size(request)?;
        let floored = floor_to_step(raw, request.lot_step);
        if floored <= 0.0 {
            return Err(ValidationError::BelowLotStep {
                raw,
                lot_step: request.lot_step,
            });
        }
        Ok(floored.min(request.max_size))
    }
}

/// Same size on every trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSizeSizer {
    pub size: f64,
}

impl PositionSizer for FixedSizeSizer {
    fn name(&self) -> &str {
        "fixed_size_sizer"
    }

    fn size(&self, request: &SizingRequest) -> Result<f64, ValidationError> {
        request.stop_pips()?;
        let floored = floor_to_step(self.size, request.lot_step);
        if !(floored > 0.0) {
            return Err(ValidationError::NonPositiveSize { size: floored });
        }
        Ok(floored.min(request.max_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(entry: f64, stop: f64) -> SizingRequest {
        SizingRequest {
            entry,
            stop,
            direction: Direction::Long,
            balance: 10_000.0,
            risk_pct: 0.01,
            pip_value: 10.0,
            pip_size: 0.0001,
            lot_step: 0.01,
            max_size: 100.0,
        }
    }

    #[test]
    fn fifty_pip_stop_sizes_to_point_two_lots() {
        // 50 pips at pip_size 0.0001.
        let req = request(1.1000, 1.0950);
        let raw = raw_risk_size(&req).unwrap();
        assert!((raw - 0.2).abs() < 1e-9, "raw size {raw}");
        assert!((RiskPercentSizer.size(&req).unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn floors_to_lot_step() {
        let mut req = request(1.1000, 1.0970); // 30 pips → 0.3333
        req.lot_step = 0.1;
        assert!((RiskPercentSizer.size(&req).unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn capped_at_max() {
        let mut req = request(1.1000, 1.0999); // 1 pip → 10 lots
        req.max_size = 2.5;
        assert_eq!(RiskPercentSizer.size(&req).unwrap(), 2.5);
    }

    #[test]
    fn zero_distance_rejected() {
        let err = RiskPercentSizer.size(&request(1.1, 1.1)).unwrap_err();
        assert_eq!(err.code(), "degenerate_stop_distance");
    }

    #[test]
    fn reversed_distance_rejected() {
        let err = RiskPercentSizer.size(&request(1.1, 1.2)).unwrap_err();
        assert_eq!(err.code(), "degenerate_stop_distance");
    }

    #[test]
    fn tiny_size_below_step_rejected() {
        let mut req = request(1.1000, 1.0000); // 1000 pips → 0.01 lots
        req.lot_step = 0.1;
        assert_eq!(RiskPercentSizer.size(&req).unwrap_err().code(), "below_lot_step");
    }

    #[test]
    fn non_positive_equity_rejected() {
        let mut req = request(1.1000, 1.0950);
        req.balance = 0.0;
        assert_eq!(RiskPercentSizer.size(&req).unwrap_err().code(), "non_positive_equity");
    }

    #[test]
    fn fixed_size_ignores_equity() {
        let mut req = request(1.1000, 1.0950);
        req.balance = 1.0;
        assert_eq!(FixedSizeSizer { size: 0.5 }.size(&req).unwrap(), 0.5);
    }

    #[test]
    fn floor_to_step_exact_multiple() {
        assert!((floor_to_step(0.2, 0.01) - 0.2).abs() < 1e-12);
        assert!((floor_to_step(0.299999, 0.1) - 0.2).abs() < 1e-12);
        assert_eq!(floor_to_step(3.7, 0.0), 3.7);
    }
}
