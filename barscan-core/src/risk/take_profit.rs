//! Take-profit policies.

use crate::domain::Direction;
use crate::error::ValidationError;
use crate::series::BarView;

pub trait TakeProfitPolicy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Target price, or `None` for a trail-only order.
    fn initial_tp(
        &self,
        entry: f64,
        stop: f64,
        direction: Direction,
        context: &BarView<'_>,
    ) -> Result<Option<f64>, ValidationError>;
}

/// Target at `rr_ratio` times the stop distance beyond entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskMultipleTarget {
    pub rr_ratio: f64,
}

impl TakeProfitPolicy for RiskMultipleTarget {
    fn name(&self) -> &str {
        "risk_multiple_tp"
    }

    fn initial_tp(
        &self,
        entry: f64,
        stop: f64,
        direction: Direction,
        _context: &BarView<'_>,
    ) -> Result<Option<f64>, ValidationError> {
        let risk = (entry - stop) * direction.sign();
        if !(risk.is_finite() && risk > 0.0) {
            return Err(ValidationError::DegenerateStopDistance { entry, stop });
        }
        Ok(Some(entry + direction.sign() * self.rr_ratio * risk))
    }
}

/// No target: the position leaves through its stop or when data runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoTarget;

impl TakeProfitPolicy for NoTarget {
    fn name(&self) -> &str {
        "no_tp"
    }

    fn initial_tp(
        &self,
        _entry: f64,
        _stop: f64,
        _direction: Direction,
        _context: &BarView<'_>,
    ) -> Result<Option<f64>, ValidationError> {
        Ok(None)
    }
}
