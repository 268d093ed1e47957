//! Stop policies.
//!
//! A stop policy places the initial stop and, for trailing variants, proposes
//! a new stop from each bar's snapshot. Proposals never loosen: every
//! `update_stop` result passes through [`tighter`], and the simulator's
//! `TrailState` ratchets again on top.

use crate::domain::{Direction, TrailingParams};
use crate::error::ValidationError;
use crate::series::BarView;

pub trait StopPolicy: Send + Sync + std::fmt::Debug {
    /// Registry name, carried on every order as `stop_policy_type`.
    fn name(&self) -> &str;

    /// Indicator columns this policy reads.
    fn required_indicators(&self) -> Vec<String> {
        Vec::new()
    }

    /// Stop price for a new position entered at `entry` on the bar `context`.
    fn initial_stop(
        &self,
        entry: f64,
        direction: Direction,
        context: &BarView<'_>,
    ) -> Result<f64, ValidationError>;

    /// `Some` for policies that ratchet.
    fn trailing_params(&self) -> Option<TrailingParams> {
        None
    }

    /// Proposed stop after observing `snapshot`. Never looser than `current_stop`.
    fn update_stop(
        &self,
        current_stop: f64,
        _entry: f64,
        _direction: Direction,
        _snapshot: &BarView<'_>,
    ) -> f64 {
        current_stop
    }
}

/// The tighter of two stops for `direction`. NaN candidates are ignored.
pub fn tighter(direction: Direction, current: f64, candidate: f64) -> f64 {
    if candidate.is_nan() {
        return current;
    }
    match direction {
        Direction::Long => current.max(candidate),
        Direction::Short => current.min(candidate),
    }
}

fn required(view: &BarView<'_>, key: &str) -> Result<f64, ValidationError> {
    view.indicator(key)
        .ok_or_else(|| ValidationError::UndefinedIndicator {
            name: key.to_string(),
            index: view.index(),
        })
}

/// Offset `distance` from `price` on the losing side of a position.
fn behind(price: f64, direction: Direction, distance: f64) -> f64 {
    price - direction.sign() * distance
}

// ─── Volatility stop ─────────────────────────────────────────────────

/// Fixed multiple of a volatility measure (`atr_{period}`) behind entry. Does not move.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityStop {
    pub multiplier: f64,
    pub period: usize,
    indicator_key: String,
}

impl VolatilityStop {
    pub fn new(multiplier: f64, period: usize) -> Self {
        Self {
            multiplier,
            period,
            indicator_key: format!("atr_{period}"),
        }
    }
}

impl StopPolicy for VolatilityStop {
    fn name(&self) -> &str {
        "volatility_stop"
    }

    fn required_indicators(&self) -> Vec<String> {
        vec![self.indicator_key.clone()]
    }

    fn initial_stop(
        &self,
        entry: f64,
        direction: Direction,
        context: &BarView<'_>,
    ) -> Result<f64, ValidationError> {
        let atr = required(context, &self.indicator_key)?;
        Ok(behind(entry, direction, atr * self.multiplier))
    }
}

// ─── Trailing volatility stop ────────────────────────────────────────

/// Volatility stop that trails at `close ∓ multiplier × atr` once active.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingVolatilityStop {
    inner: VolatilityStop,
    pub trail_trigger_r: f64,
}

impl TrailingVolatilityStop {
    pub fn new(multiplier: f64, period: usize, trail_trigger_r: f64) -> Self {
        Self {
            inner: VolatilityStop::new(multiplier, period),
            trail_trigger_r,
        }
    }
}

impl StopPolicy for TrailingVolatilityStop {
    fn name(&self) -> &str {
        "trailing_volatility_stop"
    }

    fn required_indicators(&self) -> Vec<String> {
        self.inner.required_indicators()
    }

    fn initial_stop(
        &self,
        entry: f64,
        direction: Direction,
        context: &BarView<'_>,
    ) -> Result<f64, ValidationError> {
        self.inner.initial_stop(entry, direction, context)
    }

    fn trailing_params(&self) -> Option<TrailingParams> {
        Some(TrailingParams {
            trail_trigger_r: self.trail_trigger_r,
        })
    }

    fn update_stop(
        &self,
        current_stop: f64,
        _entry: f64,
        direction: Direction,
        snapshot: &BarView<'_>,
    ) -> f64 {
        match snapshot.indicator(&self.inner.indicator_key) {
            Some(atr) if atr > 0.0 => tighter(
                direction,
                current_stop,
                behind(snapshot.close(), direction, atr * self.inner.multiplier),
            ),
            _ => current_stop,
        }
    }
}

// ─── Fixed distance stop ─────────────────────────────────────────────

/// Constant price distance behind entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedDistanceStop {
    pub distance: f64,
}

impl StopPolicy for FixedDistanceStop {
    fn name(&self) -> &str {
        "fixed_distance_stop"
    }

    fn initial_stop(
        &self,
        entry: f64,
        direction: Direction,
        _context: &BarView<'_>,
    ) -> Result<f64, ValidationError> {
        Ok(behind(entry, direction, self.distance))
    }
}

// ─── Moving-average trailing stop ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovingAverageKind {
    Simple,
    Exponential,
}

impl MovingAverageKind {
    /// `0` → simple, `1` → exponential. Any other value, fractional ones
    /// included, is rejected.
    pub fn from_code(code: f64) -> Option<Self> {
        if code == 0.0 {
            Some(MovingAverageKind::Simple)
        } else if code == 1.0 {
            Some(MovingAverageKind::Exponential)
        } else {
            None
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            MovingAverageKind::Simple => "sma",
            MovingAverageKind::Exponential => "ema",
        }
    }
}

/// Stop that follows a moving average, `buffer` price units on the losing side.
#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageTrailingStop {
    pub period: usize,
    pub kind: MovingAverageKind,
    pub buffer: f64,
    pub trail_trigger_r: f64,
    indicator_key: String,
}

impl MovingAverageTrailingStop {
    pub fn new(period: usize, kind: MovingAverageKind, buffer: f64, trail_trigger_r: f64) -> Self {
        Self {
            period,
            kind,
            buffer,
            trail_trigger_r,
            indicator_key: format!("{}_{period}", kind.prefix()),
        }
    }
}

impl StopPolicy for MovingAverageTrailingStop {
    fn name(&self) -> &str {
        "ma_trailing_stop"
    }

    fn required_indicators(&self) -> Vec<String> {
        vec![self.indicator_key.clone()]
    }

    fn initial_stop(
        &self,
        _entry: f64,
        direction: Direction,
        context: &BarView<'_>,
    ) -> Result<f64, ValidationError> {
        let ma = required(context, &self.indicator_key)?;
        Ok(behind(ma, direction, self.buffer))
    }

    fn trailing_params(&self) -> Option<TrailingParams> {
        Some(TrailingParams {
            trail_trigger_r: self.trail_trigger_r,
        })
    }

    fn update_stop(
        &self,
        current_stop: f64,
        _entry: f64,
        direction: Direction,
        snapshot: &BarView<'_>,
    ) -> f64 {
        match snapshot.indicator(&self.indicator_key) {
            Some(ma) => tighter(direction, current_stop, behind(ma, direction, self.buffer)),
            None => current_stop,
        }
    }
}
