//! Trailing-stop state for one open order.
//!
//! **Core rule:** the stop may tighten, never loosen.
//! - Long: stop can only rise (`max(current, proposed)`)
//! - Short: stop can only fall (`min(current, proposed)`)
//!
//! Ratcheting is gated on `trail_trigger_r`: until unrealized profit has
//! reached that many multiples of the initial risk, proposals are ignored.
//! Once reached, activation is permanent for the life of the order.

use crate::domain::Direction;

#[derive(Debug, Clone, PartialEq)]
pub struct TrailState {
    direction: Direction,
    entry_price: f64,
    initial_stop: f64,
    current_stop: f64,
    trigger_r: f64,
    activated: bool,
    update_count: u32,
}

impl TrailState {
    pub fn new(direction: Direction, entry_price: f64, initial_stop: f64, trigger_r: f64) -> Self {
        Self {
            direction,
            entry_price,
            initial_stop,
            current_stop: initial_stop,
            trigger_r: trigger_r.max(0.0),
            activated: trigger_r <= 0.0,
            update_count: 0,
        }
    }

    /// Distance between entry and the initial stop.
    pub fn initial_risk(&self) -> f64 {
        (self.entry_price - self.initial_stop).abs()
    }

    /// Feed the previous bar's close; activates the trail once profit at that
    /// close reaches the trigger. Intrabar extremes never arm the trail.
    pub fn observe_profit(&mut self, price: f64) {
        if self.activated || price.is_nan() {
            return;
        }
        let risk = self.initial_risk();
        if risk <= 0.0 {
            return;
        }
        let profit_r = (price - self.entry_price) * self.direction.sign() / risk;
        if profit_r >= self.trigger_r {
            self.activated = true;
        }
    }

    /// Apply a proposed stop. Returns the stop now in force.
    ///
    /// NaN proposals and proposals before activation leave the stop unchanged.
    pub fn ratchet(&mut self, proposed: f64) -> f64 {
        if !self.activated || proposed.is_nan() {
            return self.current_stop;
        }
        let next = match self.direction {
            Direction::Long => self.current_stop.max(proposed),
            Direction::Short => self.current_stop.min(proposed),
        };
        if next != self.current_stop {
            self.current_stop = next;
            self.update_count += 1;
        }
        self.current_stop
    }

    pub fn current_stop(&self) -> f64 {
        self.current_stop
    }

    pub fn initial_stop(&self) -> f64 {
        self.initial_stop
    }

    pub fn is_active(&self) -> bool {
        self.activated
    }

    /// Whether the stop has moved away from its initial level.
    pub fn has_trailed(&self) -> bool {
        self.update_count > 0
    }

    pub fn update_count(&self) -> u32 {
        self.update_count
    }
}
