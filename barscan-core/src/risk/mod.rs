//! Risk manager: composes a stop policy, a take-profit policy and a position
//! sizer to turn each signal into an [`OrderPlan`].
//!
//! `build_order` is a pure function of the signal, the series and the
//! explicitly passed portfolio state. Failures are per-signal rejections
//! carried back as a [`SkipReason`]; only configuration problems are fatal.

pub mod registry;
pub mod sizer;
pub mod stop;
pub mod take_profit;
pub mod trail;

pub use registry::{PolicyRegistry, PolicySpec};
pub use sizer::{floor_to_step, FixedSizeSizer, PositionSizer, RiskPercentSizer, SizingRequest};
pub use stop::{
    FixedDistanceStop, MovingAverageKind, MovingAverageTrailingStop, StopPolicy,
    TrailingVolatilityStop, VolatilityStop,
};
pub use take_profit::{NoTarget, RiskMultipleTarget, TakeProfitPolicy};
pub use trail::TrailState;

use serde::{Deserialize, Serialize};

use crate::domain::{EntryMode, OrderPlan, Signal, SkipReason};
use crate::error::{PolicyConfigError, ValidationError};
use crate::series::PriceSeries;

fn default_pip_size() -> f64 {
    1.0
}

/// Account-level sizing inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountParams {
    /// Fraction of equity risked per trade (`0.01` = 1%).
    pub risk_pct: f64,
    /// Account-currency value of one pip per lot.
    pub pip_value: f64,
    /// Price increment of one pip. `1.0` makes pips equal price units.
    #[serde(default = "default_pip_size")]
    pub pip_size: f64,
    /// Size granularity; `0` disables flooring.
    #[serde(default)]
    pub lot_step: f64,
    pub max_position_size: f64,
}

impl AccountParams {
    pub fn validate(&self) -> Result<(), PolicyConfigError> {
        let check = |param: &'static str, value: f64, ok: bool, expected: &'static str| {
            if ok && value.is_finite() {
                Ok(())
            } else {
                Err(PolicyConfigError::InvalidAccount {
                    param,
                    value,
                    expected,
                })
            }
        };
        check(
            "risk_pct",
            self.risk_pct,
            self.risk_pct > 0.0 && self.risk_pct <= 1.0,
            "in (0, 1]",
        )?;
        check("pip_value", self.pip_value, self.pip_value > 0.0, "positive")?;
        check("pip_size", self.pip_size, self.pip_size > 0.0, "positive")?;
        check("lot_step", self.lot_step, self.lot_step >= 0.0, "non-negative")?;
        check(
            "max_position_size",
            self.max_position_size,
            self.max_position_size > 0.0,
            "positive",
        )?;
        Ok(())
    }
}

/// Policy records plus account parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub stop: PolicySpec,
    pub take_profit: PolicySpec,
    pub sizer: PolicySpec,
    pub account: AccountParams,
}

/// Account state read by the sizer. Threaded explicitly; never global.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub equity: f64,
}

#[derive(Debug)]
pub struct RiskManager {
    stop: Box<dyn StopPolicy>,
    take_profit: Box<dyn TakeProfitPolicy>,
    sizer: Box<dyn PositionSizer>,
    account: AccountParams,
    entry_mode: EntryMode,
}

impl RiskManager {
    /// Resolve every policy record through the registry.
    pub fn from_config(
        config: &RiskConfig,
        registry: &PolicyRegistry,
    ) -> Result<Self, PolicyConfigError> {
        Self::new(
            registry.resolve_stop(&config.stop)?,
            registry.resolve_take_profit(&config.take_profit)?,
            registry.resolve_sizer(&config.sizer)?,
            config.account.clone(),
        )
    }

    pub fn new(
        stop: Box<dyn StopPolicy>,
        take_profit: Box<dyn TakeProfitPolicy>,
        sizer: Box<dyn PositionSizer>,
        account: AccountParams,
    ) -> Result<Self, PolicyConfigError> {
        account.validate()?;
        Ok(Self {
            stop,
            take_profit,
            sizer,
            account,
            entry_mode: EntryMode::default(),
        })
    }

    pub fn with_entry_mode(mut self, entry_mode: EntryMode) -> Self {
        self.entry_mode = entry_mode;
        self
    }

    pub fn stop_policy(&self) -> &dyn StopPolicy {
        self.stop.as_ref()
    }

    pub fn account(&self) -> &AccountParams {
        &self.account
    }

    pub fn entry_mode(&self) -> EntryMode {
        self.entry_mode
    }

    /// Indicator columns the policies read.
    pub fn required_indicators(&self) -> Vec<String> {
        self.stop.required_indicators()
    }

    /// Turn a signal into an order, or explain why not.
    pub fn build_order(
        &self,
        signal: &Signal,
        series: &PriceSeries,
        portfolio: &PortfolioState,
    ) -> Result<OrderPlan, SkipReason> {
        if signal.symbol != series.symbol() {
            return Err(ValidationError::SymbolMismatch {
                signal: signal.symbol.clone(),
                series: series.symbol().to_string(),
            }
            .into());
        }
        let bar = signal.bar_index;
        if bar >= series.len() {
            return Err(ValidationError::SignalOutOfRange {
                index: bar,
                len: series.len(),
            }
            .into());
        }
        // Both modes need at least one bar after the signal to resolve against.
        if bar + 1 >= series.len() {
            return Err(SkipReason::NoSubsequentBars);
        }

        let (entry_index, derived_price) = match self.entry_mode {
            EntryMode::SignalClose => (bar, series.close()[bar]),
            EntryMode::NextOpen => (bar + 1, series.open()[bar + 1]),
        };
        let entry_price = signal.entry_hint.unwrap_or(derived_price);
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(ValidationError::InvalidEntryPrice { price: entry_price }.into());
        }

        let direction = signal.direction;
        let context = series.view(bar);
        let stop_price = self.stop.initial_stop(entry_price, direction, &context)?;
        let target_price = self
            .take_profit
            .initial_tp(entry_price, stop_price, direction, &context)?;
        let position_size = self.sizer.size(&SizingRequest {
            entry: entry_price,
            stop: stop_price,
            direction,
            balance: portfolio.equity,
            risk_pct: self.account.risk_pct,
            pip_value: self.account.pip_value,
            pip_size: self.account.pip_size,
            lot_step: self.account.lot_step,
            max_size: self.account.max_position_size,
        })?;

        let trailing_params = self.stop.trailing_params();
        let plan = OrderPlan {
            signal: signal.clone(),
            entry_mode: self.entry_mode,
            entry_index,
            entry_price,
            stop_price,
            target_price,
            position_size,
            stop_policy_type: self.stop.name().to_string(),
            is_trailing: trailing_params.is_some(),
            trailing_params,
        };
        plan.validate(self.account.max_position_size)?;
        Ok(plan)
    }
}
