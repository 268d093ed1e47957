//! Policy registry: policy-type name → factory.
//!
//! Configuration arrives as named records such as
//! `{ type = "volatility_stop", multiplier = 2.0, period = 14 }`. Each record
//! is resolved once, at configuration time, into a boxed policy. Adding a
//! policy means registering a factory; the risk manager never changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::sizer::{FixedSizeSizer, PositionSizer, RiskPercentSizer};
use super::stop::{
    FixedDistanceStop, MovingAverageKind, MovingAverageTrailingStop, StopPolicy,
    TrailingVolatilityStop, VolatilityStop,
};
use super::take_profit::{NoTarget, RiskMultipleTarget, TakeProfitPolicy};
use crate::error::{PolicyConfigError, PolicyKind};

/// A named policy record: type tag plus flat numeric parameters.
///
/// Parameters live in a `BTreeMap` so serialization (and anything hashed
/// from it) has a stable key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    #[serde(rename = "type")]
    pub policy_type: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, f64>,
}

impl PolicySpec {
    pub fn new(policy_type: impl Into<String>) -> Self {
        Self {
            policy_type: policy_type.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, param: impl Into<String>, value: f64) -> Self {
        self.params.insert(param.into(), value);
        self
    }

    /// A parameter that must be present and finite.
    pub fn required(&self, param: &str) -> Result<f64, PolicyConfigError> {
        let value = self
            .params
            .get(param)
            .copied()
            .ok_or_else(|| PolicyConfigError::MissingParameter {
                policy: self.policy_type.clone(),
                param: param.to_string(),
            })?;
        self.check(param, value, value.is_finite(), "a finite number")
    }

    /// A parameter with a fallback.
    pub fn optional(&self, param: &str, default: f64) -> Result<f64, PolicyConfigError> {
        let value = self.params.get(param).copied().unwrap_or(default);
        self.check(param, value, value.is_finite(), "a finite number")
    }

    /// A strictly positive parameter, required when `default` is `None`.
    pub fn positive(&self, param: &str, default: Option<f64>) -> Result<f64, PolicyConfigError> {
        let value = match default {
            Some(d) => self.optional(param, d)?,
            None => self.required(param)?,
        };
        self.check(param, value, value > 0.0, "a positive number")
    }

    /// A non-negative parameter with a fallback.
    pub fn non_negative(&self, param: &str, default: f64) -> Result<f64, PolicyConfigError> {
        let value = self.optional(param, default)?;
        self.check(param, value, value >= 0.0, "a non-negative number")
    }

    /// A lookback period: a whole number ≥ 1.
    pub fn period(&self, param: &str, default: usize) -> Result<usize, PolicyConfigError> {
        let value = self.optional(param, default as f64)?;
        let value = self.check(
            param,
            value,
            value >= 1.0 && value.fract() == 0.0,
            "a whole number >= 1",
        )?;
        Ok(value as usize)
    }

    fn check(
        &self,
        param: &str,
        value: f64,
        ok: bool,
        expected: &'static str,
    ) -> Result<f64, PolicyConfigError> {
        if ok {
            Ok(value)
        } else {
            Err(PolicyConfigError::InvalidParameter {
                policy: self.policy_type.clone(),
                param: param.to_string(),
                value,
                expected,
            })
        }
    }
}

pub type StopFactory = fn(&PolicySpec) -> Result<Box<dyn StopPolicy>, PolicyConfigError>;
pub type TakeProfitFactory =
    fn(&PolicySpec) -> Result<Box<dyn TakeProfitPolicy>, PolicyConfigError>;
pub type SizerFactory = fn(&PolicySpec) -> Result<Box<dyn PositionSizer>, PolicyConfigError>;

#[derive(Clone, Default)]
pub struct PolicyRegistry {
    stops: BTreeMap<String, StopFactory>,
    take_profits: BTreeMap<String, TakeProfitFactory>,
    sizers: BTreeMap<String, SizerFactory>,
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("stops", &self.names(PolicyKind::Stop))
            .field("take_profits", &self.names(PolicyKind::TakeProfit))
            .field("sizers", &self.names(PolicyKind::Sizer))
            .finish()
    }
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in policy.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_stop("volatility_stop", volatility_stop);
        registry.register_stop("trailing_volatility_stop", trailing_volatility_stop);
        registry.register_stop("fixed_distance_stop", fixed_distance_stop);
        registry.register_stop("ma_trailing_stop", ma_trailing_stop);

        registry.register_take_profit("risk_multiple_tp", risk_multiple_tp);
        registry.register_take_profit("no_tp", no_tp);
        registry.register_take_profit("none", no_tp);

        registry.register_sizer("risk_percent_sizer", risk_percent_sizer);
        registry.register_sizer("fixed_size_sizer", fixed_size_sizer);

        registry
    }

    pub fn register_stop(&mut self, name: &str, factory: StopFactory) {
        self.stops.insert(name.to_string(), factory);
    }

    pub fn register_take_profit(&mut self, name: &str, factory: TakeProfitFactory) {
        self.take_profits.insert(name.to_string(), factory);
    }

    pub fn register_sizer(&mut self, name: &str, factory: SizerFactory) {
        self.sizers.insert(name.to_string(), factory);
    }

    pub fn resolve_stop(
        &self,
        spec: &PolicySpec,
    ) -> Result<Box<dyn StopPolicy>, PolicyConfigError> {
        let factory = self
            .stops
            .get(&spec.policy_type)
            .ok_or_else(|| unknown(PolicyKind::Stop, spec))?;
        factory(spec)
    }

    pub fn resolve_take_profit(
        &self,
        spec: &PolicySpec,
    ) -> Result<Box<dyn TakeProfitPolicy>, PolicyConfigError> {
        let factory = self
            .take_profits
            .get(&spec.policy_type)
            .ok_or_else(|| unknown(PolicyKind::TakeProfit, spec))?;
        factory(spec)
    }

    pub fn resolve_sizer(
        &self,
        spec: &PolicySpec,
    ) -> Result<Box<dyn PositionSizer>, PolicyConfigError> {
        let factory = self
            .sizers
            .get(&spec.policy_type)
            .ok_or_else(|| unknown(PolicyKind::Sizer, spec))?;
        factory(spec)
    }

    /// Registered names for one policy slot, sorted.
    pub fn names(&self, kind: PolicyKind) -> Vec<&str> {
        match kind {
            PolicyKind::Stop => self.stops.keys().map(String::as_str).collect(),
            PolicyKind::TakeProfit => self.take_profits.keys().map(String::as_str).collect(),
            PolicyKind::Sizer => self.sizers.keys().map(String::as_str).collect(),
        }
    }
}

fn unknown(kind: PolicyKind, spec: &PolicySpec) -> PolicyConfigError {
    PolicyConfigError::Unknown {
        kind,
        name: spec.policy_type.clone(),
    }
}

// ─── Built-in factories ──────────────────────────────────────────────

fn volatility_stop(spec: &PolicySpec) -> Result<Box<dyn StopPolicy>, PolicyConfigError> {
    let multiplier = spec.positive("multiplier", Some(2.0))?;
    let period = spec.period("period", 14)?;
    Ok(Box::new(VolatilityStop::new(multiplier, period)))
}

fn trailing_volatility_stop(spec: &PolicySpec) -> Result<Box<dyn StopPolicy>, PolicyConfigError> {
    let multiplier = spec.positive("multiplier", Some(3.0))?;
    let period = spec.period("period", 14)?;
    let trigger = spec.non_negative("trail_trigger_r", 0.0)?;
    Ok(Box::new(TrailingVolatilityStop::new(multiplier, period, trigger)))
}

fn fixed_distance_stop(spec: &PolicySpec) -> Result<Box<dyn StopPolicy>, PolicyConfigError> {
    let distance = spec.positive("distance", None)?;
    Ok(Box::new(FixedDistanceStop { distance }))
}

fn ma_trailing_stop(spec: &PolicySpec) -> Result<Box<dyn StopPolicy>, PolicyConfigError> {
    let period = spec.period("period", 20)?;
    let code = spec.optional("ma_kind", 0.0)?;
    let kind = MovingAverageKind::from_code(code).ok_or_else(|| {
        PolicyConfigError::InvalidParameter {
            policy: spec.policy_type.clone(),
            param: "ma_kind".into(),
            value: code,
            expected: "0 (sma) or 1 (ema)",
        }
    })?;
    let buffer = spec.non_negative("buffer", 0.0)?;
    let trigger = spec.non_negative("trail_trigger_r", 0.0)?;
    Ok(Box::new(MovingAverageTrailingStop::new(period, kind, buffer, trigger)))
}

fn risk_multiple_tp(spec: &PolicySpec) -> Result<Box<dyn TakeProfitPolicy>, PolicyConfigError> {
    let rr_ratio = spec.positive("rr_ratio", None)?;
    Ok(Box::new(RiskMultipleTarget { rr_ratio }))
}

fn no_tp(_spec: &PolicySpec) -> Result<Box<dyn TakeProfitPolicy>, PolicyConfigError> {
    Ok(Box::new(NoTarget))
}

fn risk_percent_sizer(_spec: &PolicySpec) -> Result<Box<dyn PositionSizer>, PolicyConfigError> {
    Ok(Box::new(RiskPercentSizer))
}

fn fixed_size_sizer(spec: &PolicySpec) -> Result<Box<dyn PositionSizer>, PolicyConfigError> {
    let size = spec.positive("size", None)?;
    Ok(Box::new(FixedSizeSizer { size }))
}
