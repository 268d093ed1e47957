//! Candle: a materialized row of the columnar series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One bar with its indicator values.
///
/// The engine never builds these in its hot loops; they exist for audit,
/// signal snapshots and tests. `None` marks an indicator still in warm-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub indicators: BTreeMap<String, Option<f64>>,
}

impl Candle {
    /// Defined indicator value, or `None` during warm-up / when absent.
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied().flatten()
    }

    /// Basic OHLC sanity: high is the top of the range, low the bottom, prices positive.
    pub fn is_sane(&self) -> bool {
        is_sane_ohlc(self.open, self.high, self.low, self.close)
    }
}

pub(crate) fn is_sane_ohlc(open: f64, high: f64, low: f64, close: f64) -> bool {
    if open.is_nan() || high.is_nan() || low.is_nan() || close.is_nan() {
        return false;
    }
    high >= low
        && high >= open
        && high >= close
        && low <= open
        && low <= close
        && open > 0.0
        && close > 0.0
}
