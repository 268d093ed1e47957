//! Synthetic series for tests and benchmarks.
//!
//! The engine never computes indicators; these fixture helpers do, so tests
//! can exercise warm-up handling against realistic columns. Every generator
//! is seeded and fully deterministic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::DataIntegrityError;
use crate::series::{IndicatorColumns, PriceSeries};

/// 2023-11-14T22:13:20Z, the first bar of every synthetic series.
pub const EPOCH_MS: i64 = 1_700_000_000_000;
/// One-minute bars.
pub const INTERVAL_MS: i64 = 60_000;

fn timestamps(n: usize) -> Vec<i64> {
    (0..n as i64).map(|i| EPOCH_MS + i * INTERVAL_MS).collect()
}

/// Strictly rising closes: `close[i] = start + i × step`.
///
/// Each bar opens at the previous close and its range extends a quarter step
/// beyond open and close.
pub fn ascending(
    symbol: &str,
    n: usize,
    start: f64,
    step: f64,
) -> Result<PriceSeries, DataIntegrityError> {
    let close: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
    let open: Vec<f64> = (0..n)
        .map(|i| if i == 0 { start - step } else { close[i - 1] })
        .collect();
    let high: Vec<f64> = close.iter().map(|c| c + 0.25 * step).collect();
    let low: Vec<f64> = open.iter().map(|o| o - 0.25 * step).collect();
    PriceSeries::new(symbol, timestamps(n), open, high, low, close, IndicatorColumns::new())
}

/// Seeded random walk starting at 100 with roughly 0.2% moves per bar.
pub fn random_walk(symbol: &str, n: usize, seed: u64) -> Result<PriceSeries, DataIntegrityError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut open = Vec::with_capacity(n);
    let mut high = Vec::with_capacity(n);
    let mut low = Vec::with_capacity(n);
    let mut close = Vec::with_capacity(n);

    let mut price = 100.0_f64;
    for _ in 0..n {
        let o = price;
        let c = (o * (1.0 + rng.gen_range(-0.002..0.002))).max(0.01);
        let h = o.max(c) * (1.0 + rng.gen_range(0.0..0.001));
        let l = o.min(c) * (1.0 - rng.gen_range(0.0..0.001));
        open.push(o);
        high.push(h);
        low.push(l);
        close.push(c);
        price = c;
    }
    PriceSeries::new(symbol, timestamps(n), open, high, low, close, IndicatorColumns::new())
}

/// Attach `sma_5`, `sma_20`, `ema_20` and `atr_14` columns.
pub fn with_standard_indicators(series: PriceSeries) -> Result<PriceSeries, DataIntegrityError> {
    let sma_5 = sma(series.close(), 5);
    let sma_20 = sma(series.close(), 20);
    let ema_20 = ema(series.close(), 20);
    let atr_14 = atr(series.high(), series.low(), series.close(), 14);
    series
        .with_indicator("sma_5", sma_5)?
        .with_indicator("sma_20", sma_20)?
        .with_indicator("ema_20", ema_20)?
        .with_indicator("atr_14", atr_14)
}

/// Attach a column holding `value` on every row.
pub fn with_constant(
    series: PriceSeries,
    name: &str,
    value: f64,
) -> Result<PriceSeries, DataIntegrityError> {
    let len = series.len();
    series.with_indicator(name, vec![value; len])
}

// ─── Fixture indicator math ──────────────────────────────────────────

/// Rolling mean; NaN for the first `period - 1` rows.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..n {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// EMA seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = prev;
    for i in period..n {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// Wilder-smoothed true range. First defined value at row `period`.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return out;
    }
    let tr: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 {
                high[0] - low[0]
            } else {
                let pc = close[i - 1];
                (high[i] - low[i]).max((high[i] - pc).abs()).max((low[i] - pc).abs())
            }
        })
        .collect();

    // Seed from TR[1..=period]; TR[0] lacks a previous close.
    let mut prev = tr[1..=period].iter().sum::<f64>() / period as f64;
    out[period] = prev;
    for i in period + 1..n {
        prev = (prev * (period as f64 - 1.0) + tr[i]) / period as f64;
        out[i] = prev;
    }
    out
}
