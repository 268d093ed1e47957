//! Columnar price series and indicator columns.
//!
//! The series is the engine's only market-data representation: one `Vec` per
//! field, indexed by row. Indicator values are precomputed by an enrichment
//! collaborator and stored as named columns; `f64::NAN` marks warm-up rows.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{timestamp_from_millis, Candle};
use crate::error::DataIntegrityError;

/// Column names with fixed meaning in an input frame.
const CORE_COLUMNS: [&str; 5] = ["timestamp", "open", "high", "low", "close"];

/// Named indicator columns.
///
/// Stored in a `BTreeMap` so iteration order (and therefore every snapshot
/// and digest built from it) is the same on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorColumns {
    columns: BTreeMap<String, Vec<f64>>,
}

impl IndicatorColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a named indicator series.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    /// Raw value at a row (may be NaN during warm-up).
    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        self.columns.get(name).and_then(|v| v.get(index).copied())
    }

    /// Defined value at a row; warm-up NaN and missing columns read as `None`.
    pub fn defined(&self, name: &str, index: usize) -> Option<f64> {
        self.get(name, index).filter(|v| !v.is_nan())
    }

    /// Get the full series for a named indicator.
    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of indicator series stored.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn gather(&self, rows: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| (name.clone(), rows.iter().map(|&r| values[r]).collect()))
            .collect();
        Self { columns }
    }
}

/// Ordered, time-indexed OHLC columns plus indicator columns for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    /// Epoch milliseconds, UTC.
    timestamps: Vec<i64>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    indicators: IndicatorColumns,
}

impl PriceSeries {
    /// Build a series, checking every column has one value per timestamp.
    pub fn new(
        symbol: impl Into<String>,
        timestamps: Vec<i64>,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
        indicators: IndicatorColumns,
    ) -> Result<Self, DataIntegrityError> {
        let expected = timestamps.len();
        let check = |column: &str, actual: usize| {
            if actual == expected {
                Ok(())
            } else {
                Err(DataIntegrityError::ColumnLength {
                    column: column.to_string(),
                    expected,
                    actual,
                })
            }
        };
        check("open", open.len())?;
        check("high", high.len())?;
        check("low", low.len())?;
        check("close", close.len())?;
        for (name, values) in indicators.iter() {
            check(name, values.len())?;
        }

        Ok(Self {
            symbol: symbol.into(),
            timestamps,
            open,
            high,
            low,
            close,
            indicators,
        })
    }

    /// Add (or replace) an indicator column.
    pub fn with_indicator(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, DataIntegrityError> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(DataIntegrityError::ColumnLength {
                column: name,
                expected: self.len(),
                actual: values.len(),
            });
        }
        self.indicators.insert(name, values);
        Ok(self)
    }

    /// Convert an enriched polars frame into a series.
    ///
    /// Expects `timestamp` (i64 epoch ms) and f64 `open/high/low/close`; every
    /// other f64 column becomes an indicator. Null prices and indicator values
    /// become NaN; a null timestamp is an integrity error.
    pub fn from_frame(
        symbol: impl Into<String>,
        df: &DataFrame,
    ) -> Result<Self, DataIntegrityError> {
        let frame_err = |e: PolarsError| DataIntegrityError::Frame(e.to_string());
        let n = df.height();

        let ts_col = df
            .column("timestamp")
            .map_err(|_| DataIntegrityError::MissingColumn("timestamp".into()))?;
        let ts_ca = ts_col.i64().map_err(frame_err)?;
        let mut timestamps = Vec::with_capacity(n);
        for i in 0..n {
            timestamps.push(ts_ca.get(i).ok_or(DataIntegrityError::NullTimestamp(i))?);
        }

        let price_column = |name: &str| -> Result<Vec<f64>, DataIntegrityError> {
            let col = df
                .column(name)
                .map_err(|_| DataIntegrityError::MissingColumn(name.to_string()))?;
            let ca = col.f64().map_err(frame_err)?;
            Ok((0..n).map(|i| ca.get(i).unwrap_or(f64::NAN)).collect())
        };
        let open = price_column("open")?;
        let high = price_column("high")?;
        let low = price_column("low")?;
        let close = price_column("close")?;

        let mut indicators = IndicatorColumns::new();
        for column in df.get_columns() {
            let name = column.name().as_str();
            if CORE_COLUMNS.contains(&name) {
                continue;
            }
            // Non-float columns (symbol tags, flags) are not indicators.
            if let Ok(ca) = column.f64() {
                indicators.insert(name, (0..n).map(|i| ca.get(i).unwrap_or(f64::NAN)).collect());
            }
        }

        Self::new(symbol, timestamps, open, high, low, close, indicators)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn open(&self) -> &[f64] {
        &self.open
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn close(&self) -> &[f64] {
        &self.close
    }

    pub fn indicators(&self) -> &IndicatorColumns {
        &self.indicators
    }

    /// Timestamp of a row as UTC.
    pub fn timestamp(&self, index: usize) -> chrono::DateTime<chrono::Utc> {
        timestamp_from_millis(self.timestamps[index])
    }

    /// Lightweight read-only cursor over one row.
    pub fn view(&self, index: usize) -> BarView<'_> {
        debug_assert!(index < self.len(), "view index {index} out of range");
        BarView {
            series: self,
            index,
        }
    }

    /// Materialize one row as a `Candle` (audit and tests only).
    pub fn candle(&self, index: usize) -> Option<Candle> {
        if index >= self.len() {
            return None;
        }
        let indicators = self
            .indicators
            .iter()
            .map(|(name, values)| {
                let v = values[index];
                (name.to_string(), if v.is_nan() { None } else { Some(v) })
            })
            .collect();
        Some(Candle {
            timestamp: self.timestamp(index),
            open: self.open[index],
            high: self.high[index],
            low: self.low[index],
            close: self.close[index],
            indicators,
        })
    }

    /// Approximate heap footprint of the columns, in bytes.
    pub fn byte_size(&self) -> u64 {
        let per_row = std::mem::size_of::<i64>() + 4 * std::mem::size_of::<f64>();
        let indicator_row = self.indicators.len() * std::mem::size_of::<f64>();
        ((per_row + indicator_row) * self.len()) as u64
    }

    /// New series holding `rows` in the given order.
    pub(crate) fn gather(&self, rows: &[usize]) -> Self {
        let pick = |col: &[f64]| rows.iter().map(|&r| col[r]).collect::<Vec<f64>>();
        Self {
            symbol: self.symbol.clone(),
            timestamps: rows.iter().map(|&r| self.timestamps[r]).collect(),
            open: pick(&self.open),
            high: pick(&self.high),
            low: pick(&self.low),
            close: pick(&self.close),
            indicators: self.indicators.gather(rows),
        }
    }
}

/// Read-only cursor over one row of a series.
///
/// Policies receive this instead of a `Candle` so evaluating them never
/// allocates.
#[derive(Debug, Clone, Copy)]
pub struct BarView<'a> {
    series: &'a PriceSeries,
    index: usize,
}

impl<'a> BarView<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.series.timestamps[self.index]
    }

    pub fn open(&self) -> f64 {
        self.series.open[self.index]
    }

    pub fn high(&self) -> f64 {
        self.series.high[self.index]
    }

    pub fn low(&self) -> f64 {
        self.series.low[self.index]
    }

    pub fn close(&self) -> f64 {
        self.series.close[self.index]
    }

    /// Defined indicator value at this row; `None` during warm-up or if absent.
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.series.indicators.defined(name, self.index)
    }
}
