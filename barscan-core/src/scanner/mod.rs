//! Batch scanner: evaluates a strategy's entry rules over whole columns.
//!
//! The resolved series is processed in fixed-size chunks. Per chunk, an
//! eligibility mask (every required indicator defined) is built once and each
//! requested direction's conditions are ANDed into its own mask. Masks are
//! reused across chunks; no per-bar object is created except the emitted
//! signals themselves.

pub mod condition;

pub use condition::{CompareOp, Condition, Operand};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, info};

use crate::alloc::AllocationLedger;
use crate::domain::{Direction, ScanDirection, Signal};
use crate::progress::{Cancelled, ProgressDispatcher};
use crate::resolver::ResolvedSeries;
use crate::series::PriceSeries;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Named set of entry rules.
///
/// Conditions within a direction are ANDed. A direction with no conditions
/// never fires. SHORT rules are written out by the author; nothing is
/// mirrored automatically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStrategy {
    pub name: String,
    #[serde(default)]
    pub long: Vec<Condition>,
    #[serde(default)]
    pub short: Vec<Condition>,
    /// Minimum bars between two signals of the same direction.
    #[serde(default)]
    pub cooldown_bars: usize,
    /// Declared indicator dependencies, in declaration order.
    #[serde(default)]
    pub indicators: Vec<String>,
}

impl ScanStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_long(mut self, condition: Condition) -> Self {
        self.long.push(condition);
        self
    }

    pub fn with_short(mut self, condition: Condition) -> Self {
        self.short.push(condition);
        self
    }

    pub fn with_indicator(mut self, name: impl Into<String>) -> Self {
        self.indicators.push(name.into());
        self
    }

    pub fn with_cooldown(mut self, bars: usize) -> Self {
        self.cooldown_bars = bars;
        self
    }

    /// Declared names followed by any referenced only in conditions; no repeats.
    pub fn indicator_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let referenced = self
            .long
            .iter()
            .chain(&self.short)
            .flat_map(|c| c.indicator_names());
        for name in self.indicators.iter().map(String::as_str).chain(referenced) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    fn conditions(&self, direction: Direction) -> &[Condition] {
        match direction {
            Direction::Long => &self.long,
            Direction::Short => &self.short,
        }
    }
}

/// Signals found by one scan, in bar order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOutput {
    pub signals: Vec<Signal>,
    pub long_positions: Vec<usize>,
    pub short_positions: Vec<usize>,
    pub bars_scanned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchScanner {
    chunk_size: usize,
}

impl Default for BatchScanner {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl BatchScanner {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Scan the series for `direction`, ticking progress once per chunk.
    ///
    /// On a bar where both directions fire, the LONG signal comes first.
    pub fn scan(
        &self,
        series: &ResolvedSeries,
        strategy: &ScanStrategy,
        direction: ScanDirection,
        progress: &mut ProgressDispatcher<'_>,
        ledger: &mut AllocationLedger,
    ) -> Result<ScanOutput, Cancelled> {
        let n = series.len();
        let required = strategy.indicator_names();
        let chunk = self.chunk_size.min(n.max(1));

        let mut eligible = vec![false; chunk];
        let mut long_mask = vec![false; chunk];
        let mut short_mask = vec![false; chunk];
        ledger.record::<bool>("scan.eligible", chunk);
        ledger.record::<bool>("scan.long_mask", chunk);
        ledger.record::<bool>("scan.short_mask", chunk);

        let mut out = ScanOutput {
            bars_scanned: n,
            ..ScanOutput::default()
        };
        let mut last_fired: [Option<usize>; 2] = [None, None];

        let mut start = 0;
        while start < n {
            let end = (start + chunk).min(n);
            let len = end - start;

            fill_eligibility(series, &required, start..end, &mut eligible[..len]);
            for dir in direction.directions() {
                let mask = match dir {
                    Direction::Long => &mut long_mask[..len],
                    Direction::Short => &mut short_mask[..len],
                };
                evaluate(series, strategy.conditions(*dir), start..end, &eligible[..len], mask);
            }

            for k in 0..len {
                let row = start + k;
                for dir in direction.directions() {
                    let (fired, slot) = match dir {
                        Direction::Long => (long_mask[k], 0),
                        Direction::Short => (short_mask[k], 1),
                    };
                    if !fired {
                        continue;
                    }
                    if let Some(prev) = last_fired[slot] {
                        if row - prev < strategy.cooldown_bars {
                            continue;
                        }
                    }
                    last_fired[slot] = Some(row);
                    out.signals.push(snapshot(series, *dir, row, &required));
                    match dir {
                        Direction::Long => out.long_positions.push(row),
                        Direction::Short => out.short_positions.push(row),
                    }
                }
            }

            debug!(start, end, signals = out.signals.len(), "chunk scanned");
            start = end;
            if let Err(cancelled) = progress.tick(end as f64 / n as f64) {
                release_masks(ledger, chunk);
                return Err(cancelled);
            }
        }
        // The masks die with this call; only the signal buffers outlive it.
        release_masks(ledger, chunk);

        ledger.record::<Signal>("scan.signals", out.signals.capacity());
        ledger.record::<usize>("scan.long_positions", out.long_positions.capacity());
        ledger.record::<usize>("scan.short_positions", out.short_positions.capacity());
        ledger.add_baseline((n + out.signals.len()) as u64);

        info!(
            strategy = %strategy.name,
            bars = n,
            long = out.long_positions.len(),
            short = out.short_positions.len(),
            "scan complete"
        );
        Ok(out)
    }
}

fn fill_eligibility(
    series: &PriceSeries,
    required: &[String],
    rows: Range<usize>,
    mask: &mut [bool],
) {
    mask.fill(true);
    for name in required {
        match series.indicators().get_series(name) {
            Some(values) => {
                for (slot, v) in mask.iter_mut().zip(&values[rows.clone()]) {
                    *slot = *slot && !v.is_nan();
                }
            }
            None => {
                mask.fill(false);
                return;
            }
        }
    }
}

fn evaluate(
    series: &PriceSeries,
    conditions: &[Condition],
    rows: Range<usize>,
    eligible: &[bool],
    mask: &mut [bool],
) {
    if conditions.is_empty() {
        mask.fill(false);
        return;
    }
    mask.copy_from_slice(eligible);
    for condition in conditions {
        condition.apply(series, rows.clone(), mask);
    }
}

fn snapshot(series: &PriceSeries, direction: Direction, row: usize, required: &[String]) -> Signal {
    let mut signal = Signal::new(series.symbol(), direction, series.timestamp(row), row);
    signal.metadata = required
        .iter()
        .filter_map(|name| {
            series
                .indicators()
                .defined(name, row)
                .map(|v| (name.clone(), v))
        })
        .collect::<BTreeMap<_, _>>();
    signal
}

fn release_masks(ledger: &mut AllocationLedger, chunk: usize) {
    for _ in 0..3 {
        ledger.release_buffer::<bool>(chunk);
    }
}
