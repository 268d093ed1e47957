//! Duplicate/gap resolver: sort, dedupe (keep first), count gaps.
//!
//! Rows are stably sorted by timestamp; for a repeated timestamp the row that
//! came first in the input survives. Gaps are counted, never filled. The
//! output is checked to be strictly increasing; anything else is a bug and
//! aborts the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;
use tracing::{info, warn};

use crate::domain::candle::is_sane_ohlc;
use crate::domain::timestamp_from_millis;
use crate::error::DataIntegrityError;
use crate::series::PriceSeries;

/// Resolver settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Expected spacing between bars. When absent the most frequent step is used.
    #[serde(default)]
    pub expected_interval_ms: Option<i64>,
}

/// What the resolver found and removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub original_len: usize,
    pub resolved_len: usize,
    pub duplicate_removed_count: usize,
    pub first_duplicate_ts: Option<DateTime<Utc>>,
    pub last_duplicate_ts: Option<DateTime<Utc>>,
    /// Dropped duplicates whose OHLC differed from the surviving row.
    pub conflicting_duplicate_count: usize,
    /// Whether the input had to be reordered.
    pub reordered: bool,
    pub expected_interval_ms: Option<i64>,
    pub gap_count: usize,
    /// Bars missing inside gaps, at the expected interval.
    pub missing_bar_count: u64,
    /// Rows failing the OHLC sanity check. Kept, only counted.
    pub insane_bar_count: usize,
}

/// A series whose timestamps are known to be strictly increasing.
///
/// Only `resolve` constructs one, so holding a `ResolvedSeries` is proof the
/// ordering invariant was checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSeries(PriceSeries);

impl ResolvedSeries {
    pub fn into_inner(self) -> PriceSeries {
        self.0
    }
}

impl Deref for ResolvedSeries {
    type Target = PriceSeries;

    fn deref(&self) -> &PriceSeries {
        &self.0
    }
}

/// Sort, dedupe and audit a series.
pub fn resolve(
    series: PriceSeries,
    config: &ResolverConfig,
) -> Result<(ResolvedSeries, ResolutionReport), DataIntegrityError> {
    let n = series.len();
    let ts = series.timestamps();

    let mut order: Vec<usize> = (0..n).collect();
    // Stable: equal timestamps keep their input order, so the first occurrence leads.
    order.sort_by_key(|&row| ts[row]);
    let reordered = order.iter().enumerate().any(|(pos, &row)| pos != row);

    let mut report = ResolutionReport {
        original_len: n,
        reordered,
        ..ResolutionReport::default()
    };

    let mut kept: Vec<usize> = Vec::with_capacity(n);
    for &row in &order {
        let Some(&survivor) = kept.last() else {
            kept.push(row);
            continue;
        };
        if ts[row] != ts[survivor] {
            kept.push(row);
            continue;
        }

        report.duplicate_removed_count += 1;
        let when = timestamp_from_millis(ts[row]);
        if report.first_duplicate_ts.is_none() {
            report.first_duplicate_ts = Some(when);
        }
        report.last_duplicate_ts = Some(when);
        if !same_ohlc(&series, survivor, row) {
            report.conflicting_duplicate_count += 1;
        }
    }

    let resolved = if reordered || kept.len() != n {
        series.gather(&kept)
    } else {
        series
    };

    verify_strictly_increasing(resolved.timestamps())?;

    let interval = config
        .expected_interval_ms
        .filter(|&ms| ms > 0)
        .or_else(|| dominant_step(resolved.timestamps()));
    report.expected_interval_ms = interval;
    if let Some(interval) = interval {
        let (gaps, missing) = count_gaps(resolved.timestamps(), interval);
        report.gap_count = gaps;
        report.missing_bar_count = missing;
    }

    report.insane_bar_count = (0..resolved.len())
        .filter(|&i| {
            !is_sane_ohlc(
                resolved.open()[i],
                resolved.high()[i],
                resolved.low()[i],
                resolved.close()[i],
            )
        })
        .count();
    report.resolved_len = resolved.len();

    if report.conflicting_duplicate_count > 0 {
        warn!(
            symbol = resolved.symbol(),
            conflicting = report.conflicting_duplicate_count,
            "duplicate rows with differing OHLC dropped, first occurrence kept"
        );
    }
    info!(
        symbol = resolved.symbol(),
        original = report.original_len,
        resolved = report.resolved_len,
        duplicates = report.duplicate_removed_count,
        gaps = report.gap_count,
        "series resolved"
    );

    Ok((ResolvedSeries(resolved), report))
}

/// Fail with the first offending row if timestamps are not strictly increasing.
pub fn verify_strictly_increasing(timestamps: &[i64]) -> Result<(), DataIntegrityError> {
    match timestamps.windows(2).position(|w| w[1] <= w[0]) {
        Some(pos) => Err(DataIntegrityError::NonMonotonic {
            index: pos + 1,
            previous: timestamps[pos],
            current: timestamps[pos + 1],
        }),
        None => Ok(()),
    }
}

fn same_ohlc(series: &PriceSeries, a: usize, b: usize) -> bool {
    let eq = |col: &[f64]| col[a] == col[b] || (col[a].is_nan() && col[b].is_nan());
    eq(series.open()) && eq(series.high()) && eq(series.low()) && eq(series.close())
}

/// Most frequent positive step between consecutive timestamps; ties go to the smaller step.
fn dominant_step(timestamps: &[i64]) -> Option<i64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for w in timestamps.windows(2) {
        let step = w[1] - w[0];
        if step > 0 {
            *counts.entry(step).or_default() += 1;
        }
    }
    // BTreeMap iterates ascending, and max_by_key keeps the last maximum, so
    // iterate in reverse to let the smallest step win a tie.
    counts
        .into_iter()
        .rev()
        .max_by_key(|&(_, count)| count)
        .map(|(step, _)| step)
}

fn count_gaps(timestamps: &[i64], interval: i64) -> (usize, u64) {
    let mut gaps = 0;
    let mut missing = 0u64;
    for w in timestamps.windows(2) {
        let step = w[1] - w[0];
        if step > interval {
            gaps += 1;
            missing += ((step / interval) - 1).max(0) as u64;
        }
    }
    (gaps, missing)
}
