//! Performance reporter: one record per run, built after the simulator
//! finishes.
//!
//! Metric functions are pure: trade list (and starting balance) in, scalar
//! out. The reporter only assembles what the pipeline measured.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alloc::AllocationLedger;
use crate::determinism::{EnvironmentFingerprint, RunDigest, RunId};
use crate::domain::{ClosedTrade, SkipEvent};
use crate::guard::MemoryHeadroom;
use crate::indicators::IndicatorAudit;
use crate::progress::PhaseStats;
use crate::resolver::ResolutionReport;

/// Manifest reference passed through from the ingestion side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default)]
    pub manifest_path: Option<String>,
    #[serde(default)]
    pub manifest_checksum: Option<String>,
}

// ─── Trade statistics ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub trade_count: usize,
    pub winners: usize,
    pub losers: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    /// Largest peak-to-trough drop of the trade-by-trade equity path, as a
    /// negative fraction.
    pub max_drawdown: f64,
    pub avg_r: f64,
    pub exits_by_reason: BTreeMap<String, usize>,
}

impl TradeStats {
    pub fn compute(trades: &[ClosedTrade], initial_balance: f64) -> Self {
        let mut exits_by_reason = BTreeMap::new();
        for t in trades {
            *exits_by_reason.entry(t.exit_reason.as_str().to_string()).or_insert(0) += 1;
        }
        let winners = trades.iter().filter(|t| t.is_winner()).count();
        let losers = trades.iter().filter(|t| t.pnl < 0.0).count();
        Self {
            trade_count: trades.len(),
            winners,
            losers,
            win_rate: win_rate(trades),
            total_pnl: trades.iter().map(|t| t.pnl).sum(),
            gross_profit: gross_profit(trades),
            gross_loss: gross_loss(trades),
            profit_factor: profit_factor(trades),
            max_drawdown: max_drawdown(&equity_path(trades, initial_balance)),
            avg_r: avg_r(trades),
            exits_by_reason,
        }
    }
}

/// Equity after each close, starting with the initial balance.
pub fn equity_path(trades: &[ClosedTrade], initial_balance: f64) -> Vec<f64> {
    let mut path = Vec::with_capacity(trades.len() + 1);
    let mut equity = initial_balance;
    path.push(equity);
    for t in trades {
        equity += t.pnl;
        path.push(equity);
    }
    path
}

pub fn win_rate(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

fn gross_profit(trades: &[ClosedTrade]) -> f64 {
    trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum()
}

fn gross_loss(trades: &[ClosedTrade]) -> f64 {
    trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl.abs()).sum()
}

/// Gross profit over gross loss, capped at 100 when there are no losses.
pub fn profit_factor(trades: &[ClosedTrade]) -> f64 {
    let profit = gross_profit(trades);
    let loss = gross_loss(trades);
    if loss < 1e-10 {
        return if profit > 0.0 { 100.0 } else { 0.0 };
    }
    (profit / loss).min(100.0)
}

/// Maximum drawdown as a negative fraction (e.g. -0.15 for 15%).
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let Some(&first) = equity.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut worst = 0.0_f64;
    for &eq in equity {
        peak = peak.max(eq);
        if peak > 0.0 {
            worst = worst.min((eq - peak) / peak);
        }
    }
    worst
}

pub fn avg_r(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.r_multiple).sum::<f64>() / trades.len() as f64
}

/// Skip counts keyed by machine-readable reason code.
pub fn skip_summary(skips: &[SkipEvent]) -> BTreeMap<String, usize> {
    let mut summary = BTreeMap::new();
    for skip in skips {
        *summary.entry(skip.reason.code().to_string()).or_insert(0) += 1;
    }
    summary
}

// ─── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    // ── Identity ──
    pub run_id: RunId,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub deterministic_mode: bool,
    pub seed: u64,
    pub environment: EnvironmentFingerprint,
    pub manifest_path: Option<String>,
    pub manifest_checksum: Option<String>,

    // ── Timing ──
    pub scan_duration: Duration,
    pub simulation_duration: Duration,
    pub phases: Vec<PhaseStats>,

    // ── Memory and allocation ──
    /// Series columns plus the peak of live engine buffers, in bytes.
    pub peak_memory: u64,
    pub memory_headroom: Option<MemoryHeadroom>,
    pub allocation_count: u64,
    pub allocation_baseline_count: u64,
    pub allocation_reduction_pct: f64,

    // ── Counts ──
    pub candle_count: usize,
    pub signal_count: usize,
    pub trade_count: usize,
    pub skip_count: usize,

    // ── Data resolution ──
    pub duplicate_removed_count: usize,
    pub first_duplicate_timestamp: Option<DateTime<Utc>>,
    pub last_duplicate_timestamp: Option<DateTime<Utc>>,
    pub resolution: ResolutionReport,

    // ── Progress ──
    pub progress_emission_count: u64,
    pub progress_overhead_pct: f64,

    // ── Indicators ──
    pub indicator_names: Vec<String>,
    pub indicator_audit: IndicatorAudit,

    // ── Outcome ──
    pub initial_balance: f64,
    pub final_equity: f64,
    pub stats: TradeStats,
    pub skip_summary: BTreeMap<String, usize>,
    pub skips: Vec<SkipEvent>,
    pub digest: RunDigest,
}

/// Everything the pipeline measured, borrowed for assembly.
#[derive(Debug)]
pub struct ReportInputs<'a> {
    pub run_id: RunId,
    pub symbol: &'a str,
    pub deterministic_mode: bool,
    pub seed: u64,
    pub environment: &'a EnvironmentFingerprint,
    pub provenance: &'a Provenance,
    pub scan_duration: Duration,
    pub simulation_duration: Duration,
    pub phases: Vec<PhaseStats>,
    pub series_bytes: u64,
    pub memory_headroom: Option<MemoryHeadroom>,
    pub ledger: &'a AllocationLedger,
    pub candle_count: usize,
    pub signal_count: usize,
    pub resolution: &'a ResolutionReport,
    pub progress_emission_count: u64,
    pub progress_overhead_pct: f64,
    pub indicator_names: &'a [String],
    pub indicator_audit: &'a IndicatorAudit,
    pub initial_balance: f64,
    pub final_equity: f64,
    pub trades: &'a [ClosedTrade],
    pub skips: &'a [SkipEvent],
    pub digest: RunDigest,
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceReporter {
    created_at: Option<DateTime<Utc>>,
}

impl PerformanceReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `created_at` instead of reading the clock.
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn build(&self, inputs: ReportInputs<'_>) -> PerformanceReport {
        let ReportInputs {
            run_id,
            symbol,
            deterministic_mode,
            seed,
            environment,
            provenance,
            scan_duration,
            simulation_duration,
            phases,
            series_bytes,
            memory_headroom,
            ledger,
            candle_count,
            signal_count,
            resolution,
            progress_emission_count,
            progress_overhead_pct,
            indicator_names,
            indicator_audit,
            initial_balance,
            final_equity,
            trades,
            skips,
            digest,
        } = inputs;

        PerformanceReport {
            run_id,
            symbol: symbol.to_string(),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            deterministic_mode,
            seed,
            environment: environment.clone(),
            manifest_path: provenance.manifest_path.clone(),
            manifest_checksum: provenance.manifest_checksum.clone(),
            scan_duration,
            simulation_duration,
            phases,
            peak_memory: series_bytes + ledger.peak_bytes(),
            memory_headroom,
            allocation_count: ledger.allocation_count(),
            allocation_baseline_count: ledger.baseline_count(),
            allocation_reduction_pct: ledger.reduction_pct(),
            candle_count,
            signal_count,
            trade_count: trades.len(),
            skip_count: skips.len(),
            duplicate_removed_count: resolution.duplicate_removed_count,
            first_duplicate_timestamp: resolution.first_duplicate_ts,
            last_duplicate_timestamp: resolution.last_duplicate_ts,
            resolution: resolution.clone(),
            progress_emission_count,
            progress_overhead_pct,
            indicator_names: indicator_names.to_vec(),
            indicator_audit: indicator_audit.clone(),
            initial_balance,
            final_equity,
            stats: TradeStats::compute(trades, initial_balance),
            skip_summary: skip_summary(skips),
            skips: skips.to_vec(),
            digest,
        }
    }
}
