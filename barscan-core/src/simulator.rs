//! Batch simulator: resolves each order's exit against the subsequent bars.
//!
//! # Exit rules (per bar, from the first bar after entry)
//! 1. Trailing orders update their stop from the *previous* bar's snapshot.
//! 2. Stop touched (low ≤ stop for LONG, high ≥ stop for SHORT) → exit at the
//!    stop, or at the open if the bar gapped through it.
//! 3. Otherwise target touched → exit at the target.
//! 4. Otherwise the holding limit, if set, exits at the bar's close.
//!
//! When stop and target are both inside one bar's range the stop wins: the
//! path inside a bar is unknown, so the adverse outcome is assumed.
//! An order still open when data ends exits at the last close with `timeout`.
//!
//! # One position at a time
//! Signals are taken in bar order. A signal on or before the open position's
//! exit bar is dropped with `position_already_open`; nothing is queued.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alloc::AllocationLedger;
use crate::domain::{
    ClosedTrade, Direction, EntryMode, ExitReason, OrderPlan, Signal, SkipEvent, SkipReason,
};
use crate::error::ValidationError;
use crate::progress::{Cancelled, ProgressDispatcher};
use crate::resolver::ResolvedSeries;
use crate::risk::{PortfolioState, RiskManager, StopPolicy, TrailState};
use crate::series::PriceSeries;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub entry_mode: EntryMode,
    /// Close positions after this many bars held.
    #[serde(default)]
    pub max_holding_bars: Option<usize>,
}

/// Where and why one order left the market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitResolution {
    pub exit_index: usize,
    pub exit_price: f64,
    pub reason: ExitReason,
    /// Stop in force at exit.
    pub final_stop: f64,
}

/// Walk forward from the order's first check bar until it exits.
///
/// `trail` must be `Some` for trailing orders; its stop is updated in place.
/// The caller guarantees `plan.first_check_index() < series.len()`.
pub fn resolve_exit(
    plan: &OrderPlan,
    series: &PriceSeries,
    stop_policy: &dyn StopPolicy,
    mut trail: Option<&mut TrailState>,
    max_holding_bars: Option<usize>,
) -> ExitResolution {
    let direction = plan.direction();
    let first = plan.first_check_index();
    let (open, high, low, close) = (series.open(), series.high(), series.low(), series.close());
    let mut stop = plan.stop_price;

    for j in first..series.len() {
        if let Some(state) = trail.as_deref_mut() {
            if j > plan.entry_index {
                let prev = series.view(j - 1);
                state.observe_profit(prev.close());
                let proposed = stop_policy.update_stop(stop, plan.entry_price, direction, &prev);
                stop = state.ratchet(proposed);
            }
        }

        let (stop_hit, target_hit) = match direction {
            Direction::Long => (
                low[j] <= stop,
                plan.target_price.is_some_and(|t| high[j] >= t),
            ),
            Direction::Short => (
                high[j] >= stop,
                plan.target_price.is_some_and(|t| low[j] <= t),
            ),
        };

        if stop_hit {
            let gapped = match direction {
                Direction::Long => open[j] < stop,
                Direction::Short => open[j] > stop,
            };
            let reason = if stop != plan.stop_price {
                ExitReason::Trailing
            } else {
                ExitReason::Stop
            };
            return ExitResolution {
                exit_index: j,
                exit_price: if gapped { open[j] } else { stop },
                reason,
                final_stop: stop,
            };
        }

        if target_hit {
            if let Some(target) = plan.target_price {
                return ExitResolution {
                    exit_index: j,
                    exit_price: target,
                    reason: ExitReason::Target,
                    final_stop: stop,
                };
            }
        }

        let held = j - first + 1;
        if max_holding_bars.is_some_and(|limit| held >= limit) {
            return ExitResolution {
                exit_index: j,
                exit_price: close[j],
                reason: ExitReason::Timeout,
                final_stop: stop,
            };
        }
    }

    let last = series.len() - 1;
    ExitResolution {
        exit_index: last,
        exit_price: close[last],
        reason: ExitReason::Timeout,
        final_stop: stop,
    }
}

/// Everything one simulation produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub trades: Vec<ClosedTrade>,
    pub skips: Vec<SkipEvent>,
    /// Orders that were opened, in the same order as `trades`.
    pub orders: Vec<OrderPlan>,
    /// Indexed by input position; `None` for skipped inputs.
    pub resolutions: Vec<Option<ExitResolution>>,
    pub final_equity: f64,
}

#[derive(Debug)]
pub struct BatchSimulator<'r> {
    risk: &'r RiskManager,
    config: SimulationConfig,
}

impl<'r> BatchSimulator<'r> {
    pub fn new(risk: &'r RiskManager, config: SimulationConfig) -> Self {
        Self { risk, config }
    }

    /// Build and resolve an order for each signal, one position at a time.
    ///
    /// Equity starts at `initial` and is updated after every close before
    /// the next order is sized.
    pub fn run(
        &self,
        series: &ResolvedSeries,
        signals: &[Signal],
        initial: PortfolioState,
        progress: &mut ProgressDispatcher<'_>,
        ledger: &mut AllocationLedger,
    ) -> Result<SimulationOutput, Cancelled> {
        let refs: Vec<&Signal> = signals.iter().collect();
        ledger.record::<&Signal>("sim.signal_refs", refs.len());
        let result = self.drive(
            series,
            &refs,
            |k, portfolio| self.risk.build_order(&signals[k], series, portfolio),
            initial,
            progress,
            ledger,
        );
        ledger.release_buffer::<&Signal>(refs.len());
        result
    }

    /// Resolve prebuilt orders. Each must use the simulator's stop policy.
    pub fn simulate_plans(
        &self,
        series: &ResolvedSeries,
        plans: &[OrderPlan],
        initial: PortfolioState,
        progress: &mut ProgressDispatcher<'_>,
        ledger: &mut AllocationLedger,
    ) -> Result<SimulationOutput, Cancelled> {
        let refs: Vec<&Signal> = plans.iter().map(|p| &p.signal).collect();
        ledger.record::<&Signal>("sim.signal_refs", refs.len());
        let active = self.risk.stop_policy().name();
        let max_size = self.risk.account().max_position_size;
        let result = self.drive(
            series,
            &refs,
            |k, _portfolio| {
                let plan = &plans[k];
                if plan.stop_policy_type != active {
                    return Err(ValidationError::PolicyMismatch {
                        order: plan.stop_policy_type.clone(),
                        active: active.to_string(),
                    }
                    .into());
                }
                if plan.first_check_index() >= series.len() {
                    return Err(SkipReason::NoSubsequentBars);
                }
                plan.validate(max_size)?;
                Ok(plan.clone())
            },
            initial,
            progress,
            ledger,
        );
        ledger.release_buffer::<&Signal>(refs.len());
        result
    }

    fn drive<F>(
        &self,
        series: &ResolvedSeries,
        signals: &[&Signal],
        mut build: F,
        initial: PortfolioState,
        progress: &mut ProgressDispatcher<'_>,
        ledger: &mut AllocationLedger,
    ) -> Result<SimulationOutput, Cancelled>
    where
        F: FnMut(usize, &PortfolioState) -> Result<OrderPlan, SkipReason>,
    {
        let count = signals.len();
        let account = self.risk.account();
        let policy = self.risk.stop_policy();

        // Stable: equal bars keep input order, so LONG stays ahead of SHORT.
        let mut order: Vec<usize> = (0..count).collect();
        order.sort_by_key(|&k| signals[k].bar_index);

        let mut resolutions: Vec<Option<ExitResolution>> = vec![None; count];
        let mut trail_arena: Vec<Option<TrailState>> = vec![None; count];
        let mut out = SimulationOutput {
            trades: Vec::with_capacity(count),
            skips: Vec::with_capacity(count),
            orders: Vec::with_capacity(count),
            ..SimulationOutput::default()
        };
        ledger.record::<usize>("sim.order", count);
        ledger.record::<Option<ExitResolution>>("sim.resolutions", count);
        ledger.record::<Option<TrailState>>("sim.trail_arena", count);
        ledger.record::<ClosedTrade>("sim.trades", count);
        ledger.record::<SkipEvent>("sim.skips", count);
        ledger.record::<OrderPlan>("sim.orders", count);
        ledger.add_baseline(series.len() as u64);

        let mut portfolio = initial;
        let mut open_until: Option<(usize, u64)> = None;
        let mut next_trade_id: u64 = 0;

        for (done, &k) in order.iter().enumerate() {
            let signal = signals[k];

            let outcome = match open_until {
                Some((exit_index, trade_id)) if signal.bar_index <= exit_index => {
                    Err(SkipReason::PositionAlreadyOpen {
                        open_trade_id: trade_id,
                    })
                }
                _ => build(k, &portfolio),
            };

            match outcome {
                Err(reason) => {
                    debug!(
                        bar = signal.bar_index,
                        direction = %signal.direction,
                        reason = reason.code(),
                        "signal skipped"
                    );
                    out.skips.push(SkipEvent {
                        signal_index: k,
                        symbol: signal.symbol.clone(),
                        direction: signal.direction,
                        timestamp: signal.timestamp,
                        bar_index: signal.bar_index,
                        reason,
                    });
                }
                Ok(plan) => {
                    if let Some(params) = plan.trailing_params {
                        trail_arena[k] = Some(TrailState::new(
                            plan.direction(),
                            plan.entry_price,
                            plan.stop_price,
                            params.trail_trigger_r,
                        ));
                    }
                    let exit = resolve_exit(
                        &plan,
                        series,
                        policy,
                        trail_arena[k].as_mut(),
                        self.config.max_holding_bars,
                    );
                    // Trail state lives only while the order is open.
                    trail_arena[k] = None;
                    resolutions[k] = Some(exit);

                    let value_per_unit = account.pip_value / account.pip_size;
                    let trade = close_trade(next_trade_id, &plan, &exit, series, value_per_unit);
                    portfolio.equity += trade.pnl;
                    open_until = Some((exit.exit_index, next_trade_id));
                    next_trade_id += 1;

                    out.trades.push(trade);
                    out.orders.push(plan);
                }
            }

            if let Err(cancelled) = progress.tick((done + 1) as f64 / count as f64) {
                release_scratch(ledger, count);
                return Err(cancelled);
            }
        }
        release_scratch(ledger, count);

        out.resolutions = resolutions;
        out.final_equity = portfolio.equity;
        info!(
            symbol = series.symbol(),
            signals = count,
            trades = out.trades.len(),
            skips = out.skips.len(),
            final_equity = out.final_equity,
            "simulation complete"
        );
        Ok(out)
    }
}

/// Ordering and trail buffers are dropped when `drive` returns.
fn release_scratch(ledger: &mut AllocationLedger, count: usize) {
    ledger.release_buffer::<usize>(count);
    ledger.release_buffer::<Option<TrailState>>(count);
}

fn close_trade(
    trade_id: u64,
    plan: &OrderPlan,
    exit: &ExitResolution,
    series: &PriceSeries,
    value_per_price_unit: f64,
) -> ClosedTrade {
    let sign = plan.direction().sign();
    let moved = (exit.exit_price - plan.entry_price) * sign;
    let risk = plan.initial_risk();
    ClosedTrade {
        trade_id,
        symbol: plan.signal.symbol.clone(),
        direction: plan.direction(),
        entry_index: plan.entry_index,
        exit_index: exit.exit_index,
        entry_timestamp: series.timestamp(plan.entry_index),
        exit_timestamp: series.timestamp(exit.exit_index),
        entry_price: plan.entry_price,
        exit_price: exit.exit_price,
        stop_price: plan.stop_price,
        target_price: plan.target_price,
        final_stop: exit.final_stop,
        position_size: plan.position_size,
        pnl: moved * plan.position_size * value_per_price_unit,
        r_multiple: if risk > 0.0 { moved / risk } else { 0.0 },
        bars_held: exit.exit_index + 1 - plan.first_check_index(),
        exit_reason: exit.reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timestamp_from_millis;
    use crate::progress::{NullSink, ProgressConfig};
    use crate::resolver::{resolve, ResolverConfig};
    use crate::risk::{AccountParams, PolicyRegistry, PolicySpec, RiskConfig};
    use crate::series::IndicatorColumns;

    /// Bars as (open, high, low, close).
    fn series(bars: &[(f64, f64, f64, f64)]) -> ResolvedSeries {
        let n = bars.len();
        let mut iv = IndicatorColumns::new();
        iv.insert("atr_3", vec![1.0; n]);
        let s = PriceSeries::new(
            "EURUSD",
            (0..n as i64).map(|i| i * 60_000).collect(),
            bars.iter().map(|b| b.0).collect(),
            bars.iter().map(|b| b.1).collect(),
            bars.iter().map(|b| b.2).collect(),
            bars.iter().map(|b| b.3).collect(),
            iv,
        )
        .unwrap();
        resolve(s, &ResolverConfig::default()).unwrap().0
    }

    fn risk(stop: PolicySpec, tp: PolicySpec) -> RiskManager {
        let config = RiskConfig {
            stop,
            take_profit: tp,
            sizer: PolicySpec::new("fixed_size_sizer").with("size", 1.0),
            account: AccountParams {
                risk_pct: 0.01,
                pip_value: 1.0,
                pip_size: 1.0,
                lot_step: 0.0,
                max_position_size: 10.0,
            },
        };
        RiskManager::from_config(&config, &PolicyRegistry::with_defaults()).unwrap()
    }

    fn fixed(distance: f64) -> PolicySpec {
        PolicySpec::new("fixed_distance_stop").with("distance", distance)
    }

    fn rr(ratio: f64) -> PolicySpec {
        PolicySpec::new("risk_multiple_tp").with("rr_ratio", ratio)
    }

    fn long_at(bar: usize) -> Signal {
        Signal::new("EURUSD", Direction::Long, timestamp_from_millis(bar as i64 * 60_000), bar)
    }

    fn short_at(bar: usize) -> Signal {
        Signal::new("EURUSD", Direction::Short, timestamp_from_millis(bar as i64 * 60_000), bar)
    }

    fn simulate(
        rm: &RiskManager,
        config: SimulationConfig,
        s: &ResolvedSeries,
        signals: &[Signal],
    ) -> SimulationOutput {
        let mut sink = NullSink;
        let mut progress = ProgressDispatcher::new(ProgressConfig::default(), &mut sink);
        let mut ledger = AllocationLedger::new();
        BatchSimulator::new(rm, config)
            .run(s, signals, PortfolioState { equity: 1_000.0 }, &mut progress, &mut ledger)
            .unwrap()
    }

    #[test]
    fn scratch_buffers_are_released_after_run() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 101.0, 99.5, 100.8),
            (100.8, 104.5, 100.5, 104.0),
        ]);
        let rm = risk(fixed(2.0), rr(2.0));
        let mut sink = NullSink;
        let mut progress = ProgressDispatcher::new(ProgressConfig::default(), &mut sink);
        let mut ledger = AllocationLedger::new();
        BatchSimulator::new(&rm, SimulationConfig::default())
            .run(&s, &[long_at(0)], PortfolioState { equity: 1_000.0 }, &mut progress, &mut ledger)
            .unwrap();

        let scratch = (std::mem::size_of::<&Signal>()
            + std::mem::size_of::<usize>()
            + std::mem::size_of::<Option<TrailState>>()) as u64;
        assert_eq!(ledger.live_bytes(), ledger.peak_bytes() - scratch);
    }

    #[test]
    fn target_hit_exits_at_target() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 101.0, 99.5, 100.8),
            (100.8, 104.5, 100.5, 104.0),
        ]);
        let rm = risk(fixed(2.0), rr(2.0));
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(0)]);
        let trade = &out.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::Target);
        assert_eq!(trade.exit_price, 104.0);
        assert_eq!(trade.exit_index, 2);
        assert_eq!(trade.pnl, 4.0);
        assert_eq!(trade.r_multiple, 2.0);
        assert_eq!(trade.bars_held, 2);
        assert_eq!(out.final_equity, 1_004.0);
    }

    #[test]
    fn stop_wins_when_both_touched_in_one_bar() {
        let s = series(&[(100.0, 100.5, 99.5, 100.0), (100.0, 105.0, 97.0, 101.0)]);
        let rm = risk(fixed(2.0), rr(2.0));
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(0)]);
        assert_eq!(out.trades[0].exit_reason, ExitReason::Stop);
        assert_eq!(out.trades[0].exit_price, 98.0);
    }

    #[test]
    fn gap_through_stop_fills_at_open() {
        let s = series(&[(100.0, 100.5, 99.5, 100.0), (96.0, 96.5, 95.0, 95.5)]);
        let rm = risk(fixed(2.0), rr(2.0));
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(0)]);
        assert_eq!(out.trades[0].exit_price, 96.0);
        assert_eq!(out.trades[0].pnl, -4.0);
    }

    #[test]
    fn short_stop_and_target_mirror() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (99.0, 99.5, 95.5, 96.0),
        ]);
        let rm = risk(fixed(2.0), rr(2.0));
        let out = simulate(&rm, SimulationConfig::default(), &s, &[short_at(0)]);
        let trade = &out.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::Target);
        assert_eq!(trade.exit_price, 96.0);
        assert!(trade.pnl > 0.0);
    }

    #[test]
    fn runs_out_of_data_as_timeout() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 100.5, 99.5, 100.2),
            (100.2, 100.6, 99.8, 100.4),
        ]);
        let rm = risk(fixed(2.0), PolicySpec::new("no_tp"));
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(0)]);
        let trade = &out.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::Timeout);
        assert_eq!(trade.exit_index, 2);
        assert_eq!(trade.exit_price, 100.4);
    }

    #[test]
    fn holding_limit_times_out_at_close() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 100.5, 99.5, 100.1),
            (100.1, 100.6, 99.6, 100.3),
            (100.3, 100.7, 99.7, 100.5),
        ]);
        let rm = risk(fixed(2.0), PolicySpec::new("no_tp"));
        let config = SimulationConfig {
            max_holding_bars: Some(2),
            ..SimulationConfig::default()
        };
        let out = simulate(&rm, config, &s, &[long_at(0)]);
        assert_eq!(out.trades[0].exit_index, 2);
        assert_eq!(out.trades[0].exit_price, 100.3);
        assert_eq!(out.trades[0].bars_held, 2);
    }

    #[test]
    fn signal_during_open_position_is_skipped() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 100.5, 99.5, 100.2),
            (100.2, 100.6, 99.8, 100.4),
            (100.4, 105.0, 100.0, 104.0),
            (104.0, 104.5, 103.5, 104.0),
        ]);
        let rm = risk(fixed(2.0), rr(2.0));
        let signals = [long_at(0), long_at(1), long_at(3)];
        let out = simulate(&rm, SimulationConfig::default(), &s, &signals);
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].exit_index, 3);
        assert_eq!(out.skips.len(), 2);
        assert_eq!(
            out.skips[0].reason,
            SkipReason::PositionAlreadyOpen { open_trade_id: 0 }
        );
        assert_eq!(out.skips[0].reason.to_string(), "position already open");
        // Signal on the exit bar is still inside the open position.
        assert_eq!(out.skips[1].bar_index, 3);
        assert!(out.resolutions[1].is_none());
        assert!(out.resolutions[0].is_some());
    }

    #[test]
    fn signal_after_exit_opens_new_trade() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 100.5, 97.0, 98.0),
            (98.0, 98.5, 97.5, 98.0),
            (98.0, 98.5, 97.5, 98.2),
        ]);
        let rm = risk(fixed(2.0), PolicySpec::new("no_tp"));
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(0), long_at(2)]);
        assert_eq!(out.trades.len(), 2);
        assert_eq!(out.trades[1].trade_id, 1);
        assert!(out.skips.is_empty());
    }

    #[test]
    fn trailing_stop_ratchets_and_exits_as_trailing() {
        // ATR is 1.0 everywhere; trail = close - 2.
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 103.2, 100.0, 103.0),
            (103.0, 105.2, 102.8, 105.0),
            (105.0, 105.1, 102.5, 103.0),
        ]);
        let rm = risk(
            PolicySpec::new("trailing_volatility_stop")
                .with("multiplier", 2.0)
                .with("period", 3.0),
            PolicySpec::new("none"),
        );
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(0)]);
        let trade = &out.trades[0];
        // Stop 98 → 101 (after bar 1) → 103 (after bar 2); bar 3 low 102.5 hits 103.
        assert_eq!(trade.exit_reason, ExitReason::Trailing);
        assert_eq!(trade.exit_index, 3);
        assert_eq!(trade.final_stop, 103.0);
        assert_eq!(trade.exit_price, 103.0);
        assert_eq!(trade.stop_price, 98.0);
    }

    #[test]
    fn trail_trigger_delays_ratchet() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 101.2, 100.0, 101.0),
            (101.0, 101.2, 99.2, 100.0),
        ]);
        let rm = risk(
            PolicySpec::new("trailing_volatility_stop")
                .with("multiplier", 2.0)
                .with("period", 3.0)
                .with("trail_trigger_r", 1.0),
            PolicySpec::new("none"),
        );
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(0)]);
        // Bar 1 closed at +0.5R, so the stop stays at 98 and bar 2 (low 99.2) survives.
        assert_eq!(out.trades[0].exit_reason, ExitReason::Timeout);
        assert_eq!(out.trades[0].final_stop, 98.0);
    }

    #[test]
    fn trail_trigger_reads_closes_not_highs() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 102.5, 100.0, 101.0),
            (101.0, 101.2, 99.2, 100.0),
        ]);
        let rm = risk(
            PolicySpec::new("trailing_volatility_stop")
                .with("multiplier", 2.0)
                .with("period", 3.0)
                .with("trail_trigger_r", 1.0),
            PolicySpec::new("none"),
        );
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(0)]);
        // Bar 1 traded through +1R (102) but closed at +0.5R: the trail stays unarmed.
        assert_eq!(out.trades[0].exit_reason, ExitReason::Timeout);
        assert_eq!(out.trades[0].final_stop, 98.0);
    }

    #[test]
    fn equity_threads_into_next_sizing() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 104.5, 99.5, 104.0),
            (104.0, 104.5, 103.5, 104.0),
            (104.0, 108.5, 103.5, 108.0),
        ]);
        let config = RiskConfig {
            stop: fixed(2.0),
            take_profit: rr(2.0),
            sizer: PolicySpec::new("risk_percent_sizer"),
            account: AccountParams {
                risk_pct: 0.01,
                pip_value: 1.0,
                pip_size: 1.0,
                lot_step: 0.0,
                max_position_size: 100.0,
            },
        };
        let rm = RiskManager::from_config(&config, &PolicyRegistry::with_defaults()).unwrap();
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(0), long_at(2)]);
        // 1000 * 1% / 2 = 5 lots, +4 each → +20; next: 1020 * 1% / 2 = 5.1 lots.
        assert_eq!(out.trades[0].position_size, 5.0);
        assert!((out.trades[1].position_size - 5.1).abs() < 1e-9);
        assert!((out.final_equity - (1_000.0 + 20.0 + 5.1 * 4.0)).abs() < 1e-9);
    }

    #[test]
    fn rejected_order_is_recorded_not_fatal() {
        let s = series(&[(100.0, 100.5, 99.5, 100.0), (100.0, 100.5, 99.5, 100.0)]);
        let rm = risk(fixed(2.0), rr(2.0));
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(1), long_at(5)]);
        assert!(out.trades.is_empty());
        assert_eq!(out.skips[0].reason, SkipReason::NoSubsequentBars);
        assert_eq!(out.skips[1].reason.code(), "signal_out_of_range");
    }

    #[test]
    fn simulate_plans_rejects_foreign_policy() {
        let s = series(&[(100.0, 100.5, 99.5, 100.0), (100.0, 104.5, 99.5, 104.0)]);
        let rm = risk(fixed(2.0), rr(2.0));
        let mut plan = rm
            .build_order(&long_at(0), &s, &PortfolioState { equity: 1_000.0 })
            .unwrap();
        let good = plan.clone();
        plan.stop_policy_type = "volatility_stop".into();

        let mut sink = NullSink;
        let mut progress = ProgressDispatcher::new(ProgressConfig::default(), &mut sink);
        let mut ledger = AllocationLedger::new();
        let sim = BatchSimulator::new(&rm, SimulationConfig::default());
        let out = sim
            .simulate_plans(
                &s,
                &[plan],
                PortfolioState { equity: 1_000.0 },
                &mut progress,
                &mut ledger,
            )
            .unwrap();
        assert_eq!(out.skips[0].reason.code(), "policy_mismatch");

        let out = sim
            .simulate_plans(
                &s,
                &[good],
                PortfolioState { equity: 1_000.0 },
                &mut progress,
                &mut ledger,
            )
            .unwrap();
        assert_eq!(out.trades[0].exit_reason, ExitReason::Target);
    }

    #[test]
    fn next_open_entry_checks_entry_bar() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (101.0, 101.5, 98.5, 99.0),
            (99.0, 99.5, 98.5, 99.0),
        ]);
        let rm = risk(fixed(2.0), rr(2.0)).with_entry_mode(EntryMode::NextOpen);
        let out = simulate(&rm, SimulationConfig::default(), &s, &[long_at(0)]);
        let trade = &out.trades[0];
        assert_eq!(trade.entry_price, 101.0);
        assert_eq!(trade.exit_index, 1);
        assert_eq!(trade.exit_price, 99.0);
        assert_eq!(trade.bars_held, 1);
    }
}
