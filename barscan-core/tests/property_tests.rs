//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Dedup: resolved length and first-occurrence survival
//! 2. Order geometry: stop/entry/target ordering on every closed trade
//! 3. Trailing monotonicity: stops only tighten
//! 4. Sizing bounds: valid sizes stay in (0, max]; degenerate stops reject
//! 5. Determinism: identical inputs give identical digests
//! 6. Progress: exactly one final emission per phase

use std::collections::HashMap;

use proptest::prelude::*;

use barscan_core::alloc::AllocationLedger;
use barscan_core::domain::{Direction, Signal};
use barscan_core::guard::{StaticMemoryProbe, MB};
use barscan_core::progress::{
    CollectingSink, ManualClock, NullSink, Phase, ProgressConfig, ProgressDispatcher,
};
use barscan_core::resolver::{resolve, ResolverConfig};
use barscan_core::risk::{
    AccountParams, PolicyRegistry, PolicySpec, PortfolioState, PositionSizer, RiskConfig,
    RiskManager, RiskPercentSizer, SizingRequest, TrailState,
};
use barscan_core::scanner::{CompareOp, Condition, Operand, ScanStrategy};
use barscan_core::series::{IndicatorColumns, PriceSeries};
use barscan_core::simulator::{BatchSimulator, SimulationConfig};
use barscan_core::synthetic;
use barscan_core::{Pipeline, PipelineConfig};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_timestamps() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0..40_i64, 1..80)
        .prop_map(|v| v.into_iter().map(|t| t * 60_000).collect())
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

fn risk_config(stop: PolicySpec, take_profit: PolicySpec) -> RiskConfig {
    RiskConfig {
        stop,
        take_profit,
        sizer: PolicySpec::new("risk_percent_sizer"),
        account: AccountParams {
            risk_pct: 0.01,
            pip_value: 1.0,
            pip_size: 0.01,
            lot_step: 0.01,
            max_position_size: 500.0,
        },
    }
}

// ── 1. Dedup ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn dedup_keeps_first_occurrence(ts in arb_timestamps()) {
        let n = ts.len();
        // Row identity lives in the close column.
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let series = PriceSeries::new(
            "X",
            ts.clone(),
            close.clone(),
            close.iter().map(|c| c + 1.0).collect(),
            close.iter().map(|c| c - 1.0).collect(),
            close.clone(),
            IndicatorColumns::new(),
        ).unwrap();

        let (resolved, report) = resolve(series, &ResolverConfig::default()).unwrap();

        let mut first: HashMap<i64, f64> = HashMap::new();
        for (i, t) in ts.iter().enumerate() {
            first.entry(*t).or_insert(close[i]);
        }
        prop_assert_eq!(resolved.len(), n - report.duplicate_removed_count);
        prop_assert_eq!(resolved.len(), first.len());
        prop_assert!(resolved.timestamps().windows(2).all(|w| w[0] < w[1]));
        for (t, c) in resolved.timestamps().iter().zip(resolved.close()) {
            prop_assert_eq!(first[t], *c);
        }
    }
}

// ── 2. Order geometry ────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn closed_trades_respect_geometry(
        seed in 0u64..1_000,
        picks in prop::collection::vec((20usize..290, arb_direction()), 1..30),
        rr in 0.5..4.0_f64,
    ) {
        let series = synthetic::random_walk("X", 300, seed)
            .and_then(synthetic::with_standard_indicators)
            .unwrap();
        let (resolved, _) = resolve(series, &ResolverConfig::default()).unwrap();
        let config = risk_config(
            PolicySpec::new("volatility_stop").with("multiplier", 2.0).with("period", 14.0),
            PolicySpec::new("risk_multiple_tp").with("rr_ratio", rr),
        );
        let manager = RiskManager::from_config(&config, &PolicyRegistry::with_defaults()).unwrap();
        let signals: Vec<Signal> = picks
            .iter()
            .map(|&(bar, dir)| Signal::new("X", dir, resolved.timestamp(bar), bar))
            .collect();

        let mut sink = NullSink;
        let mut progress = ProgressDispatcher::new(ProgressConfig::default(), &mut sink);
        let mut ledger = AllocationLedger::new();
        let out = BatchSimulator::new(&manager, SimulationConfig::default())
            .run(
                &resolved,
                &signals,
                PortfolioState { equity: 10_000.0 },
                &mut progress,
                &mut ledger,
            )
            .unwrap();

        prop_assert_eq!(out.trades.len() + out.skips.len(), signals.len());
        for trade in &out.trades {
            let target = trade.target_price.unwrap();
            match trade.direction {
                Direction::Long => {
                    prop_assert!(trade.stop_price < trade.entry_price);
                    prop_assert!(trade.entry_price < target);
                }
                Direction::Short => {
                    prop_assert!(trade.stop_price > trade.entry_price);
                    prop_assert!(trade.entry_price > target);
                }
            }
            prop_assert!(trade.position_size > 0.0 && trade.position_size <= 500.0);
        }
        // One position at a time: each entry comes after the previous exit.
        for pair in out.trades.windows(2) {
            prop_assert!(pair[1].entry_index > pair[0].exit_index);
        }
    }
}

// ── 3. Trailing monotonicity ─────────────────────────────────────────

proptest! {
    #[test]
    fn trail_never_loosens(
        direction in arb_direction(),
        proposals in prop::collection::vec(50.0..150.0_f64, 1..100),
        trigger in 0.0..2.0_f64,
    ) {
        let initial = match direction {
            Direction::Long => 95.0,
            Direction::Short => 105.0,
        };
        let mut trail = TrailState::new(direction, 100.0, initial, trigger);
        let mut previous = trail.current_stop();
        for p in proposals {
            trail.observe_profit(p);
            let stop = trail.ratchet(p);
            match direction {
                Direction::Long => prop_assert!(stop >= previous),
                Direction::Short => prop_assert!(stop <= previous),
            }
            previous = stop;
        }
    }

    #[test]
    fn simulated_trailing_stops_never_loosen(seed in 0u64..500) {
        let series = synthetic::random_walk("X", 250, seed)
            .and_then(synthetic::with_standard_indicators)
            .unwrap();
        let (resolved, _) = resolve(series, &ResolverConfig::default()).unwrap();
        let config = risk_config(
            PolicySpec::new("trailing_volatility_stop")
                .with("multiplier", 1.5)
                .with("period", 14.0),
            PolicySpec::new("no_tp"),
        );
        let manager = RiskManager::from_config(&config, &PolicyRegistry::with_defaults()).unwrap();
        let signals: Vec<Signal> = (20..240)
            .step_by(10)
            .map(|bar| Signal::new("X", Direction::Long, resolved.timestamp(bar), bar))
            .collect();

        let mut sink = NullSink;
        let mut progress = ProgressDispatcher::new(ProgressConfig::default(), &mut sink);
        let mut ledger = AllocationLedger::new();
        let out = BatchSimulator::new(&manager, SimulationConfig::default())
            .run(
                &resolved,
                &signals,
                PortfolioState { equity: 10_000.0 },
                &mut progress,
                &mut ledger,
            )
            .unwrap();
        for trade in &out.trades {
            prop_assert!(trade.final_stop >= trade.stop_price);
        }
    }
}

// ── 4. Sizing bounds ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn sizes_are_bounded_or_rejected(
        entry in 0.5..200.0_f64,
        offset in -5.0..5.0_f64,
        balance in 100.0..1_000_000.0_f64,
        risk_pct in 0.001..0.05_f64,
        max_size in 0.1..1_000.0_f64,
        direction in arb_direction(),
    ) {
        let request = SizingRequest {
            entry,
            stop: entry - offset * direction.sign(),
            direction,
            balance,
            risk_pct,
            pip_value: 1.0,
            pip_size: 0.01,
            lot_step: 0.01,
            max_size,
        };
        match RiskPercentSizer.size(&request) {
            Ok(size) => {
                prop_assert!(offset > 0.0);
                prop_assert!(size > 0.0);
                prop_assert!(size <= max_size);
            }
            Err(err) => {
                if offset <= 0.0 {
                    prop_assert_eq!(err.code(), "degenerate_stop_distance");
                }
            }
        }
    }
}

// ── 5. Determinism ───────────────────────────────────────────────────

fn pipeline_config(seed: u64) -> PipelineConfig {
    PipelineConfig {
        strategy: ScanStrategy::new("sma_cross")
            .with_long(Condition::CrossAbove {
                fast: Operand::column("sma_5"),
                slow: Operand::column("sma_20"),
            })
            .with_short(Condition::CrossBelow {
                fast: Operand::column("sma_5"),
                slow: Operand::column("sma_20"),
            })
            .with_long(Condition::compare(
                Operand::Close,
                CompareOp::Gt,
                Operand::column("ema_20"),
            )),
        risk: risk_config(
            PolicySpec::new("trailing_volatility_stop")
                .with("multiplier", 2.0)
                .with("period", 14.0)
                .with("trail_trigger_r", 0.5),
            PolicySpec::new("risk_multiple_tp").with("rr_ratio", 3.0),
        ),
        initial_balance: 10_000.0,
        scan_direction: Default::default(),
        resolver: Default::default(),
        simulation: Default::default(),
        progress: Default::default(),
        determinism: barscan_core::determinism::DeterminismConfig { enabled: true, seed },
        memory_floor_bytes: 0,
        provenance: Default::default(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn identical_inputs_identical_outputs(seed in 0u64..10_000) {
        let probe = StaticMemoryProbe(1024 * MB);
        let make = || synthetic::random_walk("X", 600, seed)
            .and_then(synthetic::with_standard_indicators)
            .unwrap();
        let a = Pipeline::new(pipeline_config(seed), &probe).run(make(), &mut NullSink).unwrap();
        let b = Pipeline::new(pipeline_config(seed), &probe).run(make(), &mut NullSink).unwrap();
        prop_assert_eq!(&a.report.digest, &b.report.digest);
        prop_assert_eq!(&a.signals, &b.signals);
        prop_assert_eq!(&a.trades, &b.trades);
        prop_assert_eq!(a.run_id, b.run_id);
    }
}

// ── 6. Progress ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn one_final_emission_per_phase(ticks in 0usize..500, fraction_ceiling in 0.001..0.5_f64) {
        let mut sink = CollectingSink::default();
        {
            let config = ProgressConfig { fraction_ceiling, ..ProgressConfig::default() };
            let mut progress =
                ProgressDispatcher::new(config, &mut sink).with_clock(ManualClock::new());
            for phase in [Phase::Scan, Phase::Simulate] {
                progress.begin_phase(phase);
                for k in 0..ticks {
                    progress.tick((k + 1) as f64 / ticks as f64).unwrap();
                }
                progress.finish_phase();
            }
        }
        prop_assert_eq!(sink.finals(Phase::Scan), 1);
        prop_assert_eq!(sink.finals(Phase::Simulate), 1);
        prop_assert!(sink.events.iter().filter(|e| !e.is_final).all(|e| e.fraction < 1.0));
    }
}
