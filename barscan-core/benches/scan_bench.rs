//! Criterion benchmarks for the scan and simulate hot paths.
//!
//! Benchmarks:
//! 1. Duplicate/gap resolution
//! 2. Batch scan (crossover + filter rules, both directions)
//! 3. Batch simulation (trailing stop, risk-multiple target)
//! 4. Full pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use barscan_core::alloc::AllocationLedger;
use barscan_core::domain::ScanDirection;
use barscan_core::guard::{StaticMemoryProbe, MB};
use barscan_core::progress::{NullSink, ProgressConfig, ProgressDispatcher};
use barscan_core::resolver::{resolve, ResolverConfig};
use barscan_core::risk::{
    AccountParams, PolicyRegistry, PolicySpec, PortfolioState, RiskConfig, RiskManager,
};
use barscan_core::scanner::{BatchScanner, CompareOp, Condition, Operand, ScanStrategy};
use barscan_core::series::PriceSeries;
use barscan_core::simulator::{BatchSimulator, SimulationConfig};
use barscan_core::synthetic;
use barscan_core::{Pipeline, PipelineConfig};

// ── Helpers ──────────────────────────────────────────────────────────

const SIZES: [usize; 3] = [10_000, 100_000, 1_000_000];

fn make_series(n: usize) -> PriceSeries {
    synthetic::random_walk("BENCH", n, 42)
        .and_then(synthetic::with_standard_indicators)
        .expect("synthetic series")
}

fn strategy() -> ScanStrategy {
    ScanStrategy::new("sma_cross")
        .with_long(Condition::CrossAbove {
            fast: Operand::column("sma_5"),
            slow: Operand::column("sma_20"),
        })
        .with_long(Condition::compare(Operand::Close, CompareOp::Gt, Operand::column("ema_20")))
        .with_short(Condition::CrossBelow {
            fast: Operand::column("sma_5"),
            slow: Operand::column("sma_20"),
        })
        .with_short(Condition::compare(Operand::Close, CompareOp::Lt, Operand::column("ema_20")))
}

fn risk() -> RiskConfig {
    RiskConfig {
        stop: PolicySpec::new("trailing_volatility_stop")
            .with("multiplier", 2.5)
            .with("period", 14.0),
        take_profit: PolicySpec::new("risk_multiple_tp").with("rr_ratio", 2.0),
        sizer: PolicySpec::new("risk_percent_sizer"),
        account: AccountParams {
            risk_pct: 0.01,
            pip_value: 1.0,
            pip_size: 0.01,
            lot_step: 0.01,
            max_position_size: 1_000.0,
        },
    }
}

// ── 1. Resolve ───────────────────────────────────────────────────────

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    for &n in &SIZES {
        let series = make_series(n);
        group.bench_with_input(BenchmarkId::new("sorted", n), &n, |b, _| {
            b.iter(|| resolve(black_box(series.clone()), &ResolverConfig::default()))
        });
    }
    group.finish();
}

// ── 2. Scan ──────────────────────────────────────────────────────────

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_scan");
    let strategy = strategy();
    for &n in &SIZES {
        let (resolved, _) = resolve(make_series(n), &ResolverConfig::default()).expect("resolve");
        group.bench_with_input(BenchmarkId::new("both_directions", n), &n, |b, _| {
            b.iter(|| {
                let mut sink = NullSink;
                let mut progress = ProgressDispatcher::new(ProgressConfig::default(), &mut sink);
                let mut ledger = AllocationLedger::new();
                BatchScanner::default()
                    .scan(
                        black_box(&resolved),
                        &strategy,
                        ScanDirection::Both,
                        &mut progress,
                        &mut ledger,
                    )
                    .expect("scan")
            })
        });
    }
    group.finish();
}

// ── 3. Simulate ──────────────────────────────────────────────────────

fn bench_simulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_simulate");
    let manager =
        RiskManager::from_config(&risk(), &PolicyRegistry::with_defaults()).expect("risk");
    for &n in &SIZES {
        let (resolved, _) = resolve(make_series(n), &ResolverConfig::default()).expect("resolve");
        let signals = {
            let mut sink = NullSink;
            let mut progress = ProgressDispatcher::new(ProgressConfig::default(), &mut sink);
            let mut ledger = AllocationLedger::new();
            BatchScanner::default()
                .scan(&resolved, &strategy(), ScanDirection::Both, &mut progress, &mut ledger)
                .expect("scan")
                .signals
        };
        group.bench_with_input(BenchmarkId::new("trailing", n), &n, |b, _| {
            b.iter(|| {
                let mut sink = NullSink;
                let mut progress = ProgressDispatcher::new(ProgressConfig::default(), &mut sink);
                let mut ledger = AllocationLedger::new();
                BatchSimulator::new(&manager, SimulationConfig::default())
                    .run(
                        black_box(&resolved),
                        &signals,
                        PortfolioState { equity: 100_000.0 },
                        &mut progress,
                        &mut ledger,
                    )
                    .expect("simulate")
            })
        });
    }
    group.finish();
}

// ── 4. Full pipeline ─────────────────────────────────────────────────

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    let probe = StaticMemoryProbe(64 * 1024 * MB);
    let config = PipelineConfig {
        strategy: strategy(),
        risk: risk(),
        initial_balance: 100_000.0,
        scan_direction: ScanDirection::Both,
        resolver: Default::default(),
        simulation: Default::default(),
        progress: Default::default(),
        determinism: Default::default(),
        memory_floor_bytes: 0,
        provenance: Default::default(),
    };
    for &n in &SIZES {
        let series = make_series(n);
        group.bench_with_input(BenchmarkId::new("end_to_end", n), &n, |b, _| {
            b.iter(|| {
                Pipeline::new(config.clone(), &probe)
                    .run(black_box(series.clone()), &mut NullSink)
                    .expect("pipeline")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_scan, bench_simulate, bench_pipeline);
criterion_main!(benches);
