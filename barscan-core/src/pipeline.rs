//! Per-symbol pipeline: guard → resolve → audit → scan → simulate → report.
//!
//! Configuration problems and a breached memory floor fail before the series
//! is touched. Per-signal problems become skips. Nothing here writes files;
//! the caller persists `RunOutput` once `run` has returned `Ok`.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alloc::AllocationLedger;
use crate::determinism::{DeterminismConfig, DeterminismController, RunDigest, RunId};
use crate::domain::{ClosedTrade, OrderPlan, ScanDirection, Signal, SkipEvent};
use crate::error::{EngineError, PolicyConfigError};
use crate::guard::{MemoryProbe, ResourceGuard};
use crate::indicators::IndicatorRegistry;
use crate::progress::{CancellationToken, Phase, ProgressConfig, ProgressDispatcher, ProgressSink};
use crate::report::{PerformanceReport, PerformanceReporter, Provenance, ReportInputs};
use crate::resolver::{resolve, ResolverConfig};
use crate::risk::{PolicyRegistry, PortfolioState, RiskConfig, RiskManager};
use crate::scanner::{BatchScanner, ScanStrategy};
use crate::series::PriceSeries;
use crate::simulator::{BatchSimulator, SimulationConfig};

/// Everything one run needs besides the series itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub strategy: ScanStrategy,
    pub risk: RiskConfig,
    pub initial_balance: f64,
    #[serde(default)]
    pub scan_direction: ScanDirection,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub determinism: DeterminismConfig,
    /// Minimum available memory before work starts. Zero disables the floor.
    #[serde(default)]
    pub memory_floor_bytes: u64,
    #[serde(default)]
    pub provenance: Provenance,
}

/// Results of a completed run, ready to hand to a persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub run_id: RunId,
    pub signals: Vec<Signal>,
    pub orders: Vec<OrderPlan>,
    pub trades: Vec<ClosedTrade>,
    pub skips: Vec<SkipEvent>,
    pub report: PerformanceReport,
}

/// Run `f`, returning its result and wall time.
fn timed<R>(name: &str, f: impl FnOnce() -> R) -> (R, Duration) {
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    debug!(phase = name, elapsed_us = elapsed.as_micros() as u64, "phase timed");
    (result, elapsed)
}

pub struct Pipeline<'p> {
    config: PipelineConfig,
    registry: PolicyRegistry,
    probe: &'p dyn MemoryProbe,
    cancel: Option<CancellationToken>,
    reporter: PerformanceReporter,
    scanner: BatchScanner,
}

impl<'p> Pipeline<'p> {
    pub fn new(config: PipelineConfig, probe: &'p dyn MemoryProbe) -> Self {
        Self {
            config,
            registry: PolicyRegistry::with_defaults(),
            probe,
            cancel: None,
            reporter: PerformanceReporter::new(),
            scanner: BatchScanner::default(),
        }
    }

    /// Resolve policies from a caller-extended registry.
    pub fn with_registry(mut self, registry: PolicyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_reporter(mut self, reporter: PerformanceReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_scanner(mut self, scanner: BatchScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve every policy and check account values without touching data.
    pub fn validate(&self) -> Result<RiskManager, PolicyConfigError> {
        let balance = self.config.initial_balance;
        if !(balance.is_finite() && balance > 0.0) {
            return Err(PolicyConfigError::InvalidBalance(balance));
        }
        let manager = RiskManager::from_config(&self.config.risk, &self.registry)?;
        Ok(manager.with_entry_mode(self.config.simulation.entry_mode))
    }

    pub fn run(
        &self,
        series: PriceSeries,
        sink: &mut dyn ProgressSink,
    ) -> Result<RunOutput, EngineError> {
        let risk = self.validate()?;
        let headroom = ResourceGuard::new(self.config.memory_floor_bytes).check(self.probe)?;

        let determinism = DeterminismController::new(self.config.determinism);
        let run_id = determinism.run_id(series.symbol(), &serde_json::to_value(&self.config)?);
        info!(
            run_id = %run_id,
            symbol = series.symbol(),
            bars = series.len(),
            deterministic = determinism.is_enabled(),
            "run started"
        );

        let (resolved, resolution) = resolve(series, &self.config.resolver)?;

        let mut indicator_names = self.config.strategy.indicator_names();
        for name in risk.required_indicators() {
            if !indicator_names.contains(&name) {
                indicator_names.push(name);
            }
        }
        let indicators = IndicatorRegistry::new(indicator_names);
        let audit = indicators.audit(&resolved);
        indicators.require_all(&resolved)?;

        let mut ledger = AllocationLedger::new();
        let mut progress = ProgressDispatcher::new(self.config.progress.clone(), sink);
        if let Some(token) = &self.cancel {
            progress = progress.with_cancellation(token.clone());
        }

        progress.begin_phase(Phase::Scan);
        let (scanned, scan_duration) = timed("scan", || {
            self.scanner.scan(
                &resolved,
                &self.config.strategy,
                self.config.scan_direction,
                &mut progress,
                &mut ledger,
            )
        });
        let mut signals = scanned.map_err(|e| cancelled(e.into()))?.signals;
        let scan_stats = progress.finish_phase();
        determinism.canonical_order(&mut signals);

        let simulator = BatchSimulator::new(&risk, self.config.simulation.clone());
        progress.begin_phase(Phase::Simulate);
        let (simulated, simulation_duration) = timed("simulate", || {
            simulator.run(
                &resolved,
                &signals,
                PortfolioState {
                    equity: self.config.initial_balance,
                },
                &mut progress,
                &mut ledger,
            )
        });
        let sim = simulated.map_err(|e| cancelled(e.into()))?;
        let sim_stats = progress.finish_phase();

        let digest = RunDigest::of(&signals, &sim.trades);
        let report = self.reporter.build(ReportInputs {
            run_id: run_id.clone(),
            symbol: resolved.symbol(),
            deterministic_mode: determinism.is_enabled(),
            seed: determinism.seed(),
            environment: determinism.environment(),
            provenance: &self.config.provenance,
            scan_duration,
            simulation_duration,
            phases: scan_stats.into_iter().chain(sim_stats).collect(),
            series_bytes: resolved.byte_size(),
            memory_headroom: Some(headroom),
            ledger: &ledger,
            candle_count: resolved.len(),
            signal_count: signals.len(),
            resolution: &resolution,
            progress_emission_count: progress.total_emissions(),
            progress_overhead_pct: progress.overhead_pct(),
            indicator_names: indicators.names(),
            indicator_audit: &audit,
            initial_balance: self.config.initial_balance,
            final_equity: sim.final_equity,
            trades: &sim.trades,
            skips: &sim.skips,
            digest,
        });

        info!(
            run_id = %run_id,
            signals = report.signal_count,
            trades = report.trade_count,
            skips = report.skip_count,
            final_equity = report.final_equity,
            "run complete"
        );

        Ok(RunOutput {
            run_id,
            signals,
            orders: sim.orders,
            trades: sim.trades,
            skips: sim.skips,
            report,
        })
    }
}

fn cancelled(err: EngineError) -> EngineError {
    warn!(error = %err, "run cancelled, no report produced");
    err
}
