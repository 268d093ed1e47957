//! Progress dispatcher with bounded overhead and cooperative cancellation.
//!
//! The scanner and simulator call [`ProgressDispatcher::tick`] with the
//! fraction of work done. An event is emitted when either the time ceiling or
//! the fraction ceiling is reached since the last emission. Every phase ends
//! with exactly one final 100% event from [`ProgressDispatcher::finish_phase`].
//!
//! Time spent deciding and emitting is measured; when it approaches the
//! overhead budget the dispatcher reads the clock only every n-th tick,
//! doubling n as needed and halving it again once overhead falls back. The
//! fraction comparison runs on every tick, so fraction-ceiling emissions are
//! never skipped.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

const MAX_STRIDE: u64 = 1 << 16;
const FRACTION_EPSILON: f64 = 1e-9;

/// The two ticking phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Scan,
    Simulate,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Scan => f.write_str("scan"),
            Phase::Simulate => f.write_str("simulate"),
        }
    }
}

fn default_time_ceiling_secs() -> f64 {
    120.0
}

fn default_fraction_ceiling() -> f64 {
    0.02
}

fn default_overhead_budget() -> f64 {
    0.01
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Emit at least this often, in seconds.
    #[serde(default = "default_time_ceiling_secs")]
    pub time_ceiling_secs: f64,
    /// Emit whenever progress advanced by this fraction.
    #[serde(default = "default_fraction_ceiling")]
    pub fraction_ceiling: f64,
    /// Maximum share of phase time spent in emission logic.
    #[serde(default = "default_overhead_budget")]
    pub overhead_budget: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            time_ceiling_secs: default_time_ceiling_secs(),
            fraction_ceiling: default_fraction_ceiling(),
            overhead_budget: default_overhead_budget(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// In `[0, 1]`; exactly `1.0` on the final event.
    pub fraction: f64,
    pub elapsed: Duration,
    pub is_final: bool,
}

/// Receiver of progress events.
pub trait ProgressSink {
    fn emit(&mut self, event: &ProgressEvent);
}

/// Logs each event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&mut self, event: &ProgressEvent) {
        info!(
            phase = %event.phase,
            pct = format_args!("{:.1}", event.fraction * 100.0),
            elapsed_ms = event.elapsed.as_millis() as u64,
            is_final = event.is_final,
            "progress"
        );
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Vec<ProgressEvent>,
}

impl CollectingSink {
    pub fn finals(&self, phase: Phase) -> usize {
        self.events
            .iter()
            .filter(|e| e.phase == phase && e.is_final)
            .count()
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&mut self, event: &ProgressEvent) {
        self.events.push(event.clone());
    }
}

/// Discards events.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&mut self, _event: &ProgressEvent) {}
}

// ─── Clocks ──────────────────────────────────────────────────────────

/// Monotonic time source, as elapsed time since an arbitrary origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

// ─── Cancellation ────────────────────────────────────────────────────

/// Shared flag checked at every tick.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{phase} phase cancelled")]
pub struct Cancelled {
    pub phase: Phase,
}

// ─── Dispatcher ──────────────────────────────────────────────────────

/// Summary of one finished phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub phase: Phase,
    pub duration: Duration,
    pub emissions: u64,
    pub overhead: Duration,
    pub final_stride: u64,
}

impl PhaseStats {
    pub fn overhead_pct(&self) -> f64 {
        overhead_pct(self.overhead, self.duration)
    }
}

fn overhead_pct(overhead: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    overhead.as_secs_f64() / total.as_secs_f64() * 100.0
}

#[derive(Debug)]
struct PhaseState {
    phase: Phase,
    started: Duration,
    last_emit_at: Duration,
    last_fraction: f64,
    emissions: u64,
    overhead: Duration,
    ticks: u64,
    stride: u64,
}

pub struct ProgressDispatcher<'a> {
    config: ProgressConfig,
    sink: &'a mut dyn ProgressSink,
    clock: Box<dyn Clock + 'a>,
    cancel: Option<CancellationToken>,
    active: Option<PhaseState>,
    total_emissions: u64,
    total_overhead: Duration,
    total_duration: Duration,
}

impl<'a> ProgressDispatcher<'a> {
    pub fn new(config: ProgressConfig, sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            config,
            sink,
            clock: Box::new(SystemClock::new()),
            cancel: None,
            active: None,
            total_emissions: 0,
            total_overhead: Duration::ZERO,
            total_duration: Duration::ZERO,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Start a phase. An unfinished previous phase is finished first.
    pub fn begin_phase(&mut self, phase: Phase) {
        if self.active.is_some() {
            self.finish_phase();
        }
        let now = self.clock.now();
        self.active = Some(PhaseState {
            phase,
            started: now,
            last_emit_at: now,
            last_fraction: 0.0,
            emissions: 0,
            overhead: Duration::ZERO,
            ticks: 0,
            stride: 1,
        });
    }

    /// Report progress. Fails only when cancellation was requested.
    ///
    /// A fraction of `1.0` is never emitted here; the final event belongs to
    /// `finish_phase`.
    pub fn tick(&mut self, fraction: f64) -> Result<(), Cancelled> {
        let Some(state) = self.active.as_mut() else {
            return Ok(());
        };
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(Cancelled { phase: state.phase });
        }

        state.ticks += 1;
        let fraction = fraction.clamp(0.0, 1.0);
        let fraction_due =
            fraction - state.last_fraction + FRACTION_EPSILON >= self.config.fraction_ceiling;
        // The stride only thins out clock reads; fraction crossings always emit.
        if !fraction_due && state.ticks % state.stride != 0 {
            return Ok(());
        }

        let t0 = self.clock.now();
        let time_due = (t0 - state.last_emit_at).as_secs_f64() >= self.config.time_ceiling_secs;
        if fraction < 1.0 && (time_due || fraction_due) {
            self.sink.emit(&ProgressEvent {
                phase: state.phase,
                fraction,
                elapsed: t0 - state.started,
                is_final: false,
            });
            state.emissions += 1;
            state.last_emit_at = t0;
            state.last_fraction = fraction;
        }
        let t1 = self.clock.now();
        state.overhead += t1 - t0;

        // Coarsen above half the budget, relax again below a quarter.
        let phase_elapsed = t1 - state.started;
        if !phase_elapsed.is_zero() {
            let budget = self.config.overhead_budget * phase_elapsed.as_secs_f64();
            let spent = state.overhead.as_secs_f64();
            if spent > 0.5 * budget && state.stride < MAX_STRIDE {
                state.stride *= 2;
            } else if spent < 0.25 * budget && state.stride > 1 {
                state.stride /= 2;
            }
        }
        Ok(())
    }

    /// Emit the single final event for the active phase and close it.
    pub fn finish_phase(&mut self) -> Option<PhaseStats> {
        let mut state = self.active.take()?;
        let t0 = self.clock.now();
        self.sink.emit(&ProgressEvent {
            phase: state.phase,
            fraction: 1.0,
            elapsed: t0 - state.started,
            is_final: true,
        });
        state.emissions += 1;
        let t1 = self.clock.now();
        state.overhead += t1 - t0;

        let stats = PhaseStats {
            phase: state.phase,
            duration: t1 - state.started,
            emissions: state.emissions,
            overhead: state.overhead,
            final_stride: state.stride,
        };
        self.total_emissions += stats.emissions;
        self.total_overhead += stats.overhead;
        self.total_duration += stats.duration;
        Some(stats)
    }

    pub fn total_emissions(&self) -> u64 {
        self.total_emissions
    }

    /// Emission overhead over all finished phases, in percent.
    pub fn overhead_pct(&self) -> f64 {
        overhead_pct(self.total_overhead, self.total_duration)
    }

    pub fn active_phase(&self) -> Option<Phase> {
        self.active.as_ref().map(|s| s.phase)
    }
}
