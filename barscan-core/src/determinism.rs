//! Determinism controller.
//!
//! A run is reproducible when the same series and configuration yield the
//! same signal sequence and the same trade sequence, byte for byte. This
//! module fixes the pieces that could otherwise drift:
//! - signal order (stable, by bar then LONG before SHORT)
//! - randomness (seeded through a BLAKE3 sub-seed hierarchy)
//! - provenance (environment fingerprint and a content-derived run id)
//!
//! Digests are computed by feeding raw little-endian field bytes to BLAKE3,
//! so two runs agree exactly when every field agrees bit for bit.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ClosedTrade, Direction, Signal};

fn default_enabled() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminismConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Master seed used when `enabled`; otherwise a fresh seed is drawn.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for DeterminismConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            seed: default_seed(),
        }
    }
}

// ─── Seeds ───────────────────────────────────────────────────────────

/// Master seed expanded into per-(symbol, iteration) sub-seeds.
///
/// Derivation is hash-based, not sequential: the same master seed yields the
/// same sub-seed for a given key whatever order keys are requested in.
#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn sub_seed(&self, symbol: &str, iteration: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(&iteration.to_le_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    pub fn rng_for(&self, symbol: &str, iteration: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(symbol, iteration))
    }
}

// ─── Provenance ──────────────────────────────────────────────────────

/// Platform and build facts recorded alongside every report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentFingerprint {
    pub os: String,
    pub arch: String,
    pub family: String,
    pub pointer_width: u32,
    pub endian: String,
    pub engine_version: String,
    /// BLAKE3 over the fields above.
    pub digest: String,
}

impl EnvironmentFingerprint {
    pub fn capture() -> Self {
        let os = std::env::consts::OS.to_string();
        let arch = std::env::consts::ARCH.to_string();
        let family = std::env::consts::FAMILY.to_string();
        let pointer_width = usize::BITS;
        let endian = if cfg!(target_endian = "little") { "little" } else { "big" }.to_string();
        let engine_version = env!("CARGO_PKG_VERSION").to_string();

        let mut hasher = blake3::Hasher::new();
        for part in [&os, &arch, &family, &endian, &engine_version] {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(&pointer_width.to_le_bytes());

        Self {
            os,
            arch,
            family,
            pointer_width,
            endian,
            engine_version,
            digest: hasher.finalize().to_hex().to_string(),
        }
    }
}

/// Deterministic run identifier: BLAKE3 over symbol, seed and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// `config` should be the canonical JSON of the run configuration;
    /// map keys are sorted so equal configs hash equally.
    pub fn derive(symbol: &str, seed: u64, config: &serde_json::Value) -> Self {
        let canonical = serde_json::json!({
            "symbol": symbol,
            "seed": seed,
            "config": config,
        });
        Self(blake3::hash(canonical.to_string().as_bytes()).to_hex().to_string())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Digests ─────────────────────────────────────────────────────────

fn feed_f64(hasher: &mut blake3::Hasher, value: f64) {
    hasher.update(&value.to_bits().to_le_bytes());
}

fn feed_opt_f64(hasher: &mut blake3::Hasher, value: Option<f64>) {
    match value {
        Some(v) => {
            hasher.update(&[1]);
            feed_f64(hasher, v);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn feed_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn direction_byte(direction: Direction) -> u8 {
    match direction {
        Direction::Long => 0,
        Direction::Short => 1,
    }
}

pub fn signal_digest(signals: &[Signal]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(signals.len() as u64).to_le_bytes());
    for signal in signals {
        feed_str(&mut hasher, &signal.symbol);
        hasher.update(&[direction_byte(signal.direction)]);
        hasher.update(&signal.timestamp.timestamp_millis().to_le_bytes());
        hasher.update(&(signal.bar_index as u64).to_le_bytes());
        feed_opt_f64(&mut hasher, signal.entry_hint);
        for (name, value) in &signal.metadata {
            feed_str(&mut hasher, name);
            feed_f64(&mut hasher, *value);
        }
    }
    hasher.finalize().to_hex().to_string()
}

pub fn trade_digest(trades: &[ClosedTrade]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(trades.len() as u64).to_le_bytes());
    for t in trades {
        hasher.update(&t.trade_id.to_le_bytes());
        feed_str(&mut hasher, &t.symbol);
        hasher.update(&[direction_byte(t.direction)]);
        hasher.update(&(t.entry_index as u64).to_le_bytes());
        hasher.update(&(t.exit_index as u64).to_le_bytes());
        hasher.update(&t.entry_timestamp.timestamp_millis().to_le_bytes());
        hasher.update(&t.exit_timestamp.timestamp_millis().to_le_bytes());
        feed_f64(&mut hasher, t.entry_price);
        feed_f64(&mut hasher, t.exit_price);
        feed_f64(&mut hasher, t.stop_price);
        feed_opt_f64(&mut hasher, t.target_price);
        feed_f64(&mut hasher, t.final_stop);
        feed_f64(&mut hasher, t.position_size);
        feed_f64(&mut hasher, t.pnl);
        feed_f64(&mut hasher, t.r_multiple);
        hasher.update(&(t.bars_held as u64).to_le_bytes());
        feed_str(&mut hasher, t.exit_reason.as_str());
    }
    hasher.finalize().to_hex().to_string()
}

/// Fingerprint of one run's outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDigest {
    pub signal_digest: String,
    pub trade_digest: String,
}

impl RunDigest {
    pub fn of(signals: &[Signal], trades: &[ClosedTrade]) -> Self {
        Self {
            signal_digest: signal_digest(signals),
            trade_digest: trade_digest(trades),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReproducibilityError {
    #[error("run {run} produced a different {sequence} sequence than run 0")]
    Diverged { run: usize, sequence: &'static str },
}

/// Every digest must equal the first.
pub fn verify_reproducible(digests: &[RunDigest]) -> Result<(), ReproducibilityError> {
    let Some(first) = digests.first() else {
        return Ok(());
    };
    for (run, digest) in digests.iter().enumerate().skip(1) {
        if digest.signal_digest != first.signal_digest {
            return Err(ReproducibilityError::Diverged {
                run,
                sequence: "signal",
            });
        }
        if digest.trade_digest != first.trade_digest {
            return Err(ReproducibilityError::Diverged {
                run,
                sequence: "trade",
            });
        }
    }
    Ok(())
}

/// Whether every duration lies within `tolerance` (relative) of their mean.
pub fn durations_within_tolerance(durations: &[Duration], tolerance: f64) -> bool {
    if durations.len() < 2 {
        return true;
    }
    let secs: Vec<f64> = durations.iter().map(Duration::as_secs_f64).collect();
    let mean = secs.iter().sum::<f64>() / secs.len() as f64;
    if mean == 0.0 {
        return true;
    }
    secs.iter().all(|s| ((s - mean) / mean).abs() <= tolerance)
}

// ─── Controller ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DeterminismController {
    enabled: bool,
    rng: RngHierarchy,
    environment: EnvironmentFingerprint,
}

impl DeterminismController {
    pub fn new(config: DeterminismConfig) -> Self {
        let seed = if config.enabled {
            config.seed
        } else {
            rand::random()
        };
        Self {
            enabled: config.enabled,
            rng: RngHierarchy::new(seed),
            environment: EnvironmentFingerprint::capture(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn seed(&self) -> u64 {
        self.rng.master_seed()
    }

    pub fn rng(&self) -> &RngHierarchy {
        &self.rng
    }

    pub fn environment(&self) -> &EnvironmentFingerprint {
        &self.environment
    }

    /// Stable sort into processing order: bar index, then LONG before SHORT.
    pub fn canonical_order(&self, signals: &mut [Signal]) {
        signals.sort_by_key(|s| (s.bar_index, direction_byte(s.direction)));
    }

    pub fn run_id(&self, symbol: &str, config: &serde_json::Value) -> RunId {
        RunId::derive(symbol, self.seed(), config)
    }
}
