//! TOML run configuration.
//!
//! One document describes one symbol run:
//!
//! ```toml
//! symbol = "EURUSD"
//! initial_balance = 10000.0
//! memory_floor_mb = 512
//!
//! [determinism]
//! enabled = true
//! seed = 42
//!
//! [manifest]
//! path = "data/EURUSD.manifest.json"
//!
//! [strategy]
//! name = "sma_cross"
//!
//! [[strategy.long]]
//! type = "cross_above"
//! fast = { kind = "column", name = "sma_5" }
//! slow = { kind = "column", name = "sma_20" }
//!
//! [risk.stop]
//! type = "volatility_stop"
//! multiplier = 2.0
//! period = 14
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use barscan_core::determinism::DeterminismConfig;
use barscan_core::domain::ScanDirection;
use barscan_core::error::PolicyConfigError;
use barscan_core::guard::MB;
use barscan_core::progress::ProgressConfig;
use barscan_core::report::Provenance;
use barscan_core::resolver::ResolverConfig;
use barscan_core::risk::{PolicyRegistry, RiskConfig, RiskManager};
use barscan_core::scanner::ScanStrategy;
use barscan_core::simulator::SimulationConfig;
use barscan_core::PipelineConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid run configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("symbol must not be empty")]
    EmptySymbol,
    #[error(transparent)]
    Policy(#[from] PolicyConfigError),
    #[error("manifest {path} checksum mismatch: expected {expected}, found {actual}")]
    ManifestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Ingestion manifest the series was loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRef {
    pub path: PathBuf,
    /// Expected BLAKE3 hex of the manifest file. Checked when present.
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Serializable configuration for a single symbol run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Symbol the supplied series must carry.
    pub symbol: String,

    /// Starting account equity.
    pub initial_balance: f64,

    #[serde(default)]
    pub scan_direction: ScanDirection,

    /// Minimum available memory, in MiB, before the run starts. Zero disables the floor.
    #[serde(default)]
    pub memory_floor_mb: u64,

    #[serde(default)]
    pub manifest: Option<ManifestRef>,

    #[serde(default)]
    pub determinism: DeterminismConfig,

    pub strategy: ScanStrategy,

    pub risk: RiskConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub progress: ProgressConfig,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Resolve every policy through `registry` without touching any data.
    pub fn validate(&self, registry: &PolicyRegistry) -> Result<RiskManager, ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        let balance = self.initial_balance;
        if !(balance.is_finite() && balance > 0.0) {
            return Err(PolicyConfigError::InvalidBalance(balance).into());
        }
        let manager = RiskManager::from_config(&self.risk, registry)?;
        Ok(manager.with_entry_mode(self.simulation.entry_mode))
    }

    pub fn memory_floor_bytes(&self) -> u64 {
        self.memory_floor_mb.saturating_mul(MB)
    }

    /// Manifest provenance with a checksum computed from the file itself.
    ///
    /// A configured checksum that disagrees with the file is an error.
    pub fn provenance(&self) -> Result<Provenance, ConfigError> {
        let Some(manifest) = &self.manifest else {
            return Ok(Provenance::default());
        };
        let actual = manifest_checksum(&manifest.path)?;
        if let Some(expected) = &manifest.checksum {
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(ConfigError::ManifestMismatch {
                    path: manifest.path.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(Provenance {
            manifest_path: Some(manifest.path.display().to_string()),
            manifest_checksum: Some(actual),
        })
    }

    pub fn to_pipeline_config(&self, provenance: Provenance) -> PipelineConfig {
        PipelineConfig {
            strategy: self.strategy.clone(),
            risk: self.risk.clone(),
            initial_balance: self.initial_balance,
            scan_direction: self.scan_direction,
            resolver: self.resolver.clone(),
            simulation: self.simulation.clone(),
            progress: self.progress.clone(),
            determinism: self.determinism,
            memory_floor_bytes: self.memory_floor_bytes(),
            provenance,
        }
    }
}

/// BLAKE3 hex digest of the file at `path`.
pub fn manifest_checksum(path: &Path) -> Result<String, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use barscan_core::domain::EntryMode;
    use barscan_core::scanner::Condition;

    const SAMPLE: &str = r#"
symbol = "EURUSD"
initial_balance = 10000.0
scan_direction = "long"
memory_floor_mb = 256

[determinism]
seed = 7

[strategy]
name = "sma_cross"
cooldown_bars = 3

[[strategy.long]]
type = "cross_above"
fast = { kind = "column", name = "sma_5" }
slow = { kind = "column", name = "sma_20" }

[[strategy.long]]
type = "compare"
left = { kind = "close" }
op = "gt"
right = { kind = "column", name = "ema_20" }

[risk.stop]
type = "volatility_stop"
multiplier = 2.0
period = 14

[risk.take_profit]
type = "risk_multiple_tp"
rr_ratio = 2.0

[risk.sizer]
type = "risk_percent_sizer"

[risk.account]
risk_pct = 0.01
pip_value = 10.0
pip_size = 0.0001
lot_step = 0.01
max_position_size = 50.0

[simulation]
entry_mode = "next_open"
max_holding_bars = 500
"#;

    #[test]
    fn parses_sample_document() {
        let config = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.symbol, "EURUSD");
        assert_eq!(config.scan_direction, ScanDirection::Long);
        assert_eq!(config.memory_floor_bytes(), 256 * MB);
        assert!(config.determinism.enabled);
        assert_eq!(config.determinism.seed, 7);
        assert_eq!(config.strategy.cooldown_bars, 3);
        assert_eq!(config.strategy.long.len(), 2);
        assert!(matches!(config.strategy.long[0], Condition::CrossAbove { .. }));
        assert!(config.strategy.short.is_empty());
        assert_eq!(config.risk.stop.policy_type, "volatility_stop");
        assert_eq!(config.risk.stop.params.get("period"), Some(&14.0));
        assert_eq!(config.simulation.entry_mode, EntryMode::NextOpen);
        assert_eq!(config.simulation.max_holding_bars, Some(500));
        assert_eq!(config.progress, ProgressConfig::default());
    }

    #[test]
    fn validate_resolves_policies() {
        let config = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert!(config.validate(&PolicyRegistry::with_defaults()).is_ok());
    }

    #[test]
    fn unknown_policy_fails_validation() {
        let text = SAMPLE.replace("volatility_stop", "moon_phase_stop");
        let config = RunConfig::from_toml_str(&text).unwrap();
        let err = config.validate(&PolicyRegistry::with_defaults()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Policy(PolicyConfigError::Unknown { .. })
        ));
    }

    #[test]
    fn empty_symbol_and_bad_balance_fail() {
        let mut config = RunConfig::from_toml_str(SAMPLE).unwrap();
        config.symbol = "  ".into();
        assert!(matches!(
            config.validate(&PolicyRegistry::with_defaults()),
            Err(ConfigError::EmptySymbol)
        ));

        config.symbol = "EURUSD".into();
        config.initial_balance = 0.0;
        assert!(matches!(
            config.validate(&PolicyRegistry::with_defaults()),
            Err(ConfigError::Policy(PolicyConfigError::InvalidBalance(_)))
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = RunConfig::from_toml_str("symbol = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = RunConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn no_manifest_means_empty_provenance() {
        let config = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.provenance().unwrap(), Provenance::default());
    }

    #[test]
    fn pipeline_config_carries_every_section() {
        let config = RunConfig::from_toml_str(SAMPLE).unwrap();
        let pipeline = config.to_pipeline_config(Provenance::default());
        assert_eq!(pipeline.strategy, config.strategy);
        assert_eq!(pipeline.risk, config.risk);
        assert_eq!(pipeline.scan_direction, ScanDirection::Long);
        assert_eq!(pipeline.memory_floor_bytes, 256 * MB);
        assert_eq!(pipeline.determinism.seed, 7);
        assert_eq!(pipeline.simulation.entry_mode, EntryMode::NextOpen);
    }
}
