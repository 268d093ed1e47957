//! Run orchestration: configuration → pipeline → export.
//!
//! Entry points:
//! - `run_from_config()`: validates, checks the series and runs the pipeline. No file output.
//! - `run_and_export()`: the above, then writes artifacts on success.
//! - `run_config_file()`: loads the TOML document and probes `/proc/meminfo`. Used at the
//!   application edge.

use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;
use tracing::{error, info};

use barscan_core::guard::MemoryProbe;
use barscan_core::progress::{ProgressSink, TracingSink};
use barscan_core::risk::PolicyRegistry;
use barscan_core::series::PriceSeries;
use barscan_core::{EngineError, Pipeline, RunOutput};

use crate::config::{ConfigError, RunConfig};
use crate::export::{write_artifacts, ArtifactPaths, RunArtifacts};
use crate::probe::ProcMeminfoProbe;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("series symbol '{found}' does not match configured symbol '{expected}'")]
    SymbolMismatch { expected: String, found: String },
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema version {found} (max supported: {max})")]
    UnsupportedSchema { found: u32, max: u32 },
}

impl RunnerError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        RunnerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Run one symbol with progress logged through `tracing`.
pub fn run_from_config(
    config: &RunConfig,
    series: PriceSeries,
    probe: &dyn MemoryProbe,
) -> Result<RunOutput, RunnerError> {
    run_with_sink(config, series, probe, &mut TracingSink)
}

/// Run one symbol, sending progress events to `sink`.
///
/// Policies are resolved and the manifest checked before the pipeline starts.
pub fn run_with_sink(
    config: &RunConfig,
    series: PriceSeries,
    probe: &dyn MemoryProbe,
    sink: &mut dyn ProgressSink,
) -> Result<RunOutput, RunnerError> {
    let registry = PolicyRegistry::with_defaults();
    config.validate(&registry)?;
    if series.symbol() != config.symbol {
        return Err(RunnerError::SymbolMismatch {
            expected: config.symbol.clone(),
            found: series.symbol().to_string(),
        });
    }
    let provenance = config.provenance()?;

    let pipeline =
        Pipeline::new(config.to_pipeline_config(provenance), probe).with_registry(registry);
    match pipeline.run(series, sink) {
        Ok(output) => Ok(output),
        Err(err) => {
            error!(symbol = %config.symbol, error = %err, "run aborted");
            Err(err.into())
        }
    }
}

/// Run, then persist `trades.json` and `report.json` under `out_dir`.
///
/// Nothing is written unless the run completed.
pub fn run_and_export(
    config: &RunConfig,
    series: PriceSeries,
    probe: &dyn MemoryProbe,
    out_dir: &Path,
) -> Result<(RunOutput, ArtifactPaths), RunnerError> {
    let output = run_from_config(config, series, probe)?;
    let paths = write_artifacts(out_dir, &RunArtifacts::from(&output))?;
    info!(
        run_id = %output.run_id,
        trades = output.trades.len(),
        skips = output.skips.len(),
        final_equity = output.report.final_equity,
        "run exported"
    );
    Ok((output, paths))
}

/// Load `config_path`, run against live memory readings and export.
pub fn run_config_file(
    config_path: &Path,
    series: PriceSeries,
    out_dir: &Path,
) -> anyhow::Result<ArtifactPaths> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("failed to load run config {}", config_path.display()))?;
    let (_, paths) = run_and_export(&config, series, &ProcMeminfoProbe::default(), out_dir)
        .with_context(|| format!("run for {} failed", config.symbol))?;
    Ok(paths)
}
