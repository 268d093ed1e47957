//! Artifact export: `trades.json` and `report.json`.
//!
//! Both documents are serialized before anything touches the disk. Both are
//! then staged as hidden temp files in the target directory, and only once
//! both are staged are they renamed into place. If any step fails, the temp
//! files and any already-renamed artifact are removed, so the directory holds
//! either the full pair or neither. A failed run writes nothing because export
//! is only reached with a completed `RunOutput`.
//!
//! Persisted documents carry a `schema_version`. Newer versions are rejected
//! on load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use barscan_core::determinism::RunId;
use barscan_core::domain::ClosedTrade;
use barscan_core::report::PerformanceReport;
use barscan_core::RunOutput;

use crate::runner::RunnerError;

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

pub const TRADES_FILE: &str = "trades.json";
pub const REPORT_FILE: &str = "report.json";

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Contents of `trades.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLedger {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub symbol: String,
    pub trades: Vec<ClosedTrade>,
}

/// Contents of `report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub report: PerformanceReport,
}

/// Everything persisted for one successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunArtifacts {
    pub trades: TradeLedger,
    pub report: ReportDocument,
}

impl From<&RunOutput> for RunArtifacts {
    fn from(output: &RunOutput) -> Self {
        Self {
            trades: TradeLedger {
                schema_version: SCHEMA_VERSION,
                run_id: output.run_id.clone(),
                symbol: output.report.symbol.clone(),
                trades: output.trades.clone(),
            },
            report: ReportDocument {
                schema_version: SCHEMA_VERSION,
                report: output.report.clone(),
            },
        }
    }
}

/// Where `write_artifacts` put each file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub trades: PathBuf,
    pub report: PathBuf,
}

/// Write `trades.json` and `report.json` under `dir`, creating it if needed.
pub fn write_artifacts(
    dir: &Path,
    artifacts: &RunArtifacts,
) -> Result<ArtifactPaths, RunnerError> {
    let trades_json = serde_json::to_string_pretty(&artifacts.trades)?;
    let report_json = serde_json::to_string_pretty(&artifacts.report)?;

    fs::create_dir_all(dir).map_err(|e| RunnerError::io(dir, e))?;
    let paths = ArtifactPaths {
        trades: dir.join(TRADES_FILE),
        report: dir.join(REPORT_FILE),
    };
    let trades_tmp = stage(&paths.trades, trades_json.as_bytes())?;
    let report_tmp = match stage(&paths.report, report_json.as_bytes()) {
        Ok(tmp) => tmp,
        Err(err) => {
            discard(&[&trades_tmp]);
            return Err(err);
        }
    };
    if let Err(e) = fs::rename(&trades_tmp, &paths.trades) {
        discard(&[&trades_tmp, &report_tmp]);
        return Err(RunnerError::io(&paths.trades, e));
    }
    if let Err(e) = fs::rename(&report_tmp, &paths.report) {
        discard(&[&report_tmp, &paths.trades]);
        return Err(RunnerError::io(&paths.report, e));
    }

    info!(
        run_id = %artifacts.trades.run_id,
        dir = %dir.display(),
        trades = artifacts.trades.trades.len(),
        "artifacts written"
    );
    Ok(paths)
}

/// Read both artifacts back from `dir`.
pub fn load_artifacts(dir: &Path) -> Result<RunArtifacts, RunnerError> {
    let trades: TradeLedger = read_json(&dir.join(TRADES_FILE))?;
    check_schema(trades.schema_version)?;
    let report: ReportDocument = read_json(&dir.join(REPORT_FILE))?;
    check_schema(report.schema_version)?;
    Ok(RunArtifacts { trades, report })
}

fn check_schema(found: u32) -> Result<(), RunnerError> {
    if found > SCHEMA_VERSION {
        return Err(RunnerError::UnsupportedSchema {
            found,
            max: SCHEMA_VERSION,
        });
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, RunnerError> {
    let text = fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write `bytes` to a temp file next to `path` and return the temp path.
fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf, RunnerError> {
    let tmp = temp_path(path);
    if let Err(e) = fs::write(&tmp, bytes) {
        discard(&[&tmp]);
        return Err(RunnerError::io(path, e));
    }
    Ok(tmp)
}

/// Best-effort removal after a failed export.
fn discard<P: AsRef<Path>>(paths: &[P]) {
    for path in paths {
        let _ = fs::remove_file(path.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_file_sits_beside_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.json");
        let tmp = stage(&path, b"first").unwrap();

        assert_eq!(tmp, dir.path().join(".trades.json.tmp"));
        assert_eq!(fs::read_to_string(&tmp).unwrap(), "first");
        assert!(!path.exists());
    }

    #[test]
    fn staging_into_missing_dir_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("report.json");
        let err = stage(&path, b"{}").unwrap_err();
        assert!(matches!(err, RunnerError::Io { .. }));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn newer_schema_is_rejected() {
        assert!(check_schema(SCHEMA_VERSION).is_ok());
        assert!(matches!(
            check_schema(SCHEMA_VERSION + 1),
            Err(RunnerError::UnsupportedSchema { found, max })
                if found == SCHEMA_VERSION + 1 && max == SCHEMA_VERSION
        ));
    }
}
