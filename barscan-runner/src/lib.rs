//! Barscan Runner: configuration, logging and persistence around `barscan-core`.
//!
//! This crate provides:
//! - TOML run configuration with up-front policy validation
//! - `tracing` subscriber initialisation driven by `BARSCAN_LOG`
//! - A `/proc/meminfo` memory probe for the resource guard
//! - Atomic JSON export of the trade list and performance report

pub mod config;
pub mod export;
pub mod logging;
pub mod probe;
pub mod runner;

pub use config::{ConfigError, ManifestRef, RunConfig};
pub use export::{load_artifacts, write_artifacts, ArtifactPaths, RunArtifacts, SCHEMA_VERSION};
pub use probe::ProcMeminfoProbe;
pub use runner::{run_and_export, run_config_file, run_from_config, run_with_sink, RunnerError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_and_artifacts_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<RunArtifacts>();
        assert_sync::<RunArtifacts>();
        assert_send::<ProcMeminfoProbe>();
        assert_sync::<ProcMeminfoProbe>();
    }
}
