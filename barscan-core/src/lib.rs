//! Barscan Core: vectorized scan-and-simulate engine with pluggable risk policies.
//!
//! This crate contains the whole per-symbol backtest core:
//! - Columnar price series with named indicator columns
//! - Duplicate/gap resolver producing strictly increasing timestamps
//! - Indicator ownership registry (audit only, no indicator math)
//! - Batch scanner evaluating entry conditions over whole columns
//! - Risk manager composing stop, take-profit and sizing policies
//! - Batch simulator resolving each order against the subsequent bar path
//! - Determinism, progress, resource-guard and reporting infrastructure
//!
//! No file or network I/O happens here; inputs arrive as in-memory columns and
//! outputs are handed back to the caller.

pub mod alloc;
pub mod determinism;
pub mod domain;
pub mod error;
pub mod guard;
pub mod indicators;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod resolver;
pub mod risk;
pub mod scanner;
pub mod series;
pub mod simulator;
pub mod synthetic;

pub use error::{
    DataIntegrityError, EngineError, PolicyConfigError, ResourceError, ValidationError,
};
pub use pipeline::{Pipeline, PipelineConfig, RunOutput};
