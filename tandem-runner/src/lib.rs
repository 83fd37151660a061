//! Tandem Runner: configuration files, CSV data, record sinks, backtest history.
//!
//! This crate builds on `tandem-core` to provide:
//! - TOML loading and validation of `RunConfig`
//! - A CSV-backed historical source
//! - A JSONL record sink for terminal orders and fills
//! - Backtest history (JSONL records, per-strategy iteration index)
//! - Single, async and parallel batch run entry points
//! - Tracing subscriber setup

pub mod config;
pub mod csv_source;
pub mod history;
pub mod logging;
pub mod runner;
pub mod sink;

pub use config::{load_config, parse_config, to_toml, ConfigError};
pub use csv_source::{write_records, CsvSource};
pub use history::{strategy_hash, BacktestHistory, BacktestRecord, RunFacts};
pub use runner::{prepare, run_backtest, run_batch, run_engine, RunError, RunOptions, RunSummary};
pub use sink::{read_records, JsonlSink};

use anyhow::Context;
use std::path::Path;
use tandem_core::mode::EngineBuilder;

/// Load the config at `path` and run it as a backtest, data paths relative to the file.
pub fn run_file<F>(path: &Path, setup: F) -> anyhow::Result<RunSummary>
where
    F: FnOnce(EngineBuilder) -> EngineBuilder,
{
    let config = load_config(path).with_context(|| format!("loading {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let name = config.name.clone();
    run_backtest(config, &RunOptions::new(base), setup)
        .with_context(|| format!("running backtest '{name}'"))
}

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn csv_source_is_send_sync() {
        assert_send::<CsvSource>();
        assert_sync::<CsvSource>();
    }

    #[test]
    fn jsonl_sink_is_send() {
        assert_send::<JsonlSink>();
    }

    #[test]
    fn run_results_cross_threads() {
        assert_send::<RunSummary>();
        assert_send::<RunError>();
        assert_sync::<RunError>();
        assert_send::<BacktestRecord>();
        assert_sync::<BacktestRecord>();
    }
}
