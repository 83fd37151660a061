//! Run orchestration: config + data files + sinks + history around one engine.
//!
//! Entry points:
//! - `run_backtest()`: one historical run, blocking. Used by tools and tests.
//! - `run_engine()`: any mode, awaited on the caller's tokio runtime.
//! - `run_batch()`: many historical runs fanned out over rayon.
//!
//! Strategies are not part of the configuration. Each entry point takes a
//! `setup` closure that registers them (plus any feeds or connectors) on the
//! prepared `EngineBuilder`.

use chrono::Utc;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use tandem_core::config::RunConfig;
use tandem_core::data::{DropStats, SourceError, SourceSpec};
use tandem_core::mode::{EngineBuilder, EngineFatalError, RunOutcome};

use crate::config::ConfigError;
use crate::csv_source::CsvSource;
use crate::history::{BacktestHistory, BacktestRecord, RunFacts};
use crate::sink::JsonlSink;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineFatalError),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where a run reads relative data paths from and writes its artifacts to.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Base for relative `data` paths (usually the config file's directory).
    pub base_dir: PathBuf,
    /// JSONL file receiving terminal orders and fills.
    pub records_path: Option<PathBuf>,
    /// Backtest history directory; `None` disables history.
    pub history_dir: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_records(mut self, path: impl Into<PathBuf>) -> Self {
        self.records_path = Some(path.into());
        self
    }

    pub fn with_history(mut self, dir: impl Into<PathBuf>) -> Self {
        self.history_dir = Some(dir.into());
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Present when history is enabled.
    pub record: Option<BacktestRecord>,
}

/// Builder with the config's data files and the options' sink attached.
pub fn prepare(config: RunConfig, options: &RunOptions) -> Result<EngineBuilder, RunError> {
    let mut specs = Vec::with_capacity(config.data.len());
    for data in &config.data {
        let source = Arc::new(CsvSource::new(options.resolve(&data.path)));
        specs.push(match data.resample {
            Some(period) => SourceSpec::resampled(source, period),
            None => SourceSpec::new(source),
        });
    }

    let mut builder = EngineBuilder::new(config);
    for spec in specs {
        builder = builder.source_spec(spec);
    }
    if let Some(path) = &options.records_path {
        let sink = JsonlSink::create(path).map_err(|source| RunError::Io {
            path: path.clone(),
            source,
        })?;
        builder = builder.sink(Box::new(sink));
    }
    Ok(builder)
}

/// One historical run, start to finish, on the calling thread.
pub fn run_backtest<F>(config: RunConfig, options: &RunOptions, setup: F) -> Result<RunSummary, RunError>
where
    F: FnOnce(EngineBuilder) -> EngineBuilder,
{
    let started_at = Utc::now();
    let builder = setup(prepare(config.clone(), options)?);
    let strategies = builder.strategy_names();
    let outcome = builder.build()?.run_blocking()?;
    let finished_at = Utc::now();

    let record = match &options.history_dir {
        Some(dir) => Some(record_history(dir, &config, &outcome, strategies, started_at, finished_at)?),
        None => None,
    };
    log_outcome(&config, &outcome);
    Ok(RunSummary { outcome, record })
}

/// Any mode, including paper and live. Must be awaited inside a tokio runtime.
pub async fn run_engine<F>(config: RunConfig, options: &RunOptions, setup: F) -> Result<RunSummary, RunError>
where
    F: FnOnce(EngineBuilder) -> EngineBuilder,
{
    let started_at = Utc::now();
    let builder = setup(prepare(config.clone(), options)?);
    let strategies = builder.strategy_names();
    let outcome = builder.build()?.run().await;
    let finished_at = Utc::now();

    let record = match &options.history_dir {
        Some(dir) => Some(record_history(dir, &config, &outcome, strategies, started_at, finished_at)?),
        None => None,
    };
    log_outcome(&config, &outcome);
    Ok(RunSummary { outcome, record })
}

/// Run every config in parallel. Results come back in input order.
///
/// Each run gets its own records file (`<stem>-<index>.jsonl` next to
/// `records_path`). History is appended sequentially once all runs finish,
/// so iteration numbers follow input order.
pub fn run_batch<F>(configs: &[RunConfig], options: &RunOptions, setup: F) -> Vec<Result<RunSummary, RunError>>
where
    F: Fn(EngineBuilder) -> EngineBuilder + Sync,
{
    let per_run: Vec<RunOptions> = (0..configs.len())
        .map(|i| RunOptions {
            base_dir: options.base_dir.clone(),
            records_path: options.records_path.as_deref().map(|p| numbered(p, i)),
            history_dir: None,
        })
        .collect();

    let results: Vec<_> = configs
        .par_iter()
        .zip(per_run.par_iter())
        .map(|(config, opts)| -> Result<_, RunError> {
            let started_at = Utc::now();
            let builder = setup(prepare(config.clone(), opts)?);
            let strategies = builder.strategy_names();
            let outcome = builder.build()?.run_blocking()?;
            Ok((outcome, strategies, started_at, Utc::now()))
        })
        .collect();

    info!(runs = configs.len(), "batch finished");

    configs
        .iter()
        .zip(results)
        .map(|(config, result)| {
            let (outcome, strategies, started_at, finished_at) = result?;
            let record = match &options.history_dir {
                Some(dir) => Some(record_history(dir, config, &outcome, strategies, started_at, finished_at)?),
                None => None,
            };
            Ok(RunSummary { outcome, record })
        })
        .collect()
}

fn record_history(
    dir: &Path,
    config: &RunConfig,
    outcome: &RunOutcome,
    strategies: Vec<String>,
    started_at: chrono::DateTime<Utc>,
    finished_at: chrono::DateTime<Utc>,
) -> Result<BacktestRecord, RunError> {
    let facts = RunFacts {
        strategies,
        started_at,
        finished_at,
        order_count: outcome.submissions().len(),
        fill_count: outcome.fills().len(),
        drops: outcome.drops(),
    };
    BacktestHistory::new(dir)
        .record(config, &outcome.run_id().0, facts)
        .map_err(|source| RunError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

fn log_outcome(config: &RunConfig, outcome: &RunOutcome) {
    let drops = outcome.drops();
    info!(
        name = %config.name,
        mode = %config.mode,
        run_id = outcome.run_id().short(),
        orders = outcome.submissions().len(),
        fills = outcome.fills().len(),
        "run finished"
    );
    if drops != DropStats::default() {
        warn!(name = %config.name, ?drops, "records dropped during replay");
    }
}

fn numbered(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "records".into());
    path.with_file_name(format!("{stem}-{index}.jsonl"))
}
