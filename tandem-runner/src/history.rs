//! Backtest history: JSONL append-only log plus a JSON iteration index.
//!
//! Every finished backtest becomes one `BacktestRecord`. Runs are grouped by
//! a strategy hash (strategy names plus the configuration with data paths
//! removed), so re-running the same strategy on new data files counts up
//! the iteration number instead of starting a new lineage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use tandem_core::config::RunConfig;
use tandem_core::data::DropStats;
use tandem_core::mode::Mode;

pub const RECORDS_FILE: &str = "backtests.jsonl";
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRecord {
    /// `<strategy hash prefix>-<iteration>`.
    pub backtest_id: String,
    pub strategy_hash: String,
    pub iteration: u32,
    pub run_id: String,
    pub name: String,
    pub mode: Mode,
    pub strategies: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub order_count: usize,
    pub fill_count: usize,
    pub drops: DropStats,
}

/// What a finished run contributes to its record.
#[derive(Debug, Clone)]
pub struct RunFacts {
    pub strategies: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub order_count: usize,
    pub fill_count: usize,
    pub drops: DropStats,
}

/// BLAKE3 over the sorted strategy names and the configuration minus its data files.
pub fn strategy_hash(config: &RunConfig, strategies: &[String]) -> String {
    let mut config = config.clone();
    config.data.clear();
    let mut names = strategies.to_vec();
    names.sort();

    let mut hasher = blake3::Hasher::new();
    for name in &names {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(&serde_json::to_vec(&config).unwrap_or_default());
    hasher.finalize().to_hex().to_string()
}

pub struct BacktestHistory {
    dir: PathBuf,
}

impl BacktestHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn records_path(&self) -> PathBuf {
        self.dir.join(RECORDS_FILE)
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn read_index(&self) -> io::Result<BTreeMap<String, u32>> {
        match fs::read_to_string(self.index_path()) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e),
        }
    }

    fn write_index(&self, index: &BTreeMap<String, u32>) -> io::Result<()> {
        let json = serde_json::to_string_pretty(index)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        // Write-then-rename so a crash never leaves half an index behind.
        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(tmp, self.index_path())
    }

    /// Iterations recorded so far for `hash`.
    pub fn iterations(&self, hash: &str) -> io::Result<u32> {
        Ok(self.read_index()?.get(hash).copied().unwrap_or(0))
    }

    /// Assign the next iteration number for this run and append its record.
    pub fn record(&self, config: &RunConfig, run_id: &str, facts: RunFacts) -> io::Result<BacktestRecord> {
        fs::create_dir_all(&self.dir)?;
        let hash = strategy_hash(config, &facts.strategies);
        let mut index = self.read_index()?;
        let iteration = index.get(&hash).copied().unwrap_or(0) + 1;

        let duration_ms = (facts.finished_at - facts.started_at)
            .num_milliseconds()
            .max(0) as u64;
        let record = BacktestRecord {
            backtest_id: format!("{}-{iteration}", &hash[..12]),
            strategy_hash: hash.clone(),
            iteration,
            run_id: run_id.to_string(),
            name: config.name.clone(),
            mode: config.mode,
            strategies: facts.strategies,
            started_at: facts.started_at,
            finished_at: facts.finished_at,
            duration_ms,
            order_count: facts.order_count,
            fill_count: facts.fill_count,
            drops: facts.drops,
        };

        let json = serde_json::to_string(&record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.records_path())?;
        writeln!(file, "{json}")?;
        file.flush()?;

        index.insert(hash, iteration);
        self.write_index(&index)?;
        debug!(id = %record.backtest_id, "backtest recorded");
        Ok(record)
    }

    /// Every record, oldest first. Malformed lines are skipped.
    pub fn read_all(&self) -> io::Result<Vec<BacktestRecord>> {
        let path = self.records_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = io::BufReader::new(fs::File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str(&line) {
                records.push(record);
            }
        }
        Ok(records)
    }
}
