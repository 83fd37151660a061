//! Fire-and-forget record sink for terminal orders and fills.
//!
//! The engine never waits on a sink and never learns whether a write
//! succeeded; persistence is someone else's problem.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::domain::{Fill, Order};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum RunRecord {
    Fill(Fill),
    /// An order that reached a terminal state.
    Order(Order),
}

pub trait RecordSink: Send {
    fn record(&mut self, record: &RunRecord);

    fn flush(&mut self) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn record(&mut self, _record: &RunRecord) {}
}

/// Collects records in memory; clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<RunRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RunRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl RecordSink for MemorySink {
    fn record(&mut self, record: &RunRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}
