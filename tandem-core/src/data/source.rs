//! Historical sources: restartable suppliers of raw records.

use std::sync::Arc;
use thiserror::Error;

use super::RawRecord;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{name}': {message}")]
    Read { name: String, message: String },

    #[error("source io: {0}")]
    Io(#[from] std::io::Error),
}

pub type RecordIter = Box<dyn Iterator<Item = Result<RawRecord, SourceError>> + Send>;

/// A historical data collaborator.
///
/// `open` may be called any number of times; every call yields the records
/// from the beginning, in timestamp order.
pub trait HistoricalSource: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self) -> Result<RecordIter, SourceError>;
}

/// In-memory source over a shared record vector.
#[derive(Debug, Clone)]
pub struct VecSource {
    name: String,
    records: Arc<Vec<RawRecord>>,
}

impl VecSource {
    pub fn new(name: impl Into<String>, records: Vec<RawRecord>) -> Self {
        Self {
            name: name.into(),
            records: Arc::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl HistoricalSource for VecSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<RecordIter, SourceError> {
        let records = Arc::clone(&self.records);
        Ok(Box::new(
            (0..records.len()).map(move |i| Ok(records[i].clone())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn vec_source_restarts_from_the_beginning() {
        let src = VecSource::new(
            "mem",
            (1..=3)
                .map(|i| RawRecord::tick(Utc.timestamp_opt(i, 0).unwrap(), "sim", "X", 100.0, 1.0))
                .collect(),
        );
        let first: Vec<_> = src.open().unwrap().map(|r| r.unwrap().ts).collect();
        let second: Vec<_> = src.open().unwrap().map(|r| r.unwrap().ts).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }
}
