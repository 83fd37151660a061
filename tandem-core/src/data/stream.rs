//! Lazy per-source event streams with drop-and-log filtering.
//!
//! Data anomalies never abort a run. Each dropped record is logged with
//! `tracing::warn!` and counted:
//! - malformed: `encode` failed
//! - out of order: timestamp earlier than the previous admitted record
//! - duplicate: identical record at the current timestamp (at-least-once feeds)

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::{encode, HistoricalSource, RawRecord, RecordIter, SourceError};
use crate::domain::{Event, Timestamp};

/// Shared drop counters for one source.
#[derive(Debug, Default)]
pub struct DropCounters {
    malformed: AtomicU64,
    out_of_order: AtomicU64,
    duplicate: AtomicU64,
    read_errors: AtomicU64,
}

impl DropCounters {
    pub fn snapshot(&self) -> DropStats {
        DropStats {
            malformed: self.malformed.load(Ordering::Relaxed),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
        }
    }

    /// Count an event refused at a merge point for arriving too late.
    pub fn count_out_of_order(&self) {
        Self::bump(&self.out_of_order);
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropStats {
    pub malformed: u64,
    pub out_of_order: u64,
    pub duplicate: u64,
    pub read_errors: u64,
}

impl DropStats {
    pub fn total(&self) -> u64 {
        self.malformed + self.out_of_order + self.duplicate + self.read_errors
    }

    pub fn merge(mut self, other: DropStats) -> Self {
        self.malformed += other.malformed;
        self.out_of_order += other.out_of_order;
        self.duplicate += other.duplicate;
        self.read_errors += other.read_errors;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    OutOfOrder,
    Duplicate,
}

/// Per-source ordering and dedup state.
#[derive(Debug, Default)]
pub struct RecordFilter {
    last_ts: Option<Timestamp>,
    seen_at_last: Vec<RawRecord>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, record: &RawRecord, ts: Timestamp) -> Admission {
        match self.last_ts {
            Some(last) if ts < last => Admission::OutOfOrder,
            Some(last) if ts == last => {
                if self.seen_at_last.contains(record) {
                    Admission::Duplicate
                } else {
                    self.seen_at_last.push(record.clone());
                    Admission::Accept
                }
            }
            _ => {
                self.last_ts = Some(ts);
                self.seen_at_last.clear();
                self.seen_at_last.push(record.clone());
                Admission::Accept
            }
        }
    }
}

/// Encode + filter one raw record, updating counters. Shared with live feeds.
pub(crate) fn admit_record(
    source: &str,
    record: &RawRecord,
    filter: &mut RecordFilter,
    counters: &DropCounters,
) -> Option<Event> {
    let event = match encode(record) {
        Ok(event) => event,
        Err(e) => {
            warn!(source, error = %e, ts = %record.ts, "dropping malformed record");
            DropCounters::bump(&counters.malformed);
            return None;
        }
    };
    match filter.admit(record, event.timestamp()) {
        Admission::Accept => Some(event),
        Admission::OutOfOrder => {
            warn!(source, ts = %event.timestamp(), symbol = event.symbol(), "dropping out-of-order record");
            DropCounters::bump(&counters.out_of_order);
            None
        }
        Admission::Duplicate => {
            warn!(source, ts = %event.timestamp(), symbol = event.symbol(), "dropping duplicate record");
            DropCounters::bump(&counters.duplicate);
            None
        }
    }
}

/// Ordered, lazy sequence of events from one source.
pub struct EventStream {
    name: String,
    records: RecordIter,
    filter: RecordFilter,
    counters: Arc<DropCounters>,
}

impl EventStream {
    pub fn new(name: impl Into<String>, records: RecordIter) -> Self {
        Self {
            name: name.into(),
            records,
            filter: RecordFilter::new(),
            counters: Arc::new(DropCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<DropCounters> {
        Arc::clone(&self.counters)
    }
}

impl Iterator for EventStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            match self.records.next()? {
                Ok(record) => {
                    if let Some(event) =
                        admit_record(&self.name, &record, &mut self.filter, &self.counters)
                    {
                        return Some(event);
                    }
                }
                Err(e) => {
                    warn!(source = %self.name, error = %e, "dropping unreadable record");
                    DropCounters::bump(&self.counters.read_errors);
                }
            }
        }
    }
}

/// Open a historical source as a fresh event stream.
pub fn stream(source: &dyn HistoricalSource) -> Result<EventStream, SourceError> {
    Ok(EventStream::new(source.name(), source.open()?))
}
