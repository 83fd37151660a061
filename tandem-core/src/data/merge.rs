//! K-way timestamp merge across sources.
//!
//! Holds at most one pending event per source in a min-heap keyed by
//! `(timestamp, source index)`, so ties resolve by source index and then by
//! each source's own order. The merge point stamps the global arrival
//! sequence number.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::domain::{Event, Timestamp};

pub type BoxedEvents = Box<dyn Iterator<Item = Event> + Send>;

struct HeapEntry {
    ts: Timestamp,
    source: usize,
    event: Event,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.ts, self.source).cmp(&(other.ts, other.source))
    }
}

pub struct MergedStream {
    sources: Vec<BoxedEvents>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    next_seq: u64,
    primed: bool,
}

impl MergedStream {
    pub fn new(sources: Vec<BoxedEvents>) -> Self {
        let cap = sources.len();
        Self {
            sources,
            heap: BinaryHeap::with_capacity(cap),
            next_seq: 0,
            primed: false,
        }
    }

    fn pull(&mut self, source: usize) {
        if let Some(event) = self.sources[source].next() {
            self.heap.push(Reverse(HeapEntry {
                ts: event.timestamp(),
                source,
                event,
            }));
        }
    }
}

impl Iterator for MergedStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if !self.primed {
            self.primed = true;
            for i in 0..self.sources.len() {
                self.pull(i);
            }
        }
        let Reverse(entry) = self.heap.pop()?;
        self.pull(entry.source);
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(entry.event.with_seq(seq))
    }
}

/// Merge per-source streams into one globally non-decreasing stream.
pub fn merge(streams: Vec<BoxedEvents>) -> MergedStream {
    MergedStream::new(streams)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketData, Trade, VenueId};
    use chrono::{TimeZone, Utc};

    fn ticks(symbol: &str, secs: &[i64]) -> BoxedEvents {
        let events: Vec<Event> = secs
            .iter()
            .map(|&s| {
                Event::market(
                    Utc.timestamp_opt(s, 0).unwrap(),
                    VenueId::from("sim"),
                    symbol,
                    MarketData::Tick(Trade { price: 1.0, size: 1.0 }),
                )
            })
            .collect();
        Box::new(events.into_iter())
    }

    #[test]
    fn merges_interleaved_sources() {
        let merged: Vec<i64> = merge(vec![ticks("A", &[1, 3, 5]), ticks("B", &[2, 4, 6])])
            .map(|e| e.timestamp().timestamp())
            .collect();
        assert_eq!(merged, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn ties_break_by_source_index_then_source_order() {
        let merged: Vec<(String, u64)> = merge(vec![ticks("B", &[1, 1]), ticks("A", &[1])])
            .map(|e| (e.symbol().to_string(), e.seq()))
            .collect();
        assert_eq!(
            merged,
            vec![("B".into(), 0), ("B".into(), 1), ("A".into(), 2)]
        );
    }

    #[test]
    fn empty_sources_are_fine() {
        assert_eq!(merge(vec![ticks("A", &[]), ticks("B", &[])]).count(), 0);
        assert_eq!(merge(Vec::new()).count(), 0);
    }
}
