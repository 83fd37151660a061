//! Live feeds: push-based record producers, one tokio task each.
//!
//! Every feed task encodes and filters its own records, then pushes events
//! into one bounded mpsc channel. That channel is the merge point the live
//! scheduler consumes; no other path into the scheduler exists.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::stream::admit_record;
use super::{DropCounters, RawRecord, RecordFilter, RecordIter};
use crate::domain::Event;

/// A live data collaborator. Delivery may be at-least-once; duplicates are filtered.
#[async_trait]
pub trait LiveFeed: Send + 'static {
    fn name(&self) -> &str;

    /// Next raw record, or `None` once the feed has ended.
    async fn next_record(&mut self) -> Option<RawRecord>;
}

/// Receiving side of the running feeds.
pub struct LiveStreams {
    pub events: mpsc::Receiver<Event>,
    pub handles: Vec<JoinHandle<()>>,
    pub counters: Vec<Arc<DropCounters>>,
}

impl LiveStreams {
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Spawn one task per feed on `handle`, all sending into a single channel.
///
/// The channel closes once every feed has ended.
pub fn spawn_feeds(feeds: Vec<Box<dyn LiveFeed>>, capacity: usize, handle: &Handle) -> LiveStreams {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let mut handles = Vec::with_capacity(feeds.len());
    let mut counters = Vec::with_capacity(feeds.len());

    for mut feed in feeds {
        let tx = tx.clone();
        let drops = Arc::new(DropCounters::default());
        counters.push(Arc::clone(&drops));
        handles.push(handle.spawn(async move {
            let name = feed.name().to_string();
            let mut filter = RecordFilter::new();
            info!(feed = %name, "live feed started");
            while let Some(record) = feed.next_record().await {
                if let Some(event) = admit_record(&name, &record, &mut filter, &drops) {
                    if tx.send(event).await.is_err() {
                        debug!(feed = %name, "scheduler gone, stopping feed");
                        break;
                    }
                }
            }
            info!(feed = %name, "live feed ended");
        }));
    }

    LiveStreams {
        events: rx,
        handles,
        counters,
    }
}

/// Feed backed by an mpsc receiver; the sending side plays the venue.
pub struct ChannelFeed {
    name: String,
    rx: mpsc::Receiver<RawRecord>,
}

impl ChannelFeed {
    pub fn new(name: impl Into<String>, capacity: usize) -> (mpsc::Sender<RawRecord>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            Self {
                name: name.into(),
                rx,
            },
        )
    }
}

#[async_trait]
impl LiveFeed for ChannelFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_record(&mut self) -> Option<RawRecord> {
        self.rx.recv().await
    }
}

/// Replays historical records as a live feed (scripted feeds, paper dry runs).
pub struct ReplayFeed {
    name: String,
    records: RecordIter,
}

impl ReplayFeed {
    pub fn new(name: impl Into<String>, records: RecordIter) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

#[async_trait]
impl LiveFeed for ReplayFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_record(&mut self) -> Option<RawRecord> {
        loop {
            match self.records.next()? {
                Ok(record) => {
                    tokio::task::yield_now().await;
                    return Some(record);
                }
                Err(e) => tracing::warn!(feed = %self.name, error = %e, "skipping unreadable record"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tick(secs: i64, price: f64) -> RawRecord {
        RawRecord::tick(Utc.timestamp_opt(secs, 0).unwrap(), "sim", "X", price, 1.0)
    }

    #[tokio::test]
    async fn feed_dedups_at_least_once_delivery() {
        let (tx, feed) = ChannelFeed::new("ws", 16);
        let mut streams = spawn_feeds(vec![Box::new(feed)], 16, &Handle::current());
        for rec in [tick(1, 10.0), tick(1, 10.0), tick(2, 11.0)] {
            tx.send(rec).await.unwrap();
        }
        drop(tx);

        let mut got = Vec::new();
        while let Some(ev) = streams.events.recv().await {
            got.push(ev.timestamp().timestamp());
        }
        assert_eq!(got, vec![1, 2]);
        assert_eq!(streams.counters[0].snapshot().duplicate, 1);
    }

    #[tokio::test]
    async fn replay_feed_ends_with_its_records() {
        let records: Vec<Result<RawRecord, crate::data::SourceError>> =
            vec![Ok(tick(1, 1.0)), Ok(tick(2, 2.0))];
        let feed = ReplayFeed::new("replay", Box::new(records.into_iter()));
        let mut streams = spawn_feeds(vec![Box::new(feed)], 4, &Handle::current());
        let mut n = 0;
        while streams.events.recv().await.is_some() {
            n += 1;
        }
        assert_eq!(n, 2);
    }
}
