//! Data resolution adapter: raw records in, ordered `Event`s out.
//!
//! - `record`: raw schema + `encode`
//! - `source`: restartable historical sources
//! - `stream`: per-source filtering (malformed, out-of-order, duplicate)
//! - `merge`: k-way timestamp merge with global sequence numbers
//! - `resample`: tick → bar conversion over half-open windows
//! - `live`: tokio feed tasks feeding one channel

pub mod live;
pub mod merge;
pub mod record;
pub mod resample;
pub mod source;
pub mod stream;

pub use live::{spawn_feeds, ChannelFeed, LiveFeed, LiveStreams, ReplayFeed};
pub use merge::{merge, BoxedEvents, MergedStream};
pub use record::{encode, format_levels, parse_levels, MalformedRecordError, RawRecord};
pub use resample::{bars_from_ticks, Resample};
pub use source::{HistoricalSource, RecordIter, SourceError, VecSource};
pub use stream::{stream, Admission, DropCounters, DropStats, EventStream, RecordFilter};

use std::sync::Arc;

use crate::domain::BarPeriod;

/// A historical source plus the optional tick → bar conversion applied to it.
#[derive(Clone)]
pub struct SourceSpec {
    pub source: Arc<dyn HistoricalSource>,
    pub resample: Option<BarPeriod>,
}

impl SourceSpec {
    pub fn new(source: Arc<dyn HistoricalSource>) -> Self {
        Self {
            source,
            resample: None,
        }
    }

    pub fn resampled(source: Arc<dyn HistoricalSource>, period: BarPeriod) -> Self {
        Self {
            source,
            resample: Some(period),
        }
    }
}

/// An opened replay: the merged stream plus each source's drop counters.
pub struct Replay {
    pub events: MergedStream,
    pub counters: Vec<Arc<DropCounters>>,
}

/// Open every source from the beginning and merge them.
pub fn replay(specs: &[SourceSpec]) -> Result<Replay, SourceError> {
    let mut streams: Vec<BoxedEvents> = Vec::with_capacity(specs.len());
    let mut counters = Vec::with_capacity(specs.len());
    for spec in specs {
        let s = stream(spec.source.as_ref())?;
        counters.push(s.counters());
        match spec.resample {
            Some(period) => streams.push(Box::new(Resample::new(s, period))),
            None => streams.push(Box::new(s)),
        }
    }
    Ok(Replay {
        events: merge(streams),
        counters,
    })
}

impl Replay {
    pub fn drops(&self) -> DropStats {
        self.counters
            .iter()
            .fold(DropStats::default(), |acc, c| acc.merge(c.snapshot()))
    }
}
