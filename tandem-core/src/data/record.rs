//! Raw source records and `encode`: the only way market data becomes an `Event`.
//!
//! One flat record schema covers all three resolutions, so CSV files and live
//! feeds share a format:
//! - orderbook: `bids` / `asks` as `price:size|price:size`, best level first
//! - tick: `price`, `size`
//! - bar: `ts` is the window start, `end` the window end; OHLCV fields
//!
//! Bar events are stamped with the window end: a bar is only known once it closes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    Bar, BookSnapshot, Event, Level, MarketData, ResolutionKind, Timestamp, Trade, VenueId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub ts: Timestamp,
    pub venue: String,
    pub symbol: String,
    pub resolution: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub end: Option<Timestamp>,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub bids: Option<String>,
    #[serde(default)]
    pub asks: Option<String>,
}

impl RawRecord {
    fn empty(ts: Timestamp, venue: &str, symbol: &str, resolution: &str) -> Self {
        Self {
            ts,
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            resolution: resolution.to_string(),
            price: None,
            size: None,
            end: None,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            bids: None,
            asks: None,
        }
    }

    pub fn tick(ts: Timestamp, venue: &str, symbol: &str, price: f64, size: f64) -> Self {
        Self {
            price: Some(price),
            size: Some(size),
            ..Self::empty(ts, venue, symbol, "tick")
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn bar(
        start: Timestamp,
        end: Timestamp,
        venue: &str,
        symbol: &str,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            end: Some(end),
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
            ..Self::empty(start, venue, symbol, "bar")
        }
    }

    pub fn book(ts: Timestamp, venue: &str, symbol: &str, bids: &[Level], asks: &[Level]) -> Self {
        Self {
            bids: Some(format_levels(bids)),
            asks: Some(format_levels(asks)),
            ..Self::empty(ts, venue, symbol, "orderbook")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedRecordError {
    #[error("unknown resolution '{0}'")]
    UnknownResolution(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be finite and positive, got {value}")]
    InvalidPrice { field: &'static str, value: f64 },

    #[error("field '{field}' must be finite and non-negative, got {value}")]
    InvalidSize { field: &'static str, value: f64 },

    #[error("bar high {high} is below low {low}")]
    HighBelowLow { high: f64, low: f64 },

    #[error("bar {field} {value} outside [low, high]")]
    OutsideRange { field: &'static str, value: f64 },

    #[error("bar window is empty: end must be after start")]
    EmptyWindow,

    #[error("unparseable book level '{0}'")]
    InvalidLevel(String),

    #[error("{0} levels are not sorted best-first")]
    UnsortedLevels(&'static str),

    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    CrossedBook { bid: f64, ask: f64 },
}

/// Encode a raw record into a market `Event`.
///
/// Total for well-formed records of a supported resolution.
pub fn encode(record: &RawRecord) -> Result<Event, MalformedRecordError> {
    if record.venue.trim().is_empty() {
        return Err(MalformedRecordError::MissingField("venue"));
    }
    if record.symbol.trim().is_empty() {
        return Err(MalformedRecordError::MissingField("symbol"));
    }
    let resolution = ResolutionKind::parse(&record.resolution)
        .ok_or_else(|| MalformedRecordError::UnknownResolution(record.resolution.clone()))?;

    let (timestamp, data) = match resolution {
        ResolutionKind::Tick => (record.ts, MarketData::Tick(encode_tick(record)?)),
        ResolutionKind::Bar => {
            let bar = encode_bar(record)?;
            (bar.end, MarketData::Bar(bar))
        }
        ResolutionKind::OrderBook => (record.ts, MarketData::Book(encode_book(record)?)),
    };

    Ok(Event::market(
        timestamp,
        VenueId::new(record.venue.trim()),
        record.symbol.trim(),
        data,
    ))
}

// ── Per-resolution validation ───────────────────────────────────────

fn price(field: &'static str, value: Option<f64>) -> Result<f64, MalformedRecordError> {
    let v = value.ok_or(MalformedRecordError::MissingField(field))?;
    if !v.is_finite() || v <= 0.0 {
        return Err(MalformedRecordError::InvalidPrice { field, value: v });
    }
    Ok(v)
}

fn size(field: &'static str, value: Option<f64>) -> Result<f64, MalformedRecordError> {
    let v = value.ok_or(MalformedRecordError::MissingField(field))?;
    if !v.is_finite() || v < 0.0 {
        return Err(MalformedRecordError::InvalidSize { field, value: v });
    }
    Ok(v)
}

fn encode_tick(record: &RawRecord) -> Result<Trade, MalformedRecordError> {
    Ok(Trade {
        price: price("price", record.price)?,
        size: size("size", record.size)?,
    })
}

fn encode_bar(record: &RawRecord) -> Result<Bar, MalformedRecordError> {
    let end = record.end.ok_or(MalformedRecordError::MissingField("end"))?;
    if end <= record.ts {
        return Err(MalformedRecordError::EmptyWindow);
    }
    let open = price("open", record.open)?;
    let high = price("high", record.high)?;
    let low = price("low", record.low)?;
    let close = price("close", record.close)?;
    let volume = size("volume", record.volume)?;

    if high < low {
        return Err(MalformedRecordError::HighBelowLow { high, low });
    }
    for (field, value) in [("open", open), ("close", close)] {
        if value < low || value > high {
            return Err(MalformedRecordError::OutsideRange { field, value });
        }
    }

    Ok(Bar {
        start: record.ts,
        end,
        open,
        high,
        low,
        close,
        volume,
    })
}

fn encode_book(record: &RawRecord) -> Result<BookSnapshot, MalformedRecordError> {
    let bids = parse_levels(
        record
            .bids
            .as_deref()
            .ok_or(MalformedRecordError::MissingField("bids"))?,
    )?;
    let asks = parse_levels(
        record
            .asks
            .as_deref()
            .ok_or(MalformedRecordError::MissingField("asks"))?,
    )?;

    if bids.windows(2).any(|w| w[0].price <= w[1].price) {
        return Err(MalformedRecordError::UnsortedLevels("bid"));
    }
    if asks.windows(2).any(|w| w[0].price >= w[1].price) {
        return Err(MalformedRecordError::UnsortedLevels("ask"));
    }
    if let (Some(bid), Some(ask)) = (bids.first(), asks.first()) {
        if bid.price >= ask.price {
            return Err(MalformedRecordError::CrossedBook {
                bid: bid.price,
                ask: ask.price,
            });
        }
    }

    Ok(BookSnapshot { bids, asks })
}

/// Parse `price:size|price:size`. An empty string is an empty side.
pub fn parse_levels(s: &str) -> Result<Vec<Level>, MalformedRecordError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split('|')
        .map(|pair| {
            let (p, q) = pair
                .split_once(':')
                .ok_or_else(|| MalformedRecordError::InvalidLevel(pair.to_string()))?;
            let p: f64 = p
                .trim()
                .parse()
                .map_err(|_| MalformedRecordError::InvalidLevel(pair.to_string()))?;
            let q: f64 = q
                .trim()
                .parse()
                .map_err(|_| MalformedRecordError::InvalidLevel(pair.to_string()))?;
            Ok(Level {
                price: price("level price", Some(p))?,
                size: size("level size", Some(q))?,
            })
        })
        .collect()
}

pub fn format_levels(levels: &[Level]) -> String {
    levels
        .iter()
        .map(|l| format!("{}:{}", l.price, l.size))
        .collect::<Vec<_>>()
        .join("|")
}
