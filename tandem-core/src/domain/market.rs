//! Market data payloads, tagged by resolution.
//!
//! - `OrderBook`: bid/ask levels, best first
//! - `Tick`: a single trade print
//! - `Bar`: OHLCV over a half-open window `[start, end)`

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::{Side, Timestamp};

/// Granularity of market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    #[serde(alias = "book", alias = "order_book")]
    OrderBook,
    Tick,
    Bar,
}

impl ResolutionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orderbook" | "order_book" | "book" => Some(Self::OrderBook),
            "tick" | "trade" => Some(Self::Tick),
            "bar" | "ohlcv" => Some(Self::Bar),
            _ => None,
        }
    }
}

impl fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OrderBook => "orderbook",
            Self::Tick => "tick",
            Self::Bar => "bar",
        };
        f.write_str(s)
    }
}

// ── Bar period ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarPeriodError {
    #[error("empty bar period")]
    Empty,

    #[error("invalid bar period '{0}': expected <n><s|m|h|d>, e.g. 5m")]
    Invalid(String),

    #[error("bar period must be positive, got '{0}'")]
    NonPositive(String),
}

/// Fixed bar width, aligned to the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BarPeriod {
    secs: i64,
}

impl BarPeriod {
    pub fn from_secs(secs: i64) -> Result<Self, BarPeriodError> {
        if secs <= 0 {
            return Err(BarPeriodError::NonPositive(secs.to_string()));
        }
        Ok(Self { secs })
    }

    /// Parse `"1s"`, `"5m"`, `"1h"`, `"1d"`.
    pub fn parse(s: &str) -> Result<Self, BarPeriodError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BarPeriodError::Empty);
        }
        let unit_at = s.len() - s.chars().last().map_or(0, char::len_utf8);
        let (digits, unit) = s.split_at(unit_at);
        let multiplier = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            _ => return Err(BarPeriodError::Invalid(s.to_string())),
        };
        let n: i64 = digits
            .parse()
            .map_err(|_| BarPeriodError::Invalid(s.to_string()))?;
        if n <= 0 {
            return Err(BarPeriodError::NonPositive(s.to_string()));
        }
        Ok(Self {
            secs: n * multiplier,
        })
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn millis(&self) -> i64 {
        self.secs * 1_000
    }

    /// Start of the window containing `ts`: `[start, start + period)`.
    pub fn window_start(&self, ts: Timestamp) -> Timestamp {
        let ms = ts.timestamp_millis();
        let start = ms.div_euclid(self.millis()) * self.millis();
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(start).unwrap_or(ts)
    }

    pub fn window_end(&self, ts: Timestamp) -> Timestamp {
        self.window_start(ts) + chrono::Duration::seconds(self.secs)
    }
}

impl fmt::Display for BarPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.secs;
        if s % 86_400 == 0 {
            write!(f, "{}d", s / 86_400)
        } else if s % 3_600 == 0 {
            write!(f, "{}h", s / 3_600)
        } else if s % 60 == 0 {
            write!(f, "{}m", s / 60)
        } else {
            write!(f, "{s}s")
        }
    }
}

impl TryFrom<String> for BarPeriod {
    type Error = BarPeriodError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<BarPeriod> for String {
    fn from(p: BarPeriod) -> Self {
        p.to_string()
    }
}

// ── Payloads ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub size: f64,
}

/// Book snapshot. Bids descend, asks ascend; index 0 is the best level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first().copied()
    }

    pub fn mid(&self) -> Option<f64> {
        Some((self.best_bid()?.price + self.best_ask()?.price) / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub start: Timestamp,
    pub end: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Resolution-tagged market data payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "lowercase")]
pub enum MarketData {
    #[serde(rename = "orderbook")]
    Book(BookSnapshot),
    Tick(Trade),
    Bar(Bar),
}

impl MarketData {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Self::Book(_) => ResolutionKind::OrderBook,
            Self::Tick(_) => ResolutionKind::Tick,
            Self::Bar(_) => ResolutionKind::Bar,
        }
    }

    /// Best available price for an aggressive order on `side`
    /// (book: opposing best level; tick: trade price; bar: close).
    pub fn executable_price(&self, side: Side) -> Option<f64> {
        match self {
            Self::Book(book) => match side {
                Side::Buy => book.best_ask().map(|l| l.price),
                Side::Sell => book.best_bid().map(|l| l.price),
            },
            Self::Tick(trade) => Some(trade.price),
            Self::Bar(bar) => Some(bar.close),
        }
    }

    /// Last/mark price used for valuation.
    pub fn mark_price(&self) -> Option<f64> {
        match self {
            Self::Book(book) => book.mid(),
            Self::Tick(trade) => Some(trade.price),
            Self::Bar(bar) => Some(bar.close),
        }
    }
}
