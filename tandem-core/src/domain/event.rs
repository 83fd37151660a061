//! Canonical event representation.
//!
//! An `Event` is an immutable value: fields are private and only readable
//! through accessors. The scheduler orders events by `(timestamp, seq)`;
//! `seq` is assigned at the merge point and is the only field the engine
//! ever stamps, before the event is dispatched.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Fill, MarketData, Order, ResolutionKind, StrategyId, Symbol, Timestamp, VenueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Market(ResolutionKind),
    OrderUpdate,
    Timer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Market(MarketData),
    OrderUpdate(OrderUpdate),
    Timer(TimerFired),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    timestamp: Timestamp,
    seq: u64,
    venue: VenueId,
    symbol: Symbol,
    payload: EventPayload,
}

impl Event {
    pub fn market(
        timestamp: Timestamp,
        venue: VenueId,
        symbol: impl Into<Symbol>,
        data: MarketData,
    ) -> Self {
        Self {
            timestamp,
            seq: 0,
            venue,
            symbol: symbol.into(),
            payload: EventPayload::Market(data),
        }
    }

    pub fn order_update(timestamp: Timestamp, update: OrderUpdate) -> Self {
        Self {
            timestamp,
            seq: 0,
            venue: update.order.venue.clone(),
            symbol: update.order.symbol.clone(),
            payload: EventPayload::OrderUpdate(update),
        }
    }

    pub fn timer(timestamp: Timestamp, timer: TimerFired) -> Self {
        Self {
            timestamp,
            seq: 0,
            venue: VenueId::engine(),
            symbol: Symbol::new(),
            payload: EventPayload::Timer(timer),
        }
    }

    pub(crate) fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn venue(&self) -> &VenueId {
        &self.venue
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Ordering key used by the scheduler.
    pub fn key(&self) -> (Timestamp, u64) {
        (self.timestamp, self.seq)
    }

    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::Market(data) => EventKind::Market(data.kind()),
            EventPayload::OrderUpdate(_) => EventKind::OrderUpdate,
            EventPayload::Timer(_) => EventKind::Timer,
        }
    }

    pub fn market_data(&self) -> Option<&MarketData> {
        match &self.payload {
            EventPayload::Market(data) => Some(data),
            _ => None,
        }
    }
}

// ── Order updates ───────────────────────────────────────────────────

/// Why an order (or a cancel request) was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    GatewayTimeout,
    InvalidOrderState,
    OrderNotFound,
    InvalidQuantity,
    InvalidPrice,
    UnknownVenue,
    Venue(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GatewayTimeout => f.write_str("gateway timeout"),
            Self::InvalidOrderState => f.write_str("invalid order state"),
            Self::OrderNotFound => f.write_str("order not found"),
            Self::InvalidQuantity => f.write_str("invalid quantity"),
            Self::InvalidPrice => f.write_str("invalid limit price"),
            Self::UnknownVenue => f.write_str("unknown venue"),
            Self::Venue(msg) => write!(f, "venue: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateKind {
    /// Venue acknowledged the order.
    Accepted,
    Filled { fill: Fill },
    Cancelled { reason: String },
    Rejected { reason: RejectReason },
    /// A cancel request was refused; the order itself is unchanged.
    CancelRejected { reason: RejectReason },
}

/// Order snapshot after the change, plus what changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order: Order,
    pub kind: UpdateKind,
}

impl OrderUpdate {
    pub fn new(order: Order, kind: UpdateKind) -> Self {
        Self { order, kind }
    }

    pub fn fill(&self) -> Option<&Fill> {
        match &self.kind {
            UpdateKind::Filled { fill } => Some(fill),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerFired {
    pub strategy: StrategyId,
    pub name: String,
}
