//! Domain types for Tandem

pub mod event;
pub mod fill;
pub mod ids;
pub mod market;
pub mod order;
pub mod position;

pub use event::{Event, EventKind, EventPayload, OrderUpdate, RejectReason, TimerFired, UpdateKind};
pub use fill::Fill;
pub use ids::{OrderId, OrderIdGen, RunId, StrategyId, VenueId};
pub use market::{
    Bar, BarPeriod, BarPeriodError, BookSnapshot, Level, MarketData, ResolutionKind, Trade,
};
pub use order::{Order, OrderAuditEntry, OrderRequest, OrderState, OrderType, Side};
pub use position::{Ledger, Position};

/// Symbol type alias
pub type Symbol = String;

/// Single reference clock for every event in a run (UTC).
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Quantities at or below this are treated as zero (remaining size, position flat).
pub const QTY_EPSILON: f64 = 1e-9;
