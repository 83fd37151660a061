//! Orders and the order state machine.
//!
//! Created → Submitted → PartiallyFilled → Filled
//!                    ↘ Cancelled / Rejected
//!
//! Orders are built by the strategy runtime in `Created`, then owned by a venue
//! gateway, which is the only place state transitions happen.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{OrderId, RejectReason, StrategyId, Symbol, Timestamp, VenueId, QTY_EPSILON};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit { limit_price: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    Created,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Working at the venue: can still fill or be cancelled.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Submitted | Self::PartiallyFilled)
    }

    /// Legal transitions of the order state machine.
    pub fn can_transition_to(self, to: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, to),
            (Created, Submitted)
                | (Created, Rejected)
                | (Submitted, PartiallyFilled)
                | (Submitted, Filled)
                | (Submitted, Cancelled)
                | (Submitted, Rejected)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
        )
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a strategy asks for; the runtime turns it into an `Order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub venue: VenueId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: f64,
    pub order_type: OrderType,
}

impl OrderRequest {
    pub fn market(venue: VenueId, symbol: impl Into<Symbol>, side: Side, quantity: f64) -> Self {
        Self {
            venue,
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
        }
    }

    pub fn limit(
        venue: VenueId,
        symbol: impl Into<Symbol>,
        side: Side,
        quantity: f64,
        limit_price: f64,
    ) -> Self {
        Self {
            venue,
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Limit { limit_price },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub strategy: StrategyId,
    pub venue: VenueId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: f64,
    pub order_type: OrderType,
    /// Decision time: the timestamp of the event being handled when the order was built.
    pub created_at: Timestamp,
    pub filled_quantity: f64,
    pub avg_fill_price: Option<f64>,
    pub state: OrderState,
    pub reject_reason: Option<RejectReason>,
}

impl Order {
    pub fn new(
        id: OrderId,
        strategy: StrategyId,
        request: OrderRequest,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            strategy,
            venue: request.venue,
            symbol: request.symbol,
            side: request.side,
            quantity: request.quantity,
            order_type: request.order_type,
            created_at,
            filled_quantity: 0.0,
            avg_fill_price: None,
            state: OrderState::Created,
            reject_reason: None,
        }
    }

    pub fn remaining(&self) -> f64 {
        (self.quantity - self.filled_quantity).max(0.0)
    }

    pub fn is_fully_filled(&self) -> bool {
        self.remaining() <= QTY_EPSILON
    }

    pub fn limit_price(&self) -> Option<f64> {
        match self.order_type {
            OrderType::Limit { limit_price } => Some(limit_price),
            OrderType::Market => None,
        }
    }

    /// Client-generated id passed to live venues; stable across retries.
    pub fn client_order_id(&self) -> String {
        format!("{}-{}", self.strategy, self.id.0)
    }

    /// Signed remaining quantity (+ buys, - sells).
    pub fn signed_remaining(&self) -> f64 {
        self.side.sign() * self.remaining()
    }

    /// Fold a fill into filled quantity and volume-weighted average price.
    pub(crate) fn apply_fill(&mut self, quantity: f64, price: f64) {
        let prev_qty = self.filled_quantity;
        let new_qty = prev_qty + quantity;
        let prev_avg = self.avg_fill_price.unwrap_or(0.0);
        self.avg_fill_price = Some((prev_avg * prev_qty + price * quantity) / new_qty);
        self.filled_quantity = new_qty;
    }
}

/// One state transition in an order's life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAuditEntry {
    pub order_id: OrderId,
    pub timestamp: Timestamp,
    pub from: OrderState,
    pub to: OrderState,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn order(qty: f64) -> Order {
        Order::new(
            OrderId(7),
            StrategyId::new("s"),
            OrderRequest::market(VenueId::from("sim"), "X", Side::Buy, qty),
            Utc.timestamp_opt(1, 0).unwrap(),
        )
    }

    #[test]
    fn new_order_is_created_and_unfilled() {
        let o = order(10.0);
        assert_eq!(o.state, OrderState::Created);
        assert_eq!(o.remaining(), 10.0);
        assert_eq!(o.avg_fill_price, None);
        assert_eq!(o.client_order_id(), "s-7");
    }

    #[test]
    fn apply_fill_tracks_vwap() {
        let mut o = order(10.0);
        o.apply_fill(4.0, 100.0);
        o.apply_fill(6.0, 105.0);
        assert!(o.is_fully_filled());
        let avg = o.avg_fill_price.unwrap();
        assert!((avg - 103.0).abs() < 1e-12);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        use OrderState::*;
        let all = [Created, Submitted, PartiallyFilled, Filled, Cancelled, Rejected];
        for from in [Filled, Cancelled, Rejected] {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn created_only_moves_to_submitted_or_rejected() {
        use OrderState::*;
        assert!(Created.can_transition_to(Submitted));
        assert!(Created.can_transition_to(Rejected));
        assert!(!Created.can_transition_to(Filled));
        assert!(!Created.can_transition_to(Cancelled));
    }

    #[test]
    fn side_sign_and_opposite() {
        assert_eq!(Side::Buy.sign(), 1.0);
        assert_eq!(Side::Sell.sign(), -1.0);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }
}
