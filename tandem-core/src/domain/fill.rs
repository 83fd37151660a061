use serde::{Deserialize, Serialize};

use super::{OrderId, Side, StrategyId, Symbol, Timestamp, VenueId};

/// Immutable execution record. Multiple fills may close one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub strategy: StrategyId,
    pub venue: VenueId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
    pub timestamp: Timestamp,
    /// Timestamp of the market data the price came from.
    pub market_timestamp: Timestamp,
}

impl Fill {
    /// Quantity signed by side (+ buy, - sell).
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }

    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}
