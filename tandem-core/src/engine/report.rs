//! What a finished run hands back.

use serde::{Deserialize, Serialize};

use super::{DispatchStats, SchedulerPhase};
use crate::data::DropStats;
use crate::domain::{
    Fill, Order, OrderAuditEntry, OrderId, OrderType, Position, RunId, Side, StrategyId, Symbol,
    Timestamp, VenueId,
};
use crate::runtime::{InstanceStats, StrategyState};

/// An order as the strategy asked for it, before any gateway touched it.
///
/// The submission log is what backtest/live parity is judged on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub order_id: OrderId,
    pub strategy: StrategyId,
    pub venue: VenueId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: f64,
    pub order_type: OrderType,
    pub created_at: Timestamp,
}

impl From<&Order> for SubmissionRecord {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            strategy: order.strategy.clone(),
            venue: order.venue.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            order_type: order.order_type,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub id: StrategyId,
    pub state: StrategyState,
    pub stats: InstanceStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub phase: SchedulerPhase,
    /// Data time of the first and last dispatched event.
    pub first_event: Option<Timestamp>,
    pub last_event: Option<Timestamp>,
    pub submissions: Vec<SubmissionRecord>,
    pub orders: Vec<Order>,
    pub fills: Vec<Fill>,
    pub audit_trail: Vec<OrderAuditEntry>,
    pub positions: Vec<Position>,
    pub strategies: Vec<StrategyReport>,
    pub stats: DispatchStats,
    pub drops: DropStats,
}

impl RunReport {
    pub fn position(&self, venue: &VenueId, symbol: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| &p.venue == venue && p.symbol == symbol)
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    pub fn fills_for(&self, id: OrderId) -> impl Iterator<Item = &Fill> {
        self.fills.iter().filter(move |f| f.order_id == id)
    }
}
