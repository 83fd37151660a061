//! Order book state machine: stores orders and records every transition.
//!
//! The order book is the gateway-side registry of orders. It manages:
//! - Order storage and lookup (open + historical, kept for the whole run)
//! - Legal state transitions only (see `OrderState::can_transition_to`)
//! - Fill bookkeeping (filled quantity, average price, Partial → Filled)
//! - Audit trail for every state transition
//!
//! The order book does NOT price fills; that is the simulator's (or the
//! venue's) job. It tracks order state only.

use std::collections::BTreeMap;
use tracing::debug;

use super::GatewayError;
use crate::domain::{
    Fill, Order, OrderAuditEntry, OrderId, OrderState, RejectReason, Timestamp, QTY_EPSILON,
};

#[derive(Debug, Default)]
pub struct OrderBook {
    /// All orders keyed by ID; BTreeMap keeps iteration in submission order.
    orders: BTreeMap<OrderId, Order>,

    /// Complete audit trail of every state transition.
    audit_trail: Vec<OrderAuditEntry>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Public API ─────────────────────────────────────────────────────

    /// Take ownership of a `Created` order.
    pub fn insert(&mut self, order: Order) -> Result<(), GatewayError> {
        if let Some(existing) = self.orders.get(&order.id) {
            return Err(GatewayError::InvalidOrderState {
                order_id: order.id,
                state: existing.state,
            });
        }
        if order.state != OrderState::Created {
            return Err(GatewayError::InvalidOrderState {
                order_id: order.id,
                state: order.state,
            });
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    /// Move an order to `to`, if the transition is legal.
    pub fn transition(
        &mut self,
        id: OrderId,
        to: OrderState,
        at: Timestamp,
        reason: &str,
    ) -> Result<&Order, GatewayError> {
        let order = self
            .orders
            .get_mut(&id)
            .ok_or(GatewayError::OrderNotFound(id))?;
        if !order.state.can_transition_to(to) {
            return Err(GatewayError::InvalidOrderState {
                order_id: id,
                state: order.state,
            });
        }
        let from = order.state;
        order.state = to;
        debug!(order = %id, %from, %to, reason, "order transition");
        self.audit_trail.push(OrderAuditEntry {
            order_id: id,
            timestamp: at,
            from,
            to,
            reason: reason.to_string(),
        });
        Ok(&self.orders[&id])
    }

    /// Reject an order, recording why.
    pub fn reject(
        &mut self,
        id: OrderId,
        reason: RejectReason,
        at: Timestamp,
    ) -> Result<&Order, GatewayError> {
        self.transition(id, OrderState::Rejected, at, &reason.to_string())?;
        let order = self
            .orders
            .get_mut(&id)
            .ok_or(GatewayError::OrderNotFound(id))?;
        order.reject_reason = Some(reason);
        Ok(order)
    }

    /// Cancel an open order.
    pub fn cancel(&mut self, id: OrderId, at: Timestamp, reason: &str) -> Result<&Order, GatewayError> {
        let order = self.orders.get(&id).ok_or(GatewayError::OrderNotFound(id))?;
        if !order.state.is_open() {
            return Err(GatewayError::InvalidOrderState {
                order_id: id,
                state: order.state,
            });
        }
        self.transition(id, OrderState::Cancelled, at, reason)
    }

    /// Record a fill, moving the order to PartiallyFilled or Filled.
    pub fn record_fill(&mut self, fill: &Fill) -> Result<&Order, GatewayError> {
        let order = self
            .orders
            .get_mut(&fill.order_id)
            .ok_or(GatewayError::OrderNotFound(fill.order_id))?;
        if !order.state.is_open() || fill.quantity > order.remaining() + QTY_EPSILON {
            return Err(GatewayError::InvalidOrderState {
                order_id: fill.order_id,
                state: order.state,
            });
        }
        order.apply_fill(fill.quantity, fill.price);
        let to = if order.is_fully_filled() {
            OrderState::Filled
        } else {
            OrderState::PartiallyFilled
        };
        self.transition(fill.order_id, to, fill.timestamp, "fill")
    }

    /// Open orders (Submitted or PartiallyFilled), in ID order.
    pub fn open_orders(&self) -> Vec<&Order> {
        self.orders.values().filter(|o| o.state.is_open()).collect()
    }

    pub fn open_ids(&self) -> Vec<OrderId> {
        self.orders
            .values()
            .filter(|o| o.state.is_open())
            .map(|o| o.id)
            .collect()
    }

    pub fn orders(&self) -> Vec<&Order> {
        self.orders.values().collect()
    }

    /// Get the full audit trail.
    pub fn audit_trail(&self) -> &[OrderAuditEntry] {
        &self.audit_trail
    }
}
