//! Venue gateways: one contract for simulated and live order handling.
//!
//! Every variant:
//! - owns the orders it accepted (the runtime only keeps read-only snapshots)
//! - refuses to submit anything that is not `Created` (`InvalidOrderState`)
//! - refuses to cancel unknown ids (`OrderNotFound`) and terminal orders
//!   (`InvalidOrderState`) with no side effect
//! - reports every change as an `OrderUpdate` through `poll_updates`

pub mod live;
pub mod order_book;
pub mod router;
pub mod simulated;

pub use live::{ConnectorError, ExecutionReport, LiveGateway, ReportKind, VenueConnector};
pub use order_book::OrderBook;
pub use router::GatewayRouter;
pub use simulated::SimulatedGateway;

use std::time::Duration;
use thiserror::Error;

use crate::domain::{Event, Order, OrderAuditEntry, OrderId, OrderState, OrderUpdate, RejectReason, Timestamp, VenueId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("order {order_id} is in state {state}")]
    InvalidOrderState { order_id: OrderId, state: OrderState },

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("no gateway for venue {0}")]
    UnknownVenue(VenueId),

    #[error("venue did not answer within {0:?}")]
    Timeout(Duration),

    #[error("connector: {0}")]
    Connector(String),
}

impl GatewayError {
    /// Reason carried by the OrderUpdate that reports this error to a strategy.
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            Self::InvalidOrderState { .. } => RejectReason::InvalidOrderState,
            Self::OrderNotFound(_) => RejectReason::OrderNotFound,
            Self::UnknownVenue(_) => RejectReason::UnknownVenue,
            Self::Timeout(_) => RejectReason::GatewayTimeout,
            Self::Connector(msg) => RejectReason::Venue(msg.clone()),
        }
    }
}

pub trait VenueGateway: Send {
    fn venue(&self) -> &VenueId;

    /// Take ownership of a `Created` order and send it to the venue.
    ///
    /// Venue-side refusals (bad quantity, venue reject, timeout) are not
    /// errors here: they arrive later as `Rejected` updates.
    fn submit(&mut self, order: Order, now: Timestamp) -> Result<(), GatewayError>;

    fn cancel(&mut self, order_id: OrderId, now: Timestamp) -> Result<(), GatewayError>;

    /// Observe a market event for this venue (simulated variants match working orders).
    fn on_market(&mut self, event: &Event);

    /// Drain the updates produced since the last poll.
    fn poll_updates(&mut self) -> Vec<OrderUpdate>;

    fn order(&self, order_id: OrderId) -> Option<&Order>;

    fn open_orders(&self) -> Vec<&Order>;

    fn orders(&self) -> Vec<&Order>;

    fn audit_trail(&self) -> &[OrderAuditEntry];

    /// Requests sent but not yet acknowledged.
    fn in_flight(&self) -> usize {
        0
    }

    /// Stop accepting work. `cancel_open` asks a live venue to cancel working
    /// orders; simulated venues always cancel theirs ("run terminated").
    fn shutdown(&mut self, now: Timestamp, cancel_open: bool);
}

/// Pre-submission check shared by all variants.
pub(crate) fn validate_new(order: &Order) -> Result<Option<RejectReason>, GatewayError> {
    if order.state != OrderState::Created {
        return Err(GatewayError::InvalidOrderState {
            order_id: order.id,
            state: order.state,
        });
    }
    if !order.quantity.is_finite() || order.quantity <= 0.0 {
        return Ok(Some(RejectReason::InvalidQuantity));
    }
    if let Some(limit) = order.limit_price() {
        if !limit.is_finite() || limit <= 0.0 {
            return Ok(Some(RejectReason::InvalidPrice));
        }
    }
    Ok(None)
}
