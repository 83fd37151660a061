//! Simulated gateway: order book + execution simulator, fully synchronous.
//!
//! Submission acknowledges immediately and tries a fill against the latest
//! quote at or before the order's decision time. Working orders are matched
//! on each subsequent market event for their symbol, in submission order.

use tracing::warn;

use super::{validate_new, GatewayError, OrderBook, VenueGateway};
use crate::domain::{
    Event, Order, OrderAuditEntry, OrderId, OrderState, OrderUpdate, Timestamp, UpdateKind, VenueId,
};
use crate::execution::ExecutionSimulator;

pub const RUN_TERMINATED: &str = "run terminated";

pub struct SimulatedGateway {
    venue: VenueId,
    book: OrderBook,
    simulator: ExecutionSimulator,
    updates: Vec<OrderUpdate>,
}

impl SimulatedGateway {
    pub fn new(venue: VenueId, simulator: ExecutionSimulator) -> Self {
        Self {
            venue,
            book: OrderBook::new(),
            simulator,
            updates: Vec::new(),
        }
    }

    pub fn simulator(&self) -> &ExecutionSimulator {
        &self.simulator
    }

    fn try_fill(&mut self, id: OrderId, as_of: Timestamp) {
        let Some(order) = self.book.get(id) else {
            return;
        };
        if !order.state.is_open() {
            return;
        }
        let Some(fill) = self.simulator.match_order(order, as_of) else {
            return;
        };
        match self.book.record_fill(&fill) {
            Ok(order) => {
                let order = order.clone();
                self.updates
                    .push(OrderUpdate::new(order, UpdateKind::Filled { fill }));
            }
            Err(e) => warn!(venue = %self.venue, error = %e, "simulated fill not recorded"),
        }
    }
}

impl VenueGateway for SimulatedGateway {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    fn submit(&mut self, order: Order, now: Timestamp) -> Result<(), GatewayError> {
        let reject = validate_new(&order)?;
        let id = order.id;
        let created_at = order.created_at;
        self.book.insert(order)?;

        if let Some(reason) = reject {
            let order = self.book.reject(id, reason.clone(), now)?.clone();
            self.updates
                .push(OrderUpdate::new(order, UpdateKind::Rejected { reason }));
            return Ok(());
        }

        let order = self
            .book
            .transition(id, OrderState::Submitted, now, "accepted")?
            .clone();
        self.updates.push(OrderUpdate::new(order, UpdateKind::Accepted));
        self.try_fill(id, created_at);
        Ok(())
    }

    fn cancel(&mut self, order_id: OrderId, now: Timestamp) -> Result<(), GatewayError> {
        let reason = "cancelled by strategy";
        let order = self.book.cancel(order_id, now, reason)?.clone();
        self.updates.push(OrderUpdate::new(
            order,
            UpdateKind::Cancelled {
                reason: reason.to_string(),
            },
        ));
        Ok(())
    }

    fn on_market(&mut self, event: &Event) {
        if event.venue() != &self.venue || !self.simulator.on_market(event) {
            return;
        }
        let working: Vec<OrderId> = self
            .book
            .open_orders()
            .into_iter()
            .filter(|o| o.symbol == event.symbol())
            .map(|o| o.id)
            .collect();
        for id in working {
            self.try_fill(id, event.timestamp());
        }
    }

    fn poll_updates(&mut self) -> Vec<OrderUpdate> {
        std::mem::take(&mut self.updates)
    }

    fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.book.get(order_id)
    }

    fn open_orders(&self) -> Vec<&Order> {
        self.book.open_orders()
    }

    fn orders(&self) -> Vec<&Order> {
        self.book.orders()
    }

    fn audit_trail(&self) -> &[OrderAuditEntry] {
        self.book.audit_trail()
    }

    fn shutdown(&mut self, now: Timestamp, _cancel_open: bool) {
        for id in self.book.open_ids() {
            match self.book.cancel(id, now, RUN_TERMINATED) {
                Ok(order) => {
                    let order = order.clone();
                    self.updates.push(OrderUpdate::new(
                        order,
                        UpdateKind::Cancelled {
                            reason: RUN_TERMINATED.to_string(),
                        },
                    ));
                }
                Err(e) => warn!(venue = %self.venue, error = %e, "cancel at shutdown failed"),
            }
        }
    }
}
