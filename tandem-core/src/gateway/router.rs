//! Venue id → gateway routing.
//!
//! Order ids are unique per run (one `OrderIdGen` shared by all strategies),
//! so the router remembers which venue owns each accepted order and routes
//! cancels there.

use std::collections::{BTreeMap, HashMap};

use super::{GatewayError, VenueGateway};
use crate::domain::{Event, Order, OrderAuditEntry, OrderId, OrderUpdate, Timestamp, VenueId};

#[derive(Default)]
pub struct GatewayRouter {
    gateways: BTreeMap<VenueId, Box<dyn VenueGateway>>,
    routes: HashMap<OrderId, VenueId>,
}

impl GatewayRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gateway under its own venue id, replacing any previous one.
    pub fn insert(&mut self, gateway: Box<dyn VenueGateway>) {
        self.gateways.insert(gateway.venue().clone(), gateway);
    }

    pub fn with(mut self, gateway: Box<dyn VenueGateway>) -> Self {
        self.insert(gateway);
        self
    }

    pub fn venues(&self) -> impl Iterator<Item = &VenueId> {
        self.gateways.keys()
    }

    pub fn contains(&self, venue: &VenueId) -> bool {
        self.gateways.contains_key(venue)
    }

    pub fn gateway(&self, venue: &VenueId) -> Option<&dyn VenueGateway> {
        self.gateways.get(venue).map(|g| g.as_ref())
    }

    pub fn submit(&mut self, order: Order, now: Timestamp) -> Result<(), GatewayError> {
        let venue = order.venue.clone();
        let id = order.id;
        let gateway = self
            .gateways
            .get_mut(&venue)
            .ok_or_else(|| GatewayError::UnknownVenue(venue.clone()))?;
        gateway.submit(order, now)?;
        self.routes.insert(id, venue);
        Ok(())
    }

    pub fn cancel(&mut self, order_id: OrderId, now: Timestamp) -> Result<(), GatewayError> {
        let gateway = self
            .routes
            .get(&order_id)
            .and_then(|venue| self.gateways.get_mut(venue))
            .ok_or(GatewayError::OrderNotFound(order_id))?;
        gateway.cancel(order_id, now)
    }

    /// Show a market event to the gateway of its venue.
    pub fn on_market(&mut self, event: &Event) {
        if let Some(gateway) = self.gateways.get_mut(event.venue()) {
            gateway.on_market(event);
        }
    }

    /// Updates from every gateway, in venue order.
    pub fn poll_updates(&mut self) -> Vec<OrderUpdate> {
        self.gateways
            .values_mut()
            .flat_map(|g| g.poll_updates())
            .collect()
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        let venue = self.routes.get(&order_id)?;
        self.gateways.get(venue)?.order(order_id)
    }

    /// All orders of the run, sorted by id (submission order).
    pub fn orders(&self) -> Vec<&Order> {
        let mut all: Vec<&Order> = self.gateways.values().flat_map(|g| g.orders()).collect();
        all.sort_by_key(|o| o.id);
        all
    }

    pub fn open_orders(&self) -> Vec<&Order> {
        let mut open: Vec<&Order> = self
            .gateways
            .values()
            .flat_map(|g| g.open_orders())
            .collect();
        open.sort_by_key(|o| o.id);
        open
    }

    /// Audit trails of all venues merged by timestamp (stable within a venue).
    pub fn audit_trail(&self) -> Vec<OrderAuditEntry> {
        let mut trail: Vec<OrderAuditEntry> = self
            .gateways
            .values()
            .flat_map(|g| g.audit_trail().iter().cloned())
            .collect();
        trail.sort_by_key(|e| e.timestamp);
        trail
    }

    pub fn in_flight(&self) -> usize {
        self.gateways.values().map(|g| g.in_flight()).sum()
    }

    pub fn shutdown(&mut self, now: Timestamp, cancel_open: bool) {
        for gateway in self.gateways.values_mut() {
            gateway.shutdown(now, cancel_open);
        }
    }
}
