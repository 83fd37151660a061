//! Live gateway: orders go to a real venue through an async connector.
//!
//! Each submit/cancel is spawned as its own tokio task bounded by
//! `tokio::time::timeout`, so a slow venue never blocks event processing.
//! Results come back over channels and are turned into `OrderUpdate`s when
//! the scheduler polls:
//! - submit acknowledged → `Accepted`
//! - submit refused → `Rejected(Venue)`
//! - submit timed out → `Rejected(GatewayTimeout)`
//! - cancel refused / timed out → `CancelRejected`, order unchanged
//! - execution reports pushed by the connector → fills, venue cancels/rejects

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{validate_new, GatewayError, OrderBook, VenueGateway};
use crate::domain::{
    Event, Fill, Order, OrderAuditEntry, OrderId, OrderState, OrderUpdate, RejectReason,
    Timestamp, UpdateKind, VenueId,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectorError {
    #[error("rejected by venue: {0}")]
    Rejected(String),

    #[error("transport: {0}")]
    Transport(String),
}

/// Execution report pushed by a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub order_id: OrderId,
    pub timestamp: Timestamp,
    pub kind: ReportKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportKind {
    Fill {
        price: f64,
        quantity: f64,
        commission: f64,
    },
    Cancelled {
        reason: String,
    },
    Rejected {
        reason: String,
    },
}

/// Live connectivity collaborator for one venue.
#[async_trait]
pub trait VenueConnector: Send + Sync + 'static {
    /// Place an order. Must be idempotent per `order.client_order_id()`.
    async fn submit(&self, order: &Order) -> Result<(), ConnectorError>;

    async fn cancel(&self, order: &Order) -> Result<(), ConnectorError>;

    /// Venue-side state of an order, if the venue knows it.
    async fn query(&self, _order: &Order) -> Result<Option<OrderState>, ConnectorError> {
        Ok(None)
    }

    /// Register the channel execution reports are pushed into.
    fn subscribe(&self, reports: mpsc::UnboundedSender<ExecutionReport>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Submit,
    Cancel,
}

#[derive(Debug)]
enum Outcome {
    Done,
    Failed(ConnectorError),
    TimedOut,
}

#[derive(Debug)]
struct Ack {
    request: Request,
    order_id: OrderId,
    outcome: Outcome,
}

pub struct LiveGateway {
    venue: VenueId,
    connector: Arc<dyn VenueConnector>,
    runtime: Handle,
    timeout: Duration,
    book: OrderBook,
    acks_tx: mpsc::UnboundedSender<Ack>,
    acks_rx: mpsc::UnboundedReceiver<Ack>,
    reports_rx: mpsc::UnboundedReceiver<ExecutionReport>,
    updates: Vec<OrderUpdate>,
    in_flight: usize,
    clock: Option<Timestamp>,
    unmatched: Vec<ExecutionReport>,
}

impl LiveGateway {
    pub fn new(
        venue: VenueId,
        connector: Arc<dyn VenueConnector>,
        timeout: Duration,
        runtime: Handle,
    ) -> Self {
        let (acks_tx, acks_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        connector.subscribe(reports_tx);
        Self {
            venue,
            connector,
            runtime,
            timeout,
            book: OrderBook::new(),
            acks_tx,
            acks_rx,
            reports_rx,
            updates: Vec::new(),
            in_flight: 0,
            clock: None,
            unmatched: Vec::new(),
        }
    }

    /// Reports that could not be applied (unknown order, order already terminal).
    pub fn unmatched_reports(&self) -> &[ExecutionReport] {
        &self.unmatched
    }

    fn now(&self) -> Timestamp {
        self.clock.unwrap_or_else(chrono::Utc::now)
    }

    fn advance_clock(&mut self, ts: Timestamp) {
        self.clock = Some(self.clock.map_or(ts, |c| c.max(ts)));
    }

    fn spawn_request(&mut self, request: Request, order: Order) {
        let connector = Arc::clone(&self.connector);
        let tx = self.acks_tx.clone();
        let limit = self.timeout;
        self.in_flight += 1;
        self.runtime.spawn(async move {
            let result = match request {
                Request::Submit => tokio::time::timeout(limit, connector.submit(&order)).await,
                Request::Cancel => tokio::time::timeout(limit, connector.cancel(&order)).await,
            };
            let outcome = match result {
                Ok(Ok(())) => Outcome::Done,
                Ok(Err(e)) => Outcome::Failed(e),
                Err(_) => Outcome::TimedOut,
            };
            let _ = tx.send(Ack {
                request,
                order_id: order.id,
                outcome,
            });
        });
    }

    /// After a submit timeout the venue may still have the order; ask and log.
    fn spawn_orphan_check(&self, order: Order) {
        let connector = Arc::clone(&self.connector);
        let limit = self.timeout;
        let venue = self.venue.clone();
        self.runtime.spawn(async move {
            if let Ok(Ok(Some(state))) = tokio::time::timeout(limit, connector.query(&order)).await {
                if state.is_open() || state == OrderState::Filled {
                    warn!(
                        %venue,
                        order = %order.id,
                        client_id = %order.client_order_id(),
                        %state,
                        "order timed out locally but is live at the venue"
                    );
                }
            }
        });
    }

    fn push(&mut self, order: Order, kind: UpdateKind) {
        self.updates.push(OrderUpdate::new(order, kind));
    }

    fn apply_ack(&mut self, ack: Ack) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let now = self.now();
        let Some(order) = self.book.get(ack.order_id).cloned() else {
            return;
        };
        match (ack.request, ack.outcome) {
            (Request::Submit, Outcome::Done) => {
                if !order.state.is_terminal() {
                    self.push(order, UpdateKind::Accepted);
                }
            }
            (Request::Submit, Outcome::Failed(e)) => {
                self.reject_pending(order.id, RejectReason::Venue(e.to_string()), now)
            }
            (Request::Submit, Outcome::TimedOut) => {
                warn!(venue = %self.venue, order = %order.id, timeout = ?self.timeout, "submit timed out");
                self.reject_pending(order.id, RejectReason::GatewayTimeout, now);
                self.spawn_orphan_check(order);
            }
            (Request::Cancel, Outcome::Done) => {
                if order.state.is_open() {
                    self.cancel_local(order.id, now, "cancelled at venue");
                }
            }
            (Request::Cancel, Outcome::Failed(e)) => self.push(
                order,
                UpdateKind::CancelRejected {
                    reason: RejectReason::Venue(e.to_string()),
                },
            ),
            (Request::Cancel, Outcome::TimedOut) => self.push(
                order,
                UpdateKind::CancelRejected {
                    reason: RejectReason::GatewayTimeout,
                },
            ),
        }
    }

    fn reject_pending(&mut self, id: OrderId, reason: RejectReason, now: Timestamp) {
        let pending = self
            .book
            .get(id)
            .is_some_and(|o| o.state == OrderState::Submitted && o.filled_quantity == 0.0);
        if !pending {
            return;
        }
        match self.book.reject(id, reason.clone(), now) {
            Ok(order) => {
                let order = order.clone();
                self.push(order, UpdateKind::Rejected { reason });
            }
            Err(e) => warn!(venue = %self.venue, error = %e, "reject failed"),
        }
    }

    fn cancel_local(&mut self, id: OrderId, now: Timestamp, reason: &str) {
        match self.book.cancel(id, now, reason) {
            Ok(order) => {
                let order = order.clone();
                self.push(
                    order,
                    UpdateKind::Cancelled {
                        reason: reason.to_string(),
                    },
                );
            }
            Err(e) => warn!(venue = %self.venue, error = %e, "cancel not applied"),
        }
    }

    fn apply_report(&mut self, report: ExecutionReport) {
        self.advance_clock(report.timestamp);
        let Some(order) = self.book.get(report.order_id).cloned() else {
            warn!(venue = %self.venue, order = %report.order_id, "report for unknown order");
            self.unmatched.push(report);
            return;
        };
        match &report.kind {
            ReportKind::Fill {
                price,
                quantity,
                commission,
            } => {
                let fill = Fill {
                    order_id: order.id,
                    strategy: order.strategy.clone(),
                    venue: order.venue.clone(),
                    symbol: order.symbol.clone(),
                    side: order.side,
                    price: *price,
                    quantity: *quantity,
                    commission: *commission,
                    timestamp: report.timestamp,
                    market_timestamp: report.timestamp,
                };
                match self.book.record_fill(&fill) {
                    Ok(updated) => {
                        let updated = updated.clone();
                        self.push(updated, UpdateKind::Filled { fill });
                    }
                    Err(e) => {
                        warn!(venue = %self.venue, error = %e, "fill report could not be applied");
                        self.unmatched.push(report);
                    }
                }
            }
            ReportKind::Cancelled { reason } => {
                if order.state.is_open() {
                    self.cancel_local(order.id, report.timestamp, reason);
                }
            }
            ReportKind::Rejected { reason } => {
                self.reject_pending(order.id, RejectReason::Venue(reason.clone()), report.timestamp)
            }
        }
    }
}

impl VenueGateway for LiveGateway {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    fn submit(&mut self, order: Order, now: Timestamp) -> Result<(), GatewayError> {
        self.advance_clock(now);
        let reject = validate_new(&order)?;
        let id = order.id;
        self.book.insert(order)?;

        if let Some(reason) = reject {
            let order = self.book.reject(id, reason.clone(), now)?.clone();
            self.push(order, UpdateKind::Rejected { reason });
            return Ok(());
        }

        let order = self
            .book
            .transition(id, OrderState::Submitted, now, "sent to venue")?
            .clone();
        self.spawn_request(Request::Submit, order);
        Ok(())
    }

    fn cancel(&mut self, order_id: OrderId, now: Timestamp) -> Result<(), GatewayError> {
        self.advance_clock(now);
        let order = self
            .book
            .get(order_id)
            .ok_or(GatewayError::OrderNotFound(order_id))?;
        if !order.state.is_open() {
            return Err(GatewayError::InvalidOrderState {
                order_id,
                state: order.state,
            });
        }
        let order = order.clone();
        self.spawn_request(Request::Cancel, order);
        Ok(())
    }

    fn on_market(&mut self, event: &Event) {
        self.advance_clock(event.timestamp());
    }

    fn poll_updates(&mut self) -> Vec<OrderUpdate> {
        while let Ok(ack) = self.acks_rx.try_recv() {
            self.apply_ack(ack);
        }
        while let Ok(report) = self.reports_rx.try_recv() {
            self.apply_report(report);
        }
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

    fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn shutdown(&mut self, now: Timestamp, cancel_open: bool) {
        self.advance_clock(now);
        let open: Vec<Order> = self.book.open_orders().into_iter().cloned().collect();
        if !cancel_open {
            if !open.is_empty() {
                info!(venue = %self.venue, working = open.len(), "leaving live orders working at the venue");
            }
            return;
        }
        for order in open {
            self.spawn_request(Request::Cancel, order);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderRequest, Side, StrategyId};
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockConnector {
        delay: Duration,
        fill_price: Option<f64>,
        reject: bool,
        placed: Mutex<Vec<String>>,
        reports: Mutex<Option<mpsc::UnboundedSender<ExecutionReport>>>,
    }

    #[async_trait]
    impl VenueConnector for MockConnector {
        async fn submit(&self, order: &Order) -> Result<(), ConnectorError> {
            tokio::time::sleep(self.delay).await;
            if self.reject {
                return Err(ConnectorError::Rejected("insufficient margin".into()));
            }
            let client_id = order.client_order_id();
            {
                let mut placed = self.placed.lock().unwrap();
                if placed.contains(&client_id) {
                    return Ok(());
                }
                placed.push(client_id);
            }
            if let (Some(price), Some(tx)) = (self.fill_price, self.reports.lock().unwrap().as_ref()) {
                let _ = tx.send(ExecutionReport {
                    order_id: order.id,
                    timestamp: order.created_at,
                    kind: ReportKind::Fill {
                        price,
                        quantity: order.quantity,
                        commission: 0.0,
                    },
                });
            }
            Ok(())
        }

        async fn cancel(&self, _order: &Order) -> Result<(), ConnectorError> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        fn subscribe(&self, reports: mpsc::UnboundedSender<ExecutionReport>) {
            *self.reports.lock().unwrap() = Some(reports);
        }
    }

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn order(id: u64) -> Order {
        Order::new(
            OrderId(id),
            StrategyId::new("s"),
            OrderRequest::market(VenueId::from("live"), "X", Side::Buy, 3.0),
            t(1),
        )
    }

    fn gateway(connector: MockConnector, timeout: Duration) -> LiveGateway {
        LiveGateway::new(
            VenueId::from("live"),
            Arc::new(connector),
            timeout,
            Handle::current(),
        )
    }

    async fn settle(gw: &mut LiveGateway) -> Vec<OrderUpdate> {
        let mut all = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            all.extend(gw.poll_updates());
            if gw.in_flight() == 0 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        all.extend(gw.poll_updates());
        all
    }

    #[tokio::test]
    async fn ack_then_fill_report() {
        let mut gw = gateway(
            MockConnector {
                fill_price: Some(101.0),
                ..Default::default()
            },
            Duration::from_secs(1),
        );
        gw.submit(order(1), t(1)).unwrap();
        assert_eq!(gw.in_flight(), 1);
        let updates = settle(&mut gw).await;
        let kinds: Vec<&UpdateKind> = updates.iter().map(|u| &u.kind).collect();
        assert_eq!(kinds.len(), 2);
        assert!(matches!(kinds[0], UpdateKind::Accepted));
        assert!(matches!(kinds[1], UpdateKind::Filled { .. }));
        assert_eq!(gw.order(OrderId(1)).unwrap().state, OrderState::Filled);
    }

    #[tokio::test]
    async fn slow_venue_times_out_as_rejected() {
        let mut gw = gateway(
            MockConnector {
                delay: Duration::from_secs(5),
                ..Default::default()
            },
            Duration::from_millis(20),
        );
        gw.submit(order(1), t(1)).unwrap();
        let updates = settle(&mut gw).await;
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0].kind,
            UpdateKind::Rejected {
                reason: RejectReason::GatewayTimeout
            }
        );
        assert_eq!(
            gw.order(OrderId(1)).unwrap().reject_reason,
            Some(RejectReason::GatewayTimeout)
        );
        assert_eq!(gw.in_flight(), 0);
    }

    #[tokio::test]
    async fn venue_rejection_becomes_update() {
        let mut gw = gateway(
            MockConnector {
                reject: true,
                ..Default::default()
            },
            Duration::from_secs(1),
        );
        gw.submit(order(1), t(1)).unwrap();
        let updates = settle(&mut gw).await;
        assert!(matches!(
            &updates[0].kind,
            UpdateKind::Rejected { reason: RejectReason::Venue(_) }
        ));
    }

    #[tokio::test]
    async fn cancel_errors_are_immediate() {
        let mut gw = gateway(MockConnector::default(), Duration::from_secs(1));
        assert_eq!(
            gw.cancel(OrderId(3), t(1)),
            Err(GatewayError::OrderNotFound(OrderId(3)))
        );
        let mut filled = order(4);
        filled.state = OrderState::Filled;
        assert!(matches!(
            gw.submit(filled, t(1)),
            Err(GatewayError::InvalidOrderState { .. })
        ));
    }

    #[tokio::test]
    async fn shutdown_leaves_orders_unless_asked() {
        let mut gw = gateway(MockConnector::default(), Duration::from_secs(1));
        gw.submit(order(1), t(1)).unwrap();
        settle(&mut gw).await;
        gw.shutdown(t(2), false);
        assert_eq!(gw.in_flight(), 0);
        assert_eq!(gw.open_orders().len(), 1);

        gw.shutdown(t(2), true);
        let updates = settle(&mut gw).await;
        assert!(matches!(updates[0].kind, UpdateKind::Cancelled { .. }));
        assert!(gw.open_orders().is_empty());
    }
}
