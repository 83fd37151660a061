//! Per-instance state bag handed to every strategy handler.
//!
//! The context is the strategy's whole view of the world:
//! - the clock (timestamp of the event being handled)
//! - read-only snapshots of its own orders and its own fill ledger
//! - the last market data of each subscribed stream
//! - arbitrary keyed user state (serde values)
//! - outgoing intents (submit / cancel) and timer requests, collected by the
//!   runtime after the handler returns

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::Subscription;
use crate::domain::{
    Event, Fill, Ledger, MarketData, Order, OrderId, OrderIdGen, OrderRequest, OrderState,
    OrderUpdate, Position, StrategyId, Symbol, Timestamp, VenueId,
};
use crate::gateway::GatewayError;
use crate::runtime::StrategyError;

/// Something a handler asked the engine to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Submit(Order),
    Cancel { strategy: StrategyId, order_id: OrderId },
}

impl Intent {
    pub fn strategy(&self) -> &StrategyId {
        match self {
            Self::Submit(order) => &order.strategy,
            Self::Cancel { strategy, .. } => strategy,
        }
    }
}

/// A named timer the strategy wants fired at `at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRequest {
    pub strategy: StrategyId,
    pub name: String,
    pub at: Timestamp,
}

#[derive(Debug)]
pub struct StrategyContext {
    strategy: StrategyId,
    ids: OrderIdGen,
    subscriptions: Vec<Subscription>,
    now: Timestamp,
    current: Option<(VenueId, Symbol)>,
    orders: BTreeMap<OrderId, Order>,
    ledger: Ledger,
    last_market: HashMap<(VenueId, Symbol), (Timestamp, MarketData)>,
    state: BTreeMap<String, serde_json::Value>,
    intents: Vec<Intent>,
    timers: Vec<TimerRequest>,
}

impl StrategyContext {
    pub fn new(strategy: StrategyId, ids: OrderIdGen, subscriptions: Vec<Subscription>) -> Self {
        Self {
            strategy,
            ids,
            subscriptions,
            now: DateTime::<Utc>::MIN_UTC,
            current: None,
            orders: BTreeMap::new(),
            ledger: Ledger::new(),
            last_market: HashMap::new(),
            state: BTreeMap::new(),
            intents: Vec::new(),
            timers: Vec::new(),
        }
    }

    // ── Reading ────────────────────────────────────────────────────────

    pub fn strategy(&self) -> &StrategyId {
        &self.strategy
    }

    /// Timestamp of the event being handled.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn current_venue(&self) -> Option<&VenueId> {
        self.current.as_ref().map(|(v, _)| v)
    }

    pub fn current_symbol(&self) -> Option<&str> {
        self.current.as_ref().map(|(_, s)| s.as_str())
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn position(&self, venue: &VenueId, symbol: &str) -> Position {
        self.ledger.position(venue, symbol)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn fills(&self) -> &[Fill] {
        self.ledger.fills()
    }

    /// Latest known snapshot of one of this strategy's orders.
    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Orders not yet in a terminal state (including ones submitted this handler).
    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| !o.state.is_terminal())
    }

    pub fn last_market(&self, venue: &VenueId, symbol: &str) -> Option<&MarketData> {
        self.last_market
            .get(&(venue.clone(), symbol.to_string()))
            .map(|(_, data)| data)
    }

    pub fn last_price(&self, venue: &VenueId, symbol: &str) -> Option<f64> {
        self.last_market(venue, symbol).and_then(MarketData::mark_price)
    }

    // ── User state ─────────────────────────────────────────────────────

    pub fn set_state<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StrategyError> {
        self.state.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StrategyError> {
        match self.state.get(key) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    pub fn remove_state(&mut self, key: &str) -> Option<serde_json::Value> {
        self.state.remove(key)
    }

    // ── Intents ────────────────────────────────────────────────────────

    /// Build an order stamped with the current event time and queue it for submission.
    pub fn submit(&mut self, request: OrderRequest) -> OrderId {
        let id = self.ids.next_id();
        let order = Order::new(id, self.strategy.clone(), request, self.now);
        self.orders.insert(id, order.clone());
        self.intents.push(Intent::Submit(order));
        id
    }

    /// Queue a cancel. Unknown and terminal orders fail right here.
    pub fn cancel(&mut self, order_id: OrderId) -> Result<(), GatewayError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(GatewayError::OrderNotFound(order_id))?;
        if order.state.is_terminal() {
            return Err(GatewayError::InvalidOrderState {
                order_id,
                state: order.state,
            });
        }
        self.intents.push(Intent::Cancel {
            strategy: self.strategy.clone(),
            order_id,
        });
        Ok(())
    }

    /// Cancel every order still working; returns how many cancels were queued.
    pub fn cancel_all(&mut self) -> usize {
        let open: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.state != OrderState::Created && !o.state.is_terminal())
            .map(|o| o.id)
            .collect();
        open.into_iter().filter(|id| self.cancel(*id).is_ok()).count()
    }

    pub fn schedule_timer(&mut self, name: impl Into<String>, at: Timestamp) {
        self.timers.push(TimerRequest {
            strategy: self.strategy.clone(),
            name: name.into(),
            at,
        });
    }

    pub fn schedule_after(&mut self, name: impl Into<String>, delay: chrono::Duration) {
        let at = self.now + delay;
        self.schedule_timer(name, at);
    }

    // ── Runtime side ───────────────────────────────────────────────────

    pub(crate) fn set_clock(&mut self, event: &Event) {
        self.now = self.now.max(event.timestamp());
        self.current = Some((event.venue().clone(), event.symbol().to_string()));
    }

    pub(crate) fn set_time(&mut self, now: Timestamp) {
        self.now = self.now.max(now);
    }

    pub(crate) fn observe_market(&mut self, event: &Event) {
        if let Some(data) = event.market_data() {
            self.last_market.insert(
                (event.venue().clone(), event.symbol().to_string()),
                (event.timestamp(), data.clone()),
            );
        }
    }

    /// Refresh the order snapshot and book any fill into the ledger.
    pub(crate) fn apply_update(&mut self, update: &OrderUpdate) {
        if let Some(fill) = update.fill() {
            self.ledger.append(fill.clone());
        }
        self.orders.insert(update.order.id, update.order.clone());
    }

    pub(crate) fn take_intents(&mut self) -> Vec<Intent> {
        std::mem::take(&mut self.intents)
    }

    pub(crate) fn take_timers(&mut self) -> Vec<TimerRequest> {
        std::mem::take(&mut self.timers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, UpdateKind};
    use chrono::TimeZone;

    fn ctx() -> StrategyContext {
        StrategyContext::new(StrategyId::new("s"), OrderIdGen::new(), Vec::new())
    }

    #[test]
    fn submit_stamps_decision_time_and_queues_intent() {
        let mut ctx = ctx();
        ctx.set_time(Utc.timestamp_opt(7, 0).unwrap());
        let id = ctx.submit(OrderRequest::market(VenueId::from("sim"), "X", Side::Buy, 1.0));
        assert_eq!(ctx.order(id).unwrap().created_at, Utc.timestamp_opt(7, 0).unwrap());
        let intents = ctx.take_intents();
        assert_eq!(intents.len(), 1);
        assert!(matches!(&intents[0], Intent::Submit(o) if o.id == id));
        assert!(ctx.take_intents().is_empty());
    }

    #[test]
    fn cancel_unknown_or_terminal_fails_immediately() {
        let mut ctx = ctx();
        assert_eq!(
            ctx.cancel(OrderId(42)),
            Err(GatewayError::OrderNotFound(OrderId(42)))
        );

        let id = ctx.submit(OrderRequest::market(VenueId::from("sim"), "X", Side::Buy, 1.0));
        ctx.take_intents();
        let mut filled = ctx.order(id).unwrap().clone();
        filled.state = OrderState::Filled;
        ctx.apply_update(&OrderUpdate::new(filled, UpdateKind::Accepted));
        assert!(matches!(
            ctx.cancel(id),
            Err(GatewayError::InvalidOrderState { state: OrderState::Filled, .. })
        ));
        assert!(ctx.take_intents().is_empty());
    }

    #[test]
    fn keyed_state_round_trips_through_serde() {
        let mut ctx = ctx();
        ctx.set_state("count", &3u32).unwrap();
        assert_eq!(ctx.state::<u32>("count").unwrap(), Some(3));
        assert_eq!(ctx.state::<u32>("missing").unwrap(), None);
        assert!(ctx.state::<String>("count").is_err());
        assert!(ctx.remove_state("count").is_some());
    }

    #[test]
    fn clock_never_moves_backwards() {
        let mut ctx = ctx();
        ctx.set_time(Utc.timestamp_opt(10, 0).unwrap());
        ctx.set_time(Utc.timestamp_opt(5, 0).unwrap());
        assert_eq!(ctx.now(), Utc.timestamp_opt(10, 0).unwrap());
    }
}
