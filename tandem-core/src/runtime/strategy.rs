//! The strategy authoring contract.
//!
//! # Architecture invariant
//! Handlers receive a `StrategyContext` and the event payload, nothing else.
//! A strategy that needs a gateway, a data source or the clock of the host
//! machine is breaking backtest/live symmetry: it would behave differently
//! depending on how it is run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::StrategyContext;
use crate::domain::{
    Bar, BookSnapshot, Event, EventPayload, OrderUpdate, ResolutionKind, Symbol, TimerFired, Trade,
    VenueId,
};
use crate::gateway::GatewayError;

/// A (venue, symbol, resolution) stream a strategy wants to see.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subscription {
    pub venue: VenueId,
    pub symbol: Symbol,
    pub resolution: ResolutionKind,
}

impl Subscription {
    pub fn new(venue: impl Into<VenueId>, symbol: impl Into<Symbol>, resolution: ResolutionKind) -> Self {
        Self {
            venue: venue.into(),
            symbol: symbol.into(),
            resolution,
        }
    }

    /// True for market events on this stream.
    pub fn matches(&self, event: &Event) -> bool {
        match event.payload() {
            EventPayload::Market(data) => {
                data.kind() == self.resolution
                    && event.venue() == &self.venue
                    && event.symbol() == self.symbol
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{0}")]
    Message(String),

    #[error("user state: {0}")]
    State(#[from] serde_json::Error),

    #[error(transparent)]
    Order(#[from] GatewayError),
}

impl StrategyError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// User strategy logic.
///
/// Exactly one handler runs per dispatched event: market events by
/// resolution (for subscribed streams), order updates for the owning
/// strategy, timers for the strategy that scheduled them. Every handler
/// defaults to doing nothing.
pub trait Strategy: Send {
    /// Unique within a run; becomes the `StrategyId`.
    fn name(&self) -> &str;

    fn subscriptions(&self) -> Vec<Subscription>;

    fn on_start(&mut self, _ctx: &mut StrategyContext) -> Result<(), StrategyError> {
        Ok(())
    }

    fn on_book(&mut self, _ctx: &mut StrategyContext, _book: &BookSnapshot) -> Result<(), StrategyError> {
        Ok(())
    }

    fn on_tick(&mut self, _ctx: &mut StrategyContext, _trade: &Trade) -> Result<(), StrategyError> {
        Ok(())
    }

    fn on_bar(&mut self, _ctx: &mut StrategyContext, _bar: &Bar) -> Result<(), StrategyError> {
        Ok(())
    }

    fn on_order_update(
        &mut self,
        _ctx: &mut StrategyContext,
        _update: &OrderUpdate,
    ) -> Result<(), StrategyError> {
        Ok(())
    }

    fn on_timer(&mut self, _ctx: &mut StrategyContext, _timer: &TimerFired) -> Result<(), StrategyError> {
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut StrategyContext) -> Result<(), StrategyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketData;
    use chrono::{TimeZone, Utc};

    #[test]
    fn subscription_matches_venue_symbol_and_resolution() {
        let sub = Subscription::new("sim", "X", ResolutionKind::Tick);
        let tick = Event::market(
            Utc.timestamp_opt(1, 0).unwrap(),
            VenueId::from("sim"),
            "X",
            MarketData::Tick(Trade { price: 1.0, size: 1.0 }),
        );
        assert!(sub.matches(&tick));
        assert!(!Subscription::new("sim", "Y", ResolutionKind::Tick).matches(&tick));
        assert!(!Subscription::new("sim", "X", ResolutionKind::Bar).matches(&tick));
        assert!(!Subscription::new("other", "X", ResolutionKind::Tick).matches(&tick));
    }
}
