//! Latest market data per (venue, symbol), as the simulator is allowed to see it.

use std::collections::BTreeMap;

use crate::domain::{Event, MarketData, Side, Symbol, Timestamp, VenueId};

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub timestamp: Timestamp,
    pub data: MarketData,
    /// Quantity already filled against this quote.
    pub consumed: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MarketState {
    quotes: BTreeMap<(VenueId, Symbol), Quote>,
}

impl MarketState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a market event. Returns false for non-market events.
    pub fn update(&mut self, event: &Event) -> bool {
        let Some(data) = event.market_data() else {
            return false;
        };
        self.quotes.insert(
            (event.venue().clone(), event.symbol().to_string()),
            Quote {
                timestamp: event.timestamp(),
                data: data.clone(),
                consumed: 0.0,
            },
        );
        true
    }

    pub fn get(&self, venue: &VenueId, symbol: &str) -> Option<&Quote> {
        self.quotes.get(&(venue.clone(), symbol.to_string()))
    }

    pub(crate) fn get_mut(&mut self, venue: &VenueId, symbol: &str) -> Option<&mut Quote> {
        self.quotes.get_mut(&(venue.clone(), symbol.to_string()))
    }
}

/// Fill price for a limit order if the prevailing market crosses `limit`.
///
/// The fill is at the better of the prevailing price and the limit:
/// - tick: trade price ≤ limit (buy) / ≥ limit (sell)
/// - book: best ask ≤ limit (buy) / best bid ≥ limit (sell)
/// - bar: low ≤ limit (buy) / high ≥ limit (sell); close or limit, whichever is better
pub fn crossing_price(data: &MarketData, side: Side, limit: f64) -> Option<f64> {
    match (data, side) {
        (MarketData::Tick(trade), Side::Buy) => (trade.price <= limit).then_some(trade.price),
        (MarketData::Tick(trade), Side::Sell) => (trade.price >= limit).then_some(trade.price),
        (MarketData::Book(book), Side::Buy) => book
            .best_ask()
            .filter(|l| l.price <= limit)
            .map(|l| l.price),
        (MarketData::Book(book), Side::Sell) => book
            .best_bid()
            .filter(|l| l.price >= limit)
            .map(|l| l.price),
        (MarketData::Bar(bar), Side::Buy) => (bar.low <= limit).then_some(bar.close.min(limit)),
        (MarketData::Bar(bar), Side::Sell) => (bar.high >= limit).then_some(bar.close.max(limit)),
    }
}
