//! Liquidity constraints: how much of an order one market event can absorb.
//!
//! - Book: size at the best opposing level
//! - Bar: `volume × bar_participation`
//! - Tick: unlimited, unless `tick_size_caps_liquidity` caps it at the trade size
//!
//! The unfilled remainder always carries: the order stays working and is
//! matched again on the next event for its symbol.

use serde::{Deserialize, Serialize};

use crate::domain::{MarketData, Side};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityPolicy {
    /// Fraction of bar volume one bar can fill (0.0 to 1.0).
    pub bar_participation: f64,
    /// Cap tick fills at the printed trade size.
    pub tick_size_caps_liquidity: bool,
}

impl Default for LiquidityPolicy {
    fn default() -> Self {
        Self {
            bar_participation: 1.0,
            tick_size_caps_liquidity: false,
        }
    }
}

impl LiquidityPolicy {
    pub fn new(bar_participation: f64, tick_size_caps_liquidity: bool) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&bar_participation),
            "participation rate must be 0.0 to 1.0"
        );
        Self {
            bar_participation,
            tick_size_caps_liquidity,
        }
    }

    /// Quantity available to an order on `side`; `None` means unlimited.
    pub fn available(&self, data: &MarketData, side: Side) -> Option<f64> {
        match data {
            MarketData::Book(book) => {
                let level = match side {
                    Side::Buy => book.best_ask(),
                    Side::Sell => book.best_bid(),
                };
                Some(level.map_or(0.0, |l| l.size))
            }
            MarketData::Bar(bar) => Some(bar.volume * self.bar_participation),
            MarketData::Tick(trade) => self.tick_size_caps_liquidity.then_some(trade.size),
        }
    }

    /// Apply the constraint to a desired quantity.
    ///
    /// Returns `(fill_qty, remainder_qty)`.
    pub fn constrain(&self, desired_qty: f64, available: Option<f64>) -> (f64, f64) {
        match available {
            None => (desired_qty, 0.0),
            Some(max_qty) if desired_qty <= max_qty => (desired_qty, 0.0),
            Some(max_qty) => {
                let fill = max_qty.max(0.0);
                (fill, desired_qty - fill)
            }
        }
    }
}
