//! Execution simulator: deterministic fill policy for backtest and paper modes.
//!
//! Policy, applied per (order, market event):
//! - Market orders take the best opposing price (book ask/bid, tick price,
//!   bar close) plus directional slippage, up to the available liquidity.
//! - Limit orders fill once the prevailing price crosses the limit, at the
//!   better of the prevailing price and the limit, with no slippage.
//! - At most one fill per order per event; liquidity used by one order is not
//!   available to the next order on the same event.
//! - No look-ahead: a quote newer than the `as_of` time is never used.
//! - No quote for the symbol: no fill, the order keeps working.

use serde::{Deserialize, Serialize};

use super::market_state::crossing_price;
use super::{CostModel, LiquidityPolicy, MarketState};
use crate::domain::{Event, Fill, Order, OrderType, Timestamp, QTY_EPSILON};

/// Simulated-fill parameters from the run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FillPolicy {
    pub liquidity: LiquidityPolicy,
    /// Default costs; a venue's own fee schedule overrides these.
    pub cost: CostModel,
}

#[derive(Debug, Clone)]
pub struct ExecutionSimulator {
    liquidity: LiquidityPolicy,
    cost: CostModel,
    market: MarketState,
}

impl ExecutionSimulator {
    pub fn new(liquidity: LiquidityPolicy, cost: CostModel) -> Self {
        Self {
            liquidity,
            cost,
            market: MarketState::new(),
        }
    }

    pub fn from_policy(policy: FillPolicy) -> Self {
        Self::new(policy.liquidity, policy.cost)
    }

    /// Feed a market event into the simulator's view of the market.
    pub fn on_market(&mut self, event: &Event) -> bool {
        self.market.update(event)
    }

    pub fn market(&self) -> &MarketState {
        &self.market
    }

    /// Match `order` against the latest quote for its symbol, using nothing newer than `as_of`.
    ///
    /// Gateways call this with the order's `created_at` on submission, and with
    /// the event timestamp for working orders when a new event arrives.
    pub fn match_order(&mut self, order: &Order, as_of: Timestamp) -> Option<Fill> {
        let remaining = order.remaining();
        if remaining <= QTY_EPSILON {
            return None;
        }
        let quote = self.market.get_mut(&order.venue, &order.symbol)?;
        if quote.timestamp > as_of {
            return None;
        }

        let raw_price = match order.order_type {
            OrderType::Market => quote.data.executable_price(order.side)?,
            OrderType::Limit { limit_price } => {
                crossing_price(&quote.data, order.side, limit_price)?
            }
        };

        let available = self
            .liquidity
            .available(&quote.data, order.side)
            .map(|a| (a - quote.consumed).max(0.0));
        let (quantity, _remainder) = self.liquidity.constrain(remaining, available);
        if quantity <= QTY_EPSILON {
            return None;
        }
        quote.consumed += quantity;

        let price = match order.order_type {
            OrderType::Market => self.cost.aggressive_price(raw_price, order.side),
            OrderType::Limit { .. } => raw_price,
        };

        Some(Fill {
            order_id: order.id,
            strategy: order.strategy.clone(),
            venue: order.venue.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            price,
            quantity,
            commission: self.cost.commission(price, quantity),
            timestamp: as_of,
            market_timestamp: quote.timestamp,
        })
    }
}
