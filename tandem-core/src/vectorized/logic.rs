//! Signal logic: the unit of strategy code shared by every mode.
//!
//! Handler strategies cannot be evaluated over whole arrays, so vectorized
//! backtesting works on `SignalLogic` instead: a function from bar history
//! to a target-position signal. The event-driven modes run the same logic
//! through `SignalStrategy`, and both turn signals into orders with the same
//! `target_order`.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::domain::{
    Bar, OrderRequest, ResolutionKind, Side, Symbol, Timestamp, VenueId, QTY_EPSILON,
};
use crate::runtime::{Strategy, StrategyContext, StrategyError, Subscription};

/// Target-position signal: `+1.0` fully long, `-1.0` fully short, `0.0` flat.
///
/// # Architecture invariant
/// `signal(bars)` may only look at `bars`, which ends at the bar being
/// decided on. `signals(bars)[i]` must equal `signal(&bars[..=i])`; a batch
/// override that peeks ahead breaks vectorized/event-driven parity.
pub trait SignalLogic: Send + Sync {
    /// Signal for the last bar of `bars`; `None` keeps the current target.
    fn signal(&self, bars: &[Bar]) -> Option<f64>;

    /// Signal series over a whole aligned array (default: every prefix).
    fn signals(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        (1..=bars.len()).map(|n| self.signal(&bars[..n])).collect()
    }
}

/// Which side of the signal the strategy is allowed to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    #[default]
    LongOnly,
    ShortOnly,
    LongShort,
}

impl TargetMode {
    pub fn clamp(self, signal: f64) -> f64 {
        match self {
            Self::LongOnly => signal.max(0.0),
            Self::ShortOnly => signal.min(0.0),
            Self::LongShort => signal,
        }
    }
}

/// Order that moves `exposure` to the signal's target, or `None` when already there.
///
/// `exposure` is the filled position plus the signed remainder of working orders.
pub fn target_order(
    venue: &VenueId,
    symbol: &str,
    signal: f64,
    exposure: f64,
    mode: TargetMode,
    unit_quantity: f64,
) -> Option<OrderRequest> {
    if !signal.is_finite() {
        return None;
    }
    let target = mode.clamp(signal) * unit_quantity;
    let delta = target - exposure;
    if delta.abs() <= QTY_EPSILON {
        return None;
    }
    let side = if delta > 0.0 { Side::Buy } else { Side::Sell };
    Some(OrderRequest::market(venue.clone(), symbol, side, delta.abs()))
}

/// One evaluated signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalPoint {
    pub timestamp: Timestamp,
    pub signal: Option<f64>,
}

/// Shared record of the signals an adapter produced; clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct SignalJournal {
    points: Arc<Mutex<Vec<SignalPoint>>>,
}

impl SignalJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, point: SignalPoint) {
        if let Ok(mut points) = self.points.lock() {
            points.push(point);
        }
    }

    pub fn points(&self) -> Vec<SignalPoint> {
        self.points.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

/// Event-driven adapter: runs `SignalLogic` on each bar of one stream.
pub struct SignalStrategy {
    name: String,
    venue: VenueId,
    symbol: Symbol,
    logic: Arc<dyn SignalLogic>,
    mode: TargetMode,
    unit_quantity: f64,
    bars: Vec<Bar>,
    journal: SignalJournal,
}

impl SignalStrategy {
    pub fn new(
        name: impl Into<String>,
        venue: VenueId,
        symbol: impl Into<Symbol>,
        logic: Arc<dyn SignalLogic>,
        mode: TargetMode,
        unit_quantity: f64,
    ) -> Self {
        Self {
            name: name.into(),
            venue,
            symbol: symbol.into(),
            logic,
            mode,
            unit_quantity,
            bars: Vec::new(),
            journal: SignalJournal::new(),
        }
    }

    pub fn journal(&self) -> SignalJournal {
        self.journal.clone()
    }

    pub fn with_journal(mut self, journal: SignalJournal) -> Self {
        self.journal = journal;
        self
    }
}

impl Strategy for SignalStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::new(
            self.venue.clone(),
            self.symbol.clone(),
            ResolutionKind::Bar,
        )]
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext, bar: &Bar) -> Result<(), StrategyError> {
        self.bars.push(*bar);
        let signal = self.logic.signal(&self.bars);
        self.journal.push(SignalPoint {
            timestamp: ctx.now(),
            signal,
        });

        let Some(signal) = signal else {
            return Ok(());
        };
        let working: f64 = ctx
            .open_orders()
            .filter(|o| o.venue == self.venue && o.symbol == self.symbol)
            .map(|o| o.signed_remaining())
            .sum();
        let exposure = ctx.position(&self.venue, &self.symbol).quantity + working;
        if let Some(request) = target_order(
            &self.venue,
            &self.symbol,
            signal,
            exposure,
            self.mode,
            self.unit_quantity,
        ) {
            ctx.submit(request);
        }
        Ok(())
    }
}
