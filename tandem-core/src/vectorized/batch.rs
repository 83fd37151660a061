//! Vectorized evaluation: signal logic over whole bar arrays, priced in batch.
//!
//! Signals for the whole array come from one `SignalLogic::signals` call.
//! Execution then walks the bars in order through the same simulated
//! gateway the event-driven modes use, so fills follow the same policy:
//! working orders are matched when a bar arrives, then that bar's signal
//! is turned into an order with `target_order` and priced at once.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{target_order, SignalLogic, SignalPoint, TargetMode};
use crate::data::DropStats;
use crate::domain::{
    Bar, Event, Fill, Ledger, MarketData, Order, OrderIdGen, Position, RunId, StrategyId, Symbol,
    VenueId,
};
use crate::engine::SubmissionRecord;
use crate::execution::{ExecutionSimulator, FillPolicy};
use crate::gateway::{SimulatedGateway, VenueGateway};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorizedParams {
    pub mode: TargetMode,
    pub unit_quantity: f64,
    pub policy: FillPolicy,
}

impl Default for VectorizedParams {
    fn default() -> Self {
        Self {
            mode: TargetMode::default(),
            unit_quantity: 1.0,
            policy: FillPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizedResult {
    pub strategy: StrategyId,
    pub venue: VenueId,
    pub symbol: Symbol,
    pub signals: Vec<SignalPoint>,
    pub submissions: Vec<SubmissionRecord>,
    pub orders: Vec<Order>,
    pub fills: Vec<Fill>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizedReport {
    pub run_id: RunId,
    pub results: Vec<VectorizedResult>,
    pub drops: DropStats,
}

impl VectorizedReport {
    pub fn result(&self, strategy: &StrategyId) -> Option<&VectorizedResult> {
        self.results.iter().find(|r| &r.strategy == strategy)
    }
}

/// Evaluate `logic` over `bars` (one venue/symbol, in time order).
pub fn run_vectorized(
    strategy: StrategyId,
    venue: VenueId,
    symbol: &str,
    bars: &[Bar],
    logic: &dyn SignalLogic,
    params: &VectorizedParams,
) -> VectorizedResult {
    let signals = logic.signals(bars);
    if signals.len() != bars.len() {
        warn!(
            %strategy,
            bars = bars.len(),
            signals = signals.len(),
            "signal series length differs from bar count; missing signals count as none"
        );
    }

    let ids = OrderIdGen::new();
    let mut gateway = SimulatedGateway::new(
        venue.clone(),
        ExecutionSimulator::from_policy(params.policy),
    );
    let mut ledger = Ledger::new();
    let mut submissions = Vec::new();
    let mut points = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let now = bar.end;
        gateway.on_market(&Event::market(now, venue.clone(), symbol, MarketData::Bar(*bar)));
        book_fills(&mut gateway, &mut ledger);

        let signal = signals.get(i).copied().flatten();
        points.push(SignalPoint {
            timestamp: now,
            signal,
        });
        let Some(signal) = signal else {
            continue;
        };

        let working: f64 = gateway
            .open_orders()
            .iter()
            .filter(|o| o.symbol == symbol)
            .map(|o| o.signed_remaining())
            .sum();
        let exposure = ledger.position(&venue, symbol).quantity + working;
        let Some(request) =
            target_order(&venue, symbol, signal, exposure, params.mode, params.unit_quantity)
        else {
            continue;
        };

        let order = Order::new(ids.next_id(), strategy.clone(), request, now);
        submissions.push(SubmissionRecord::from(&order));
        if let Err(e) = gateway.submit(order, now) {
            warn!(%strategy, error = %e, "vectorized submit refused");
        }
        book_fills(&mut gateway, &mut ledger);
    }

    if let Some(last) = bars.last() {
        gateway.shutdown(last.end, true);
        book_fills(&mut gateway, &mut ledger);
    }

    VectorizedResult {
        position: ledger.position(&venue, symbol),
        strategy,
        venue,
        symbol: symbol.to_string(),
        signals: points,
        submissions,
        orders: gateway.orders().into_iter().cloned().collect(),
        fills: ledger.fills().to_vec(),
    }
}

fn book_fills(gateway: &mut SimulatedGateway, ledger: &mut Ledger) {
    for update in gateway.poll_updates() {
        if let Some(fill) = update.fill() {
            ledger.append(fill.clone());
        }
    }
}
