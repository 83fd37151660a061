//! End-to-end scenarios through the event-driven backtest.

mod common;

use common::*;
use tandem_core::data::replay;
use tandem_core::data::SourceSpec;
use tandem_core::domain::{
    OrderRequest, OrderState, OrderUpdate, Side, Trade, UpdateKind,
};
use tandem_core::execution::{ExecutionSimulator, FillPolicy};
use tandem_core::gateway::{GatewayError, SimulatedGateway, VenueGateway};
use tandem_core::runtime::{Strategy, StrategyContext, StrategyError, Subscription};
use tandem_core::domain::{Event, MarketData, Order, OrderId, ResolutionKind, StrategyId};

#[test]
fn market_buy_fills_at_the_price_prevailing_at_submission() {
    let strategy = Scripted::new(vec![(2, OrderRequest::market(venue(), SYMBOL, Side::Buy, 1.0))]);
    let report = backtest(
        strategy,
        vec![source("x", ticks(&[(1, 100.0), (2, 101.0), (3, 99.0)]))],
    );

    assert_eq!(report.fills.len(), 1);
    let fill = &report.fills[0];
    assert_eq!(fill.price, 101.0);
    assert_eq!(fill.timestamp, t(2));
    assert_eq!(fill.market_timestamp, t(2));
    assert_eq!(report.orders[0].state, OrderState::Filled);
}

#[test]
fn resting_limit_buy_fills_once_price_crosses() {
    let strategy = Scripted::new(vec![(
        1,
        OrderRequest::limit(venue(), SYMBOL, Side::Buy, 1.0, 100.0),
    )]);
    let report = backtest(strategy, vec![source("x", ticks(&[(1, 105.0), (2, 99.0)]))]);

    assert_eq!(report.fills.len(), 1);
    let fill = &report.fills[0];
    assert_eq!(fill.timestamp, t(2));
    assert!(fill.price <= 100.0, "fill price {}", fill.price);
    assert_eq!(fill.price, 99.0);
}

#[test]
fn unfilled_limit_is_cancelled_at_termination() {
    let strategy = Scripted::new(vec![(
        1,
        OrderRequest::limit(venue(), SYMBOL, Side::Buy, 1.0, 90.0),
    )]);
    let report = backtest(strategy, vec![source("x", ticks(&[(1, 105.0), (2, 99.0)]))]);

    assert!(report.fills.is_empty());
    assert_eq!(report.orders[0].state, OrderState::Cancelled);
    assert!(report
        .audit_trail
        .iter()
        .any(|e| e.to == OrderState::Cancelled && e.reason == "run terminated"));
}

#[test]
fn two_sources_interleave_by_timestamp() {
    let a = ticks(&[(1, 1.0), (3, 3.0), (5, 5.0)]);
    let b = ticks(&[(2, 2.0), (4, 4.0), (6, 6.0)]);

    let merged = replay(&[SourceSpec::new(source("a", a.clone())), SourceSpec::new(source("b", b.clone()))])
        .unwrap();
    let order: Vec<i64> = merged.events.map(|e| e.timestamp().timestamp()).collect();
    assert_eq!(order, vec![1, 2, 3, 4, 5, 6]);

    let strategy = Scripted::new(Vec::new());
    let log = strategy.log.clone();
    backtest(strategy, vec![source("a", a), source("b", b)]);
    let seen: Vec<String> = log.lines().into_iter().filter(|l| l.starts_with("tick")).collect();
    assert_eq!(
        seen,
        vec!["tick 1 1", "tick 2 2", "tick 3 3", "tick 4 4", "tick 5 5", "tick 6 6"]
    );
}

/// Buys once, then tries to cancel the order after it has filled.
struct CancelAfterFill {
    outcome: Log,
}

impl Strategy for CancelAfterFill {
    fn name(&self) -> &str {
        "cancel-after-fill"
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::new(VENUE, SYMBOL, ResolutionKind::Tick)]
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext, _trade: &Trade) -> Result<(), StrategyError> {
        if ctx.orders().next().is_none() {
            ctx.submit(OrderRequest::market(venue(), SYMBOL, Side::Buy, 1.0));
        }
        Ok(())
    }

    fn on_order_update(
        &mut self,
        ctx: &mut StrategyContext,
        update: &OrderUpdate,
    ) -> Result<(), StrategyError> {
        if update.order.state == OrderState::Filled {
            match ctx.cancel(update.order.id) {
                Err(GatewayError::InvalidOrderState { state, .. }) => {
                    self.outcome.push(format!("refused {state}"))
                }
                other => self.outcome.push(format!("unexpected {other:?}")),
            }
        }
        if let UpdateKind::CancelRejected { .. } | UpdateKind::Cancelled { .. } = update.kind {
            self.outcome.push("cancel reached the gateway");
        }
        Ok(())
    }
}

#[test]
fn cancelling_a_filled_order_fails_without_side_effects() {
    let outcome = Log::default();
    let report = backtest(
        CancelAfterFill {
            outcome: outcome.clone(),
        },
        vec![source("x", ticks(&[(1, 100.0), (2, 101.0)]))],
    );

    assert_eq!(outcome.lines(), vec!["refused Filled"]);
    assert_eq!(report.orders.len(), 1);
    assert_eq!(report.orders[0].state, OrderState::Filled);
    assert_eq!(report.fills.len(), 1);
}

#[test]
fn gateway_refuses_cancel_of_filled_and_unknown_orders() {
    let mut gw = SimulatedGateway::new(venue(), ExecutionSimulator::from_policy(FillPolicy::default()));
    gw.on_market(&Event::market(
        t(1),
        venue(),
        SYMBOL,
        MarketData::Tick(Trade { price: 100.0, size: 5.0 }),
    ));
    let order = Order::new(
        OrderId(1),
        StrategyId::new("s"),
        OrderRequest::market(venue(), SYMBOL, Side::Buy, 1.0),
        t(1),
    );
    gw.submit(order, t(1)).unwrap();
    let updates = gw.poll_updates();
    assert!(updates.iter().any(|u| u.fill().is_some()));

    let audit_before = gw.audit_trail().len();
    assert!(matches!(
        gw.cancel(OrderId(1), t(2)),
        Err(GatewayError::InvalidOrderState { .. })
    ));
    assert!(matches!(
        gw.cancel(OrderId(99), t(2)),
        Err(GatewayError::OrderNotFound(_))
    ));
    assert!(gw.poll_updates().is_empty());
    assert_eq!(gw.audit_trail().len(), audit_before);
    assert_eq!(gw.order(OrderId(1)).unwrap().state, OrderState::Filled);
}

#[test]
fn timer_due_with_data_fires_before_that_data() {
    struct Timed {
        log: Log,
    }

    impl Strategy for Timed {
        fn name(&self) -> &str {
            "timed"
        }

        fn subscriptions(&self) -> Vec<Subscription> {
            vec![Subscription::new(VENUE, SYMBOL, ResolutionKind::Tick)]
        }

        fn on_start(&mut self, ctx: &mut StrategyContext) -> Result<(), StrategyError> {
            ctx.schedule_timer("at-two", t(2));
            Ok(())
        }

        fn on_tick(&mut self, ctx: &mut StrategyContext, _trade: &Trade) -> Result<(), StrategyError> {
            self.log.push(format!("tick {}", ctx.now().timestamp()));
            Ok(())
        }

        fn on_timer(
            &mut self,
            ctx: &mut StrategyContext,
            timer: &tandem_core::domain::TimerFired,
        ) -> Result<(), StrategyError> {
            self.log
                .push(format!("timer {} {}", timer.name, ctx.now().timestamp()));
            Ok(())
        }
    }

    let log = Log::default();
    backtest(
        Timed { log: log.clone() },
        vec![source("x", ticks(&[(1, 100.0), (2, 101.0), (3, 102.0)]))],
    );
    assert_eq!(log.lines(), vec!["tick 1", "timer at-two 2", "tick 2", "tick 3"]);
}

#[test]
fn malformed_and_out_of_order_records_are_dropped_and_counted() {
    let mut records = ticks(&[(1, 100.0), (3, 101.0), (2, 99.0), (4, 102.0)]);
    records[3].price = None;
    let strategy = Scripted::new(Vec::new());
    let log = strategy.log.clone();
    let report = backtest(strategy, vec![source("x", records)]);

    assert_eq!(log.lines(), vec!["tick 1 100", "tick 3 101"]);
    assert_eq!(report.drops.out_of_order, 1);
    assert_eq!(report.drops.malformed, 1);
}
