//! Live and paper modes: parity with the backtest, timeouts, stop handling.

mod common;

use async_trait::async_trait;
use common::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use tandem_core::config::RunConfig;
use tandem_core::data::{ChannelFeed, HistoricalSource, RawRecord, ReplayFeed, VecSource};
use tandem_core::domain::{
    Order, OrderRequest, OrderState, RejectReason, ResolutionKind, Side, TimerFired, Trade,
};
use tandem_core::engine::{RunReport, SchedulerPhase, StopHandle, SubmissionRecord};
use tandem_core::gateway::{ConnectorError, ExecutionReport, VenueConnector};
use tandem_core::mode::{EngineBuilder, Mode};
use tandem_core::runtime::{Strategy, StrategyContext, StrategyError, Subscription};

/// Accepts everything after `delay`; never fills.
#[derive(Default)]
struct MockVenue {
    delay: Duration,
    placed: Mutex<Vec<String>>,
}

#[async_trait]
impl VenueConnector for MockVenue {
    async fn submit(&self, order: &Order) -> Result<(), ConnectorError> {
        tokio::time::sleep(self.delay).await;
        self.placed.lock().unwrap().push(order.client_order_id());
        Ok(())
    }

    async fn cancel(&self, _order: &Order) -> Result<(), ConnectorError> {
        Ok(())
    }

    fn subscribe(&self, _reports: mpsc::UnboundedSender<ExecutionReport>) {}
}

/// Sets one timer on the first tick and logs when it fires.
struct Alarm {
    delay: chrono::Duration,
    armed: bool,
    log: Log,
}

impl Alarm {
    fn new(delay: chrono::Duration) -> Self {
        Self {
            delay,
            armed: false,
            log: Log::default(),
        }
    }
}

impl Strategy for Alarm {
    fn name(&self) -> &str {
        "alarm"
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::new(VENUE, SYMBOL, ResolutionKind::Tick)]
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext, trade: &Trade) -> Result<(), StrategyError> {
        self.log.push(format!("tick {}", trade.price));
        if !self.armed {
            self.armed = true;
            ctx.schedule_after("wake", self.delay);
        }
        Ok(())
    }

    fn on_timer(&mut self, _ctx: &mut StrategyContext, timer: &TimerFired) -> Result<(), StrategyError> {
        self.log.push(format!("timer {}", timer.name));
        Ok(())
    }
}

fn feed(records: Vec<RawRecord>) -> ReplayFeed {
    ReplayFeed::new("scripted", VecSource::new("scripted", records).open().unwrap())
}

fn live_config(gateway_timeout_ms: u64) -> RunConfig {
    let mut cfg = config(Mode::Live, ResolutionKind::Tick);
    cfg.venues[0].credentials = Some("SIM_API_KEY".into());
    cfg.scheduler.gateway_timeout_ms = gateway_timeout_ms;
    cfg.scheduler.poll_interval_ms = 5;
    cfg
}

async fn run_live(
    cfg: RunConfig,
    strategy: impl Strategy + 'static,
    records: Vec<RawRecord>,
    connector: Arc<MockVenue>,
) -> RunReport {
    let engine = EngineBuilder::new(cfg)
        .strategy(strategy)
        .feed(feed(records))
        .connector(VENUE, connector)
        .build()
        .unwrap();
    engine.run().await.events_report().unwrap().clone()
}

fn decisions(submissions: &[SubmissionRecord]) -> Vec<(String, Side, f64, i64)> {
    submissions
        .iter()
        .map(|s| (s.order_id.to_string(), s.side, s.quantity, s.created_at.timestamp()))
        .collect()
}

#[tokio::test]
async fn live_mode_submits_what_the_backtest_submits() {
    let records = random_walk(60, 5);
    let backtest_report = backtest(Follower::new(), vec![source("walk", records.clone())]);

    let venue_side = Arc::new(MockVenue::default());
    let live_report = run_live(live_config(1_000), Follower::new(), records, Arc::clone(&venue_side)).await;

    assert!(!backtest_report.submissions.is_empty());
    assert_eq!(
        decisions(&backtest_report.submissions),
        decisions(&live_report.submissions)
    );
    assert_eq!(
        venue_side.placed.lock().unwrap().len(),
        live_report.submissions.len()
    );
    assert_eq!(live_report.phase, SchedulerPhase::Terminated);
}

#[tokio::test]
async fn paper_mode_matches_backtest_fills() {
    let records = random_walk(80, 9);
    let backtest_report = backtest(Follower::new(), vec![source("walk", records.clone())]);

    let engine = EngineBuilder::new(config(Mode::Paper, ResolutionKind::Tick))
        .strategy(Follower::new())
        .feed(feed(records))
        .build()
        .unwrap();
    let outcome = engine.run().await;
    let paper = outcome.events_report().unwrap();

    assert_eq!(
        decisions(&backtest_report.submissions),
        decisions(&paper.submissions)
    );
    assert_eq!(backtest_report.fills, paper.fills);
}

#[tokio::test]
async fn gateway_timeout_rejects_without_hanging() {
    let strategy = Scripted::new(vec![(2, OrderRequest::market(venue(), SYMBOL, Side::Buy, 1.0))]);
    let log = strategy.log.clone();
    let slow = Arc::new(MockVenue {
        delay: Duration::from_secs(30),
        ..MockVenue::default()
    });

    let (tx, channel) = ChannelFeed::new("venue-feed", 16);
    let engine = EngineBuilder::new(live_config(50))
        .strategy(strategy)
        .feed(channel)
        .connector(VENUE, slow)
        .build()
        .unwrap();

    tokio::spawn(async move {
        for record in ticks(&[(1, 100.0), (2, 101.0), (3, 102.0)]) {
            tx.send(record).await.unwrap();
        }
        // Stay connected past the gateway timeout, then end the feed.
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(tx);
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), engine.run())
        .await
        .expect("run finished");
    let report = outcome.events_report().unwrap();

    assert_eq!(report.orders.len(), 1);
    let order = &report.orders[0];
    assert_eq!(order.state, OrderState::Rejected);
    assert_eq!(order.reject_reason, Some(RejectReason::GatewayTimeout));
    assert!(report.fills.is_empty());
    assert!(log.lines().iter().any(|l| l == "update ord-1 Rejected"));
}

#[tokio::test]
async fn stop_handle_ends_an_open_ended_feed() {
    let (tx, channel) = ChannelFeed::new("venue-feed", 16);
    let stop = StopHandle::new();
    let engine = EngineBuilder::new(config(Mode::Paper, ResolutionKind::Tick))
        .strategy(Follower::new())
        .feed(channel)
        .stop_handle(stop.clone())
        .build()
        .unwrap();

    tokio::spawn(async move {
        for record in ticks(&[(1, 100.0), (2, 101.0)]) {
            tx.send(record).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();
        // Keep the sender alive so only the stop can end the run.
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(tx);
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), engine.run())
        .await
        .expect("stopped in time");
    let report = outcome.events_report().unwrap();
    assert_eq!(report.phase, SchedulerPhase::Terminated);
    assert_eq!(report.fills.len(), 1);
}

#[tokio::test]
async fn late_events_from_a_lagging_feed_are_dropped() {
    let strategy = Scripted::new(Vec::new());
    let log = strategy.log.clone();
    let (fast_tx, fast) = ChannelFeed::new("fast", 16);
    let (slow_tx, slow) = ChannelFeed::new("slow", 16);
    let engine = EngineBuilder::new(config(Mode::Paper, ResolutionKind::Tick))
        .strategy(strategy)
        .feed(fast)
        .feed(slow)
        .build()
        .unwrap();

    tokio::spawn(async move {
        fast_tx.send(tick(5, 5.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        slow_tx.send(tick(3, 3.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        fast_tx.send(tick(6, 6.0)).await.unwrap();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), engine.run())
        .await
        .expect("feeds ended");
    let report = outcome.events_report().unwrap();

    assert_eq!(log.lines(), vec!["tick 5 5", "tick 6 6"]);
    assert_eq!(report.drops.out_of_order, 1);
    assert_eq!(report.stats.market_events, 2);
}

#[tokio::test]
async fn timers_fire_while_the_feed_is_quiet() {
    let strategy = Alarm::new(chrono::Duration::milliseconds(200));
    let log = strategy.log.clone();
    let (tx, channel) = ChannelFeed::new("quiet", 16);
    let stop = StopHandle::new();
    let mut cfg = config(Mode::Paper, ResolutionKind::Tick);
    cfg.scheduler.poll_interval_ms = 5;
    let engine = EngineBuilder::new(cfg)
        .strategy(strategy)
        .feed(channel)
        .stop_handle(stop.clone())
        .build()
        .unwrap();

    let observer = {
        let log = log.clone();
        tokio::spawn(async move {
            tx.send(tick(1, 1.0)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(600)).await;
            let seen = log.lines();
            stop.stop();
            drop(tx);
            seen
        })
    };

    let outcome = tokio::time::timeout(Duration::from_secs(5), engine.run())
        .await
        .expect("stopped in time");
    let before_stop = observer.await.unwrap();

    assert_eq!(before_stop, vec!["tick 1", "timer wake"]);
    assert_eq!(outcome.events_report().unwrap().stats.timers_fired, 1);
}

#[tokio::test]
async fn pending_timers_fire_at_drain_like_the_backtest() {
    let delay = chrono::Duration::seconds(60);
    let backtest_alarm = Alarm::new(delay);
    let backtest_log = backtest_alarm.log.clone();
    backtest(backtest_alarm, vec![source("one", ticks(&[(1, 1.0)]))]);

    let strategy = Alarm::new(delay);
    let log = strategy.log.clone();
    let (tx, channel) = ChannelFeed::new("quiet", 16);
    let stop = StopHandle::new();
    let engine = EngineBuilder::new(config(Mode::Paper, ResolutionKind::Tick))
        .strategy(strategy)
        .feed(channel)
        .stop_handle(stop.clone())
        .build()
        .unwrap();

    tokio::spawn(async move {
        tx.send(tick(1, 1.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(tx);
    });

    tokio::time::timeout(Duration::from_secs(5), engine.run())
        .await
        .expect("stopped in time");

    assert_eq!(backtest_log.lines(), vec!["tick 1", "timer wake"]);
    assert_eq!(log.lines(), backtest_log.lines());
}
