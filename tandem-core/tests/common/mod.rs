//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};

use tandem_core::config::{RunConfig, VenueConfig};
use tandem_core::data::{HistoricalSource, RawRecord, VecSource};
use tandem_core::domain::{
    OrderRequest, OrderUpdate, ResolutionKind, Side, TimerFired, Timestamp, Trade, VenueId,
};
use tandem_core::engine::RunReport;
use tandem_core::mode::{EngineBuilder, Mode};
use tandem_core::runtime::{Strategy, StrategyContext, StrategyError, Subscription};

pub const VENUE: &str = "sim";
pub const SYMBOL: &str = "X";

pub fn t(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn tick(secs: i64, price: f64) -> RawRecord {
    RawRecord::tick(t(secs), VENUE, SYMBOL, price, 10.0)
}

pub fn ticks(prices: &[(i64, f64)]) -> Vec<RawRecord> {
    prices.iter().map(|&(s, p)| tick(s, p)).collect()
}

pub fn source(name: &str, records: Vec<RawRecord>) -> Arc<dyn HistoricalSource> {
    Arc::new(VecSource::new(name, records))
}

/// Deterministic pseudo-random walk (LCG), one tick per second.
pub fn random_walk(n: usize, seed: u64) -> Vec<RawRecord> {
    let mut state = seed;
    let mut price = 100.0_f64;
    (0..n)
        .map(|i| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let step = ((state >> 33) % 200) as f64 / 100.0 - 1.0;
            price = (price + step).max(1.0);
            tick(i as i64 + 1, (price * 100.0).round() / 100.0)
        })
        .collect()
}

pub fn config(mode: Mode, resolution: ResolutionKind) -> RunConfig {
    RunConfig::new("it", mode)
        .with_venue(VenueConfig::new(VENUE))
        .with_subscription(Subscription::new(VENUE, SYMBOL, resolution))
}

/// Event-driven backtest of one strategy over the given sources.
pub fn backtest(strategy: impl Strategy + 'static, sources: Vec<Arc<dyn HistoricalSource>>) -> RunReport {
    let mut builder = EngineBuilder::new(config(Mode::EventDrivenBacktest, ResolutionKind::Tick))
        .strategy(strategy);
    for s in sources {
        builder = builder.source(s);
    }
    let outcome = builder.build().unwrap().run_blocking().unwrap();
    outcome.events_report().unwrap().clone()
}

pub fn venue() -> VenueId {
    VenueId::from(VENUE)
}

/// Shared, cloneable event log for strategies under test.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, line: impl Into<String>) {
        self.0.lock().unwrap().push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Submits scripted requests on the tick at a given second.
pub struct Scripted {
    pub name: String,
    pub script: Vec<(i64, OrderRequest)>,
    pub log: Log,
}

impl Scripted {
    pub fn new(script: Vec<(i64, OrderRequest)>) -> Self {
        Self {
            name: "scripted".into(),
            script,
            log: Log::default(),
        }
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::new(VENUE, SYMBOL, ResolutionKind::Tick)]
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext, trade: &Trade) -> Result<(), StrategyError> {
        let now = ctx.now().timestamp();
        self.log.push(format!("tick {now} {}", trade.price));
        for (_, request) in self.script.iter().filter(|(at, _)| *at == now) {
            ctx.submit(request.clone());
        }
        Ok(())
    }

    fn on_order_update(
        &mut self,
        _ctx: &mut StrategyContext,
        update: &OrderUpdate,
    ) -> Result<(), StrategyError> {
        self.log
            .push(format!("update {} {}", update.order.id, update.order.state));
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut StrategyContext, timer: &TimerFired) -> Result<(), StrategyError> {
        self.log
            .push(format!("timer {} {}", ctx.now().timestamp(), timer.name));
        Ok(())
    }
}

/// Trades on price direction only: buy 1 on an up-tick, sell 1 on a down-tick.
pub struct Follower {
    last: Option<f64>,
}

impl Follower {
    pub fn new() -> Self {
        Self { last: None }
    }
}

impl Strategy for Follower {
    fn name(&self) -> &str {
        "follower"
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::new(VENUE, SYMBOL, ResolutionKind::Tick)]
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext, trade: &Trade) -> Result<(), StrategyError> {
        if let Some(last) = self.last.replace(trade.price) {
            let side = if trade.price > last {
                Side::Buy
            } else if trade.price < last {
                Side::Sell
            } else {
                return Ok(());
            };
            ctx.submit(OrderRequest::market(venue(), SYMBOL, side, 1.0));
        }
        Ok(())
    }
}
