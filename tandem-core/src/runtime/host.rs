//! Strategy runtime: hosts instances, dispatches events, collects intents.
//!
//! Instance lifecycle:
//!
//! Initialized → Running ⇄ Paused
//!      ↘          ↘       ↙
//!               Stopped
//!
//! A handler error pauses the instance (or stops it when `fatal_on_error`).
//! Paused instances keep receiving order updates into their context so their
//! view of orders and positions stays true, but no handler runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use super::{Intent, StrategyContext, Strategy, StrategyError, Subscription, TimerRequest};
use crate::domain::{Event, EventPayload, MarketData, OrderIdGen, StrategyId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyState {
    Initialized,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for StrategyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Soft per-handler deadline; overruns are logged and counted.
    pub handler_deadline_ms: u64,
    /// Stop (instead of pause) an instance whose handler fails.
    pub fatal_on_error: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            handler_deadline_ms: 50,
            fatal_on_error: false,
        }
    }
}

impl RuntimeConfig {
    pub fn handler_deadline(&self) -> Duration {
        Duration::from_millis(self.handler_deadline_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("strategy {0} is already registered")]
    DuplicateStrategy(StrategyId),

    #[error("unknown strategy {0}")]
    UnknownStrategy(StrategyId),

    #[error("cannot {action} strategy {strategy} from state {from}")]
    InvalidTransition {
        strategy: StrategyId,
        from: StrategyState,
        action: &'static str,
    },
}

/// Per-instance counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStats {
    pub handled: u64,
    pub errors: u64,
    pub deadline_overruns: u64,
    pub last_error: Option<String>,
}

struct Instance {
    id: StrategyId,
    strategy: Box<dyn Strategy>,
    subscriptions: Vec<Subscription>,
    state: StrategyState,
    /// Destroyed when the instance stops.
    ctx: Option<StrategyContext>,
    stats: InstanceStats,
}

impl Instance {
    fn subscribed(&self, event: &Event) -> bool {
        self.subscriptions.iter().any(|s| s.matches(event))
    }

    /// Run one handler with deadline accounting and the error policy.
    fn invoke<F>(&mut self, config: &RuntimeConfig, handler: &'static str, f: F)
    where
        F: FnOnce(&mut dyn Strategy, &mut StrategyContext) -> Result<(), StrategyError>,
    {
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };
        let started = Instant::now();
        let result = f(self.strategy.as_mut(), ctx);
        let elapsed = started.elapsed();

        self.stats.handled += 1;
        if elapsed > config.handler_deadline() {
            self.stats.deadline_overruns += 1;
            warn!(
                strategy = %self.id,
                handler,
                elapsed_ms = elapsed.as_millis() as u64,
                deadline_ms = config.handler_deadline_ms,
                "handler exceeded soft deadline"
            );
        }

        if let Err(e) = result {
            self.stats.errors += 1;
            self.stats.last_error = Some(e.to_string());
            let next = if config.fatal_on_error {
                StrategyState::Stopped
            } else {
                StrategyState::Paused
            };
            warn!(strategy = %self.id, handler, error = %e, state = %next, "handler failed");
            self.state = next;
        }
    }
}

pub struct StrategyRuntime {
    config: RuntimeConfig,
    ids: OrderIdGen,
    /// Registration order is dispatch order.
    instances: Vec<Instance>,
    /// Intents left by instances that stopped, still to be forwarded.
    orphaned: Vec<Intent>,
}

impl StrategyRuntime {
    pub fn new(config: RuntimeConfig, ids: OrderIdGen) -> Self {
        Self {
            config,
            ids,
            instances: Vec::new(),
            orphaned: Vec::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn add(&mut self, strategy: Box<dyn Strategy>) -> Result<StrategyId, RuntimeError> {
        let id = StrategyId::new(strategy.name());
        if self.instances.iter().any(|i| i.id == id) {
            return Err(RuntimeError::DuplicateStrategy(id));
        }
        let subscriptions = strategy.subscriptions();
        let ctx = StrategyContext::new(id.clone(), self.ids.clone(), subscriptions.clone());
        self.instances.push(Instance {
            id: id.clone(),
            strategy,
            subscriptions,
            state: StrategyState::Initialized,
            ctx: Some(ctx),
            stats: InstanceStats::default(),
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn strategy_ids(&self) -> Vec<StrategyId> {
        self.instances.iter().map(|i| i.id.clone()).collect()
    }

    /// Union of all instances' subscriptions, sorted and deduplicated.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut all: Vec<Subscription> = self
            .instances
            .iter()
            .flat_map(|i| i.subscriptions.iter().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }

    pub fn state(&self, id: &StrategyId) -> Option<StrategyState> {
        self.find(id).map(|i| i.state)
    }

    pub fn context(&self, id: &StrategyId) -> Option<&StrategyContext> {
        self.find(id).and_then(|i| i.ctx.as_ref())
    }

    pub fn stats(&self, id: &StrategyId) -> Option<&InstanceStats> {
        self.find(id).map(|i| &i.stats)
    }

    pub fn all_stats(&self) -> Vec<(StrategyId, InstanceStats)> {
        self.instances
            .iter()
            .map(|i| (i.id.clone(), i.stats.clone()))
            .collect()
    }

    fn find(&self, id: &StrategyId) -> Option<&Instance> {
        self.instances.iter().find(|i| &i.id == id)
    }

    fn find_mut(&mut self, id: &StrategyId) -> Result<&mut Instance, RuntimeError> {
        self.instances
            .iter_mut()
            .find(|i| &i.id == id)
            .ok_or_else(|| RuntimeError::UnknownStrategy(id.clone()))
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Initialized → Running, then `on_start`.
    pub fn start(&mut self, id: &StrategyId, now: Timestamp) -> Result<(), RuntimeError> {
        let config = self.config;
        let instance = self.find_mut(id)?;
        if instance.state != StrategyState::Initialized {
            return Err(RuntimeError::InvalidTransition {
                strategy: id.clone(),
                from: instance.state,
                action: "start",
            });
        }
        instance.state = StrategyState::Running;
        if let Some(ctx) = instance.ctx.as_mut() {
            ctx.set_time(now);
        }
        info!(strategy = %id, "strategy started");
        instance.invoke(&config, "on_start", |s, ctx| s.on_start(ctx));
        self.reap();
        Ok(())
    }

    pub fn start_all(&mut self, now: Timestamp) {
        for id in self.strategy_ids() {
            if self.state(&id) == Some(StrategyState::Initialized) {
                let _ = self.start(&id, now);
            }
        }
    }

    /// Running → Paused.
    pub fn pause(&mut self, id: &StrategyId) -> Result<(), RuntimeError> {
        let instance = self.find_mut(id)?;
        if instance.state != StrategyState::Running {
            return Err(RuntimeError::InvalidTransition {
                strategy: id.clone(),
                from: instance.state,
                action: "pause",
            });
        }
        instance.state = StrategyState::Paused;
        info!(strategy = %id, "strategy paused");
        Ok(())
    }

    /// Paused → Running.
    pub fn resume(&mut self, id: &StrategyId) -> Result<(), RuntimeError> {
        let instance = self.find_mut(id)?;
        if instance.state != StrategyState::Paused {
            return Err(RuntimeError::InvalidTransition {
                strategy: id.clone(),
                from: instance.state,
                action: "resume",
            });
        }
        instance.state = StrategyState::Running;
        info!(strategy = %id, "strategy resumed");
        Ok(())
    }

    /// Any live state → Stopped. Running and paused instances get `on_stop`
    /// first; whatever they queue there is still forwarded.
    pub fn stop(&mut self, id: &StrategyId, now: Timestamp) -> Result<(), RuntimeError> {
        let config = self.config;
        let instance = self.find_mut(id)?;
        match instance.state {
            StrategyState::Stopped => {
                return Err(RuntimeError::InvalidTransition {
                    strategy: id.clone(),
                    from: StrategyState::Stopped,
                    action: "stop",
                })
            }
            StrategyState::Running | StrategyState::Paused => {
                if let Some(ctx) = instance.ctx.as_mut() {
                    ctx.set_time(now);
                }
                instance.invoke(&config, "on_stop", |s, ctx| s.on_stop(ctx));
            }
            StrategyState::Initialized => {}
        }
        instance.state = StrategyState::Stopped;
        info!(strategy = %id, "strategy stopped");
        self.reap();
        Ok(())
    }

    pub fn stop_all(&mut self, now: Timestamp) {
        for id in self.strategy_ids() {
            if self.state(&id) != Some(StrategyState::Stopped) {
                let _ = self.stop(&id, now);
            }
        }
    }

    /// Destroy the contexts of stopped instances, keeping their pending intents.
    fn reap(&mut self) {
        for instance in &mut self.instances {
            if instance.state == StrategyState::Stopped {
                if let Some(mut ctx) = instance.ctx.take() {
                    self.orphaned.extend(ctx.take_intents());
                }
            }
        }
    }

    // ── Dispatch ───────────────────────────────────────────────────────

    /// Hand one event to the instances it concerns. Returns handler invocations.
    pub fn dispatch(&mut self, event: &Event) -> usize {
        let config = self.config;
        let mut invoked = 0;

        match event.payload() {
            EventPayload::Market(data) => {
                for instance in &mut self.instances {
                    if instance.state == StrategyState::Stopped || !instance.subscribed(event) {
                        continue;
                    }
                    if let Some(ctx) = instance.ctx.as_mut() {
                        ctx.set_clock(event);
                        ctx.observe_market(event);
                    }
                    if instance.state != StrategyState::Running {
                        continue;
                    }
                    invoked += 1;
                    match data {
                        MarketData::Book(book) => {
                            instance.invoke(&config, "on_book", |s, ctx| s.on_book(ctx, book))
                        }
                        MarketData::Tick(trade) => {
                            instance.invoke(&config, "on_tick", |s, ctx| s.on_tick(ctx, trade))
                        }
                        MarketData::Bar(bar) => {
                            instance.invoke(&config, "on_bar", |s, ctx| s.on_bar(ctx, bar))
                        }
                    }
                }
            }
            EventPayload::OrderUpdate(update) => {
                if let Some(instance) = self
                    .instances
                    .iter_mut()
                    .find(|i| i.id == update.order.strategy)
                {
                    if let Some(ctx) = instance.ctx.as_mut() {
                        ctx.set_clock(event);
                        ctx.apply_update(update);
                    }
                    if instance.state == StrategyState::Running {
                        invoked += 1;
                        instance.invoke(&config, "on_order_update", |s, ctx| {
                            s.on_order_update(ctx, update)
                        });
                    }
                }
            }
            EventPayload::Timer(timer) => {
                if let Some(instance) = self.instances.iter_mut().find(|i| i.id == timer.strategy) {
                    if instance.state == StrategyState::Running {
                        if let Some(ctx) = instance.ctx.as_mut() {
                            ctx.set_clock(event);
                        }
                        invoked += 1;
                        instance.invoke(&config, "on_timer", |s, ctx| s.on_timer(ctx, timer));
                    }
                }
            }
        }

        self.reap();
        invoked
    }

    /// Intents queued since the last call, in instance order.
    pub fn take_intents(&mut self) -> Vec<Intent> {
        let mut intents = std::mem::take(&mut self.orphaned);
        for instance in &mut self.instances {
            if let Some(ctx) = instance.ctx.as_mut() {
                intents.extend(ctx.take_intents());
            }
        }
        intents
    }

    pub fn take_timers(&mut self) -> Vec<TimerRequest> {
        self.instances
            .iter_mut()
            .filter_map(|i| i.ctx.as_mut())
            .flat_map(|ctx| ctx.take_timers())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        MarketData, OrderId, OrderRequest, OrderState, OrderUpdate, ResolutionKind, Side, Trade,
        UpdateKind, VenueId,
    };
    use crate::runtime::Subscription;
    use chrono::{TimeZone, Utc};

    struct Buyer {
        fail_on: Option<f64>,
        ticks: usize,
    }

    impl Strategy for Buyer {
        fn name(&self) -> &str {
            "buyer"
        }

        fn subscriptions(&self) -> Vec<Subscription> {
            vec![Subscription::new("sim", "X", ResolutionKind::Tick)]
        }

        fn on_tick(&mut self, ctx: &mut StrategyContext, trade: &Trade) -> Result<(), StrategyError> {
            self.ticks += 1;
            if Some(trade.price) == self.fail_on {
                return Err(StrategyError::msg("bad tick"));
            }
            ctx.submit(OrderRequest::market(VenueId::from("sim"), "X", Side::Buy, 1.0));
            Ok(())
        }
    }

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn tick(secs: i64, symbol: &str, price: f64) -> Event {
        Event::market(
            t(secs),
            VenueId::from("sim"),
            symbol,
            MarketData::Tick(Trade { price, size: 1.0 }),
        )
    }

    fn runtime(fail_on: Option<f64>, fatal: bool) -> (StrategyRuntime, StrategyId) {
        let mut rt = StrategyRuntime::new(
            RuntimeConfig {
                fatal_on_error: fatal,
                ..Default::default()
            },
            OrderIdGen::new(),
        );
        let id = rt.add(Box::new(Buyer { fail_on, ticks: 0 })).unwrap();
        (rt, id)
    }

    #[test]
    fn dispatches_only_subscribed_events() {
        let (mut rt, id) = runtime(None, false);
        rt.start(&id, t(0)).unwrap();
        assert_eq!(rt.dispatch(&tick(1, "X", 100.0)), 1);
        assert_eq!(rt.dispatch(&tick(2, "Y", 100.0)), 0);
        let intents = rt.take_intents();
        assert_eq!(intents.len(), 1);
        match &intents[0] {
            Intent::Submit(order) => assert_eq!(order.created_at, t(1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn initialized_instances_do_not_run() {
        let (mut rt, id) = runtime(None, false);
        assert_eq!(rt.dispatch(&tick(1, "X", 100.0)), 0);
        assert_eq!(rt.state(&id), Some(StrategyState::Initialized));
    }

    #[test]
    fn handler_error_pauses_and_resume_restores() {
        let (mut rt, id) = runtime(Some(13.0), false);
        rt.start(&id, t(0)).unwrap();
        rt.dispatch(&tick(1, "X", 13.0));
        assert_eq!(rt.state(&id), Some(StrategyState::Paused));
        assert_eq!(rt.stats(&id).unwrap().errors, 1);

        assert_eq!(rt.dispatch(&tick(2, "X", 100.0)), 0);
        rt.resume(&id).unwrap();
        assert_eq!(rt.dispatch(&tick(3, "X", 100.0)), 1);
    }

    #[test]
    fn fatal_errors_stop_and_destroy_context() {
        let (mut rt, id) = runtime(Some(13.0), true);
        rt.start(&id, t(0)).unwrap();
        rt.dispatch(&tick(1, "X", 13.0));
        assert_eq!(rt.state(&id), Some(StrategyState::Stopped));
        assert!(rt.context(&id).is_none());
        assert!(rt.resume(&id).is_err());
    }

    #[test]
    fn illegal_transitions_are_errors() {
        let (mut rt, id) = runtime(None, false);
        assert!(matches!(
            rt.pause(&id),
            Err(RuntimeError::InvalidTransition { action: "pause", .. })
        ));
        rt.start(&id, t(0)).unwrap();
        assert!(rt.start(&id, t(0)).is_err());
        assert_eq!(
            rt.pause(&StrategyId::new("nope")),
            Err(RuntimeError::UnknownStrategy(StrategyId::new("nope")))
        );
        assert!(matches!(
            rt.add(Box::new(Buyer { fail_on: None, ticks: 0 })),
            Err(RuntimeError::DuplicateStrategy(_))
        ));
    }

    #[test]
    fn paused_instances_still_track_their_orders() {
        let (mut rt, id) = runtime(None, false);
        rt.start(&id, t(0)).unwrap();
        rt.dispatch(&tick(1, "X", 100.0));
        let order = match rt.take_intents().remove(0) {
            Intent::Submit(order) => order,
            other => panic!("unexpected {other:?}"),
        };
        rt.pause(&id).unwrap();

        let mut accepted = order.clone();
        accepted.state = OrderState::Submitted;
        let update = Event::order_update(t(1), OrderUpdate::new(accepted, UpdateKind::Accepted));
        assert_eq!(rt.dispatch(&update), 0);
        assert_eq!(
            rt.context(&id).unwrap().order(OrderId(1)).unwrap().state,
            OrderState::Submitted
        );
    }

    struct Sluggish {
        stall: std::time::Duration,
    }

    impl Strategy for Sluggish {
        fn name(&self) -> &str {
            "sluggish"
        }

        fn subscriptions(&self) -> Vec<Subscription> {
            vec![Subscription::new("sim", "X", ResolutionKind::Tick)]
        }

        fn on_tick(&mut self, _ctx: &mut StrategyContext, trade: &Trade) -> Result<(), StrategyError> {
            if trade.price == 1.0 {
                std::thread::sleep(self.stall);
            }
            Ok(())
        }
    }

    #[test]
    fn slow_handlers_are_counted_but_keep_running() {
        let mut rt = StrategyRuntime::new(
            RuntimeConfig {
                handler_deadline_ms: 5,
                ..Default::default()
            },
            OrderIdGen::new(),
        );
        let id = rt
            .add(Box::new(Sluggish {
                stall: std::time::Duration::from_millis(40),
            }))
            .unwrap();
        rt.start(&id, t(0)).unwrap();

        assert_eq!(rt.dispatch(&tick(1, "X", 1.0)), 1);
        assert_eq!(rt.state(&id), Some(StrategyState::Running));
        assert_eq!(rt.stats(&id).unwrap().deadline_overruns, 1);

        assert_eq!(rt.dispatch(&tick(2, "X", 2.0)), 1);
        let stats = rt.stats(&id).unwrap();
        assert_eq!(stats.handled, 3);
        assert_eq!(stats.deadline_overruns, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(rt.state(&id), Some(StrategyState::Running));
    }
}
