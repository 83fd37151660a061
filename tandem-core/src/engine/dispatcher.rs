//! Per-event dispatch shared by the backtest and live schedulers.
//!
//! The dispatcher is the single writer of the run's fill ledger and the only
//! path between strategies and gateways: strategies emit intents into their
//! contexts, the dispatcher forwards them, and every gateway outcome comes
//! back to the owning strategy as an OrderUpdate event. Gateway errors
//! (unknown venue, unknown order, bad state) are turned into synthesized
//! Rejected / CancelRejected updates; nothing crosses back as an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    RecordSink, RunRecord, RunReport, SchedulerPhase, StrategyReport, SubmissionRecord, TimerQueue,
};
use crate::data::DropStats;
use crate::domain::{
    Event, EventPayload, Ledger, OrderState, OrderUpdate, RunId, Timestamp, UpdateKind,
};
use crate::gateway::GatewayRouter;
use crate::runtime::{Intent, StrategyRuntime};

/// Rounds of intent → update → intent chains allowed for one event.
const MAX_SETTLE_ROUNDS: usize = 64;

/// Timers fired for one event before the rest are deferred.
const MAX_TIMERS_PER_EVENT: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub market_events: u64,
    pub order_updates: u64,
    pub timers_fired: u64,
    pub handler_calls: u64,
    pub submitted: u64,
    pub cancel_requests: u64,
    pub synthesized_rejects: u64,
}

pub struct Dispatcher {
    runtime: StrategyRuntime,
    gateways: GatewayRouter,
    timers: TimerQueue,
    ledger: Ledger,
    sink: Box<dyn RecordSink>,
    submissions: Vec<SubmissionRecord>,
    /// Updates produced by the dispatcher itself (gateway errors).
    synthesized: Vec<OrderUpdate>,
    stats: DispatchStats,
    started: bool,
    first_ts: Option<Timestamp>,
    last_ts: Option<Timestamp>,
    next_seq: u64,
}

impl Dispatcher {
    pub fn new(runtime: StrategyRuntime, gateways: GatewayRouter, sink: Box<dyn RecordSink>) -> Self {
        Self {
            runtime,
            gateways,
            timers: TimerQueue::new(),
            ledger: Ledger::new(),
            sink,
            submissions: Vec::new(),
            synthesized: Vec::new(),
            stats: DispatchStats::default(),
            started: false,
            first_ts: None,
            last_ts: None,
            next_seq: 0,
        }
    }

    // ── Read access ────────────────────────────────────────────────────

    pub fn runtime(&self) -> &StrategyRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut StrategyRuntime {
        &mut self.runtime
    }

    pub fn gateways(&self) -> &GatewayRouter {
        &self.gateways
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn submissions(&self) -> &[SubmissionRecord] {
        &self.submissions
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn in_flight(&self) -> usize {
        self.gateways.in_flight()
    }

    pub fn first_event(&self) -> Option<Timestamp> {
        self.first_ts
    }

    /// Engine clock: timestamp of the latest event seen.
    pub fn clock(&self) -> Timestamp {
        self.last_ts.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    // ── Per-event dispatch ─────────────────────────────────────────────

    /// Start every strategy instance at `now` and settle whatever `on_start` queued.
    pub fn start(&mut self, now: Timestamp) {
        if self.started {
            return;
        }
        self.started = true;
        self.runtime.start_all(now);
        self.settle(now);
    }

    pub fn process(&mut self, event: Event) {
        let ts = event.timestamp();
        if !self.started {
            self.start(ts);
        }
        self.first_ts.get_or_insert(ts);
        self.fire_timers(Some(ts));
        self.last_ts = Some(self.last_ts.map_or(ts, |last| last.max(ts)));

        if matches!(event.payload(), EventPayload::Market(_)) {
            self.stats.market_events += 1;
            self.gateways.on_market(&event);
            self.flush(ts);
        }

        self.stats.handler_calls += self.runtime.dispatch(&event) as u64;
        self.settle(ts);
    }

    /// Pick up asynchronous gateway updates between events (live mode).
    pub fn poll(&mut self) -> usize {
        let now = self.clock();
        let flushed = self.flush(now);
        if flushed > 0 {
            self.settle(now);
        }
        flushed
    }

    /// Forward intents and dispatch updates until nothing new is produced.
    fn settle(&mut self, now: Timestamp) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            for request in self.runtime.take_timers() {
                self.timers.schedule(request);
            }
            let intents = self.runtime.take_intents();
            let forwarded = intents.len();
            for intent in intents {
                self.forward(intent, now);
            }
            let flushed = self.flush(now);
            if forwarded == 0 && flushed == 0 {
                return;
            }
        }
        warn!(at = %now, rounds = MAX_SETTLE_ROUNDS, "intent/update chain did not settle");
    }

    fn forward(&mut self, intent: Intent, now: Timestamp) {
        match intent {
            Intent::Submit(order) => {
                self.stats.submitted += 1;
                self.submissions.push(SubmissionRecord::from(&order));
                debug!(order = %order.id, strategy = %order.strategy, venue = %order.venue, "submit");
                let snapshot = order.clone();
                if let Err(e) = self.gateways.submit(order, now) {
                    let reason = e.reject_reason();
                    warn!(order = %snapshot.id, error = %e, "submit refused");
                    let mut rejected = snapshot;
                    rejected.state = OrderState::Rejected;
                    rejected.reject_reason = Some(reason.clone());
                    self.stats.synthesized_rejects += 1;
                    self.synthesized
                        .push(OrderUpdate::new(rejected, UpdateKind::Rejected { reason }));
                }
            }
            Intent::Cancel { strategy, order_id } => {
                self.stats.cancel_requests += 1;
                if let Err(e) = self.gateways.cancel(order_id, now) {
                    let snapshot = self.gateways.order(order_id).cloned().or_else(|| {
                        self.runtime
                            .context(&strategy)
                            .and_then(|ctx| ctx.order(order_id))
                            .cloned()
                    });
                    match snapshot {
                        Some(order) => {
                            self.stats.synthesized_rejects += 1;
                            self.synthesized.push(OrderUpdate::new(
                                order,
                                UpdateKind::CancelRejected {
                                    reason: e.reject_reason(),
                                },
                            ));
                        }
                        None => warn!(order = %order_id, %strategy, error = %e, "cancel for unknown order dropped"),
                    }
                }
            }
        }
    }

    /// Dispatch pending gateway and synthesized updates. Returns how many.
    fn flush(&mut self, now: Timestamp) -> usize {
        let mut updates = std::mem::take(&mut self.synthesized);
        updates.extend(self.gateways.poll_updates());
        let count = updates.len();
        for update in updates {
            self.record(&update);
            let event = Event::order_update(now, update).with_seq(self.bump_seq());
            self.stats.order_updates += 1;
            self.stats.handler_calls += self.runtime.dispatch(&event) as u64;
        }
        count
    }

    fn record(&mut self, update: &OrderUpdate) {
        if let Some(fill) = update.fill() {
            self.ledger.append(fill.clone());
            self.sink.record(&RunRecord::Fill(fill.clone()));
        }
        if update.order.state.is_terminal() {
            self.sink.record(&RunRecord::Order(update.order.clone()));
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Fire timers due at or before `until` (`None`: every pending timer).
    fn fire_timers(&mut self, until: Option<Timestamp>) {
        for _ in 0..MAX_TIMERS_PER_EVENT {
            let next = match until {
                Some(now) => self.timers.pop_due(now),
                None => self.timers.pop(),
            };
            let Some((at, timer)) = next else {
                return;
            };
            let at = at.max(self.clock());
            self.last_ts = Some(at);
            let event = Event::timer(at, timer).with_seq(self.bump_seq());
            self.stats.timers_fired += 1;
            self.stats.handler_calls += self.runtime.dispatch(&event) as u64;
            self.settle(at);
        }
        warn!(limit = MAX_TIMERS_PER_EVENT, "timer limit reached; remaining timers deferred");
    }

    // ── Draining ───────────────────────────────────────────────────────

    /// Fire timers due at or before `now` without a data event (live clock).
    pub fn fire_due_timers(&mut self, now: Timestamp) -> u64 {
        let before = self.stats.timers_fired;
        self.fire_timers(Some(now));
        self.stats.timers_fired - before
    }

    /// Fire every timer still pending, in time order.
    pub fn fire_pending_timers(&mut self) {
        self.fire_timers(None);
    }

    /// Stop every strategy (`on_stop` runs) and forward what it queued.
    pub fn stop_strategies(&mut self) {
        let now = self.clock();
        self.runtime.stop_all(now);
        self.settle(now);
    }

    /// Shut gateways down and record the resulting updates.
    pub fn shutdown_gateways(&mut self, cancel_open: bool) {
        let now = self.clock();
        self.gateways.shutdown(now, cancel_open);
        self.flush(now);
    }

    /// Synchronous drain used by the backtest scheduler.
    pub fn drain(&mut self, cancel_open: bool) {
        self.fire_pending_timers();
        self.stop_strategies();
        self.shutdown_gateways(cancel_open);
        self.sink.flush();
    }

    pub fn flush_sink(&mut self) {
        self.sink.flush();
    }

    /// Snapshot of everything the run produced.
    pub fn report(&self, run_id: RunId, phase: SchedulerPhase, drops: DropStats) -> RunReport {
        RunReport {
            run_id,
            phase,
            first_event: self.first_ts,
            last_event: self.last_ts,
            submissions: self.submissions.clone(),
            orders: self.gateways.orders().into_iter().cloned().collect(),
            fills: self.ledger.fills().to_vec(),
            audit_trail: self.gateways.audit_trail(),
            positions: self.ledger.positions().cloned().collect(),
            strategies: self
                .runtime
                .strategy_ids()
                .into_iter()
                .filter_map(|id| {
                    let state = self.runtime.state(&id)?;
                    let stats = self.runtime.stats(&id)?.clone();
                    Some(StrategyReport { id, state, stats })
                })
                .collect(),
            stats: self.stats,
            drops,
        }
    }
}
