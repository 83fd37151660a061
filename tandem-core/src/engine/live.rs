//! Live scheduler: async run loop over an unbounded event source.
//!
//! One `tokio::select!` (biased, in this order):
//! - stop signal: observed between events, never mid-handler
//! - the feed channel (the only merge point for live data)
//! - a poll interval that picks up gateway acks and execution reports and
//!   fires timers that came due while the feeds were quiet
//!
//! Feeds run independently, so the channel can deliver an event older than
//! one already dispatched. `ArrivalGate` sits at the receiving end: it stamps
//! the arrival sequence number and drops late events (warned and counted as
//! out of order), so dispatch stays in non-decreasing timestamp order.
//!
//! Between events the live clock is the last event's timestamp plus the wall
//! time elapsed since it arrived.
//!
//! Draining fires leftover timers, stops strategies, waits (bounded) for
//! in-flight requests to settle, and only cancels working live orders when
//! `cancel_on_stop` is set.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{Dispatcher, RunContext, RunReport, SchedulerPhase};
use crate::data::{DropCounters, DropStats, LiveStreams};
use crate::domain::{Event, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSettings {
    pub poll_interval: Duration,
    pub drain_timeout: Duration,
    pub cancel_on_stop: bool,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(10),
            cancel_on_stop: false,
        }
    }
}

/// Receiving end of the live merge point.
#[derive(Debug, Default)]
pub struct ArrivalGate {
    last: Option<(Timestamp, Instant)>,
    next_seq: u64,
    drops: Arc<DropCounters>,
}

impl ArrivalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `event` with the next arrival sequence number, or drop it if it
    /// is older than the last admitted event.
    pub fn admit(&mut self, event: Event) -> Option<Event> {
        let ts = event.timestamp();
        if let Some((last, _)) = self.last {
            if ts < last {
                warn!(
                    venue = %event.venue(),
                    symbol = event.symbol(),
                    at = %ts,
                    last = %last,
                    "late live event dropped"
                );
                self.drops.count_out_of_order();
                return None;
            }
        }
        self.last = Some((ts, Instant::now()));
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(event.with_seq(seq))
    }

    /// Last event time advanced by the wall time since it arrived.
    pub fn clock(&self) -> Option<Timestamp> {
        let (ts, arrived) = self.last?;
        let elapsed = chrono::Duration::from_std(arrived.elapsed()).ok()?;
        Some(ts + elapsed)
    }

    pub fn drops(&self) -> DropStats {
        self.drops.snapshot()
    }
}

pub struct LiveScheduler {
    ctx: RunContext,
    dispatcher: Dispatcher,
    events: mpsc::Receiver<Event>,
    gate: ArrivalGate,
    feeds: Vec<JoinHandle<()>>,
    counters: Vec<Arc<DropCounters>>,
    settings: LiveSettings,
}

impl LiveScheduler {
    pub fn new(ctx: RunContext, dispatcher: Dispatcher, streams: LiveStreams, settings: LiveSettings) -> Self {
        Self {
            ctx,
            dispatcher,
            events: streams.events,
            gate: ArrivalGate::new(),
            feeds: streams.handles,
            counters: streams.counters,
            settings,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.ctx.phase()
    }

    /// Run until stopped or until every feed has ended.
    pub async fn run(mut self) -> RunReport {
        self.ctx.advance(SchedulerPhase::Running);
        let stop = self.ctx.stop_handle().clone();
        let mut poll = tokio::time::interval(self.settings.poll_interval.max(Duration::from_millis(1)));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => {
                    info!(run = %self.ctx.run_id().short(), "stop requested");
                    break;
                }
                next = self.events.recv() => match next {
                    Some(event) => {
                        if let Some(event) = self.gate.admit(event) {
                            self.dispatcher.process(event);
                        }
                    }
                    None => {
                        info!(run = %self.ctx.run_id().short(), "all feeds ended");
                        break;
                    }
                },
                _ = poll.tick() => {
                    self.dispatcher.poll();
                    if let Some(now) = self.gate.clock() {
                        self.dispatcher.fire_due_timers(now);
                    }
                }
            }
        }

        self.ctx.advance(SchedulerPhase::Draining);
        for feed in &self.feeds {
            feed.abort();
        }
        self.dispatcher.fire_pending_timers();
        self.dispatcher.stop_strategies();
        self.settle().await;
        self.dispatcher.shutdown_gateways(self.settings.cancel_on_stop);
        self.settle().await;
        self.dispatcher.flush_sink();

        self.ctx.advance(SchedulerPhase::Terminated);
        let drops = self
            .counters
            .iter()
            .fold(self.gate.drops(), |acc, c| acc.merge(c.snapshot()));
        self.dispatcher
            .report(self.ctx.run_id().clone(), self.ctx.phase(), drops)
    }

    /// Poll until no gateway request is in flight, or the drain timeout passes.
    async fn settle(&mut self) {
        let deadline = tokio::time::Instant::now() + self.settings.drain_timeout;
        let step = self.settings.poll_interval.min(Duration::from_millis(10)).max(Duration::from_millis(1));
        self.dispatcher.poll();
        while self.dispatcher.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    in_flight = self.dispatcher.in_flight(),
                    timeout = ?self.settings.drain_timeout,
                    "drain timeout; leaving requests unsettled"
                );
                return;
            }
            tokio::time::sleep(step).await;
            self.dispatcher.poll();
        }
    }
}
