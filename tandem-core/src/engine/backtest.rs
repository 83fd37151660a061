//! Backtest scheduler: synchronous, single-threaded, bit-reproducible.
//!
//! Running: pull from the merged stream until it is exhausted (or a stop is
//! requested). Draining: fire leftover timers, stop strategies, cancel
//! resting simulated orders ("run terminated"). Then Terminated.

use std::sync::Arc;
use tracing::info;

use super::{Dispatcher, RunContext, RunReport, SchedulerPhase};
use crate::data::{BoxedEvents, DropCounters, DropStats, Replay};

pub struct BacktestScheduler {
    ctx: RunContext,
    dispatcher: Dispatcher,
    events: BoxedEvents,
    counters: Vec<Arc<DropCounters>>,
}

impl BacktestScheduler {
    pub fn new(ctx: RunContext, dispatcher: Dispatcher, replay: Replay) -> Self {
        Self {
            ctx,
            dispatcher,
            events: Box::new(replay.events),
            counters: replay.counters,
        }
    }

    /// Replay an already-built event sequence (no drop counters).
    pub fn from_events(ctx: RunContext, dispatcher: Dispatcher, events: BoxedEvents) -> Self {
        Self {
            ctx,
            dispatcher,
            events,
            counters: Vec::new(),
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.ctx.phase()
    }

    pub fn run(mut self) -> RunReport {
        self.ctx.advance(SchedulerPhase::Running);
        let stop = self.ctx.stop_handle().clone();

        let mut processed: u64 = 0;
        for event in self.events.by_ref() {
            if stop.is_stopped() {
                info!(run = %self.ctx.run_id().short(), processed, "stop requested");
                break;
            }
            self.dispatcher.process(event);
            processed += 1;
        }

        self.ctx.advance(SchedulerPhase::Draining);
        self.dispatcher.drain(true);

        self.ctx.advance(SchedulerPhase::Terminated);
        let drops = self
            .counters
            .iter()
            .fold(DropStats::default(), |acc, c| acc.merge(c.snapshot()));
        info!(
            run = %self.ctx.run_id().short(),
            processed,
            fills = self.dispatcher.ledger().fills().len(),
            dropped = drops.total(),
            "backtest finished"
        );
        self.dispatcher
            .report(self.ctx.run_id().clone(), self.ctx.phase(), drops)
    }
}
