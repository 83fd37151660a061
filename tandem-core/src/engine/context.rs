//! Run-scoped state: identity, phase, order ids, stop signal.
//!
//! Nothing here is process-wide. Two runs in one process each own their
//! `RunContext`, so concurrent backtests never share ids or phases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::domain::{OrderIdGen, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SchedulerPhase {
    Idle,
    Running,
    Draining,
    Terminated,
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Cloneable stop request, observed by the scheduler at the next event boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once `stop` has been called (immediately if it already was).
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
pub struct RunContext {
    run_id: RunId,
    ids: OrderIdGen,
    phase: SchedulerPhase,
    stop: StopHandle,
}

impl RunContext {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            ids: OrderIdGen::new(),
            phase: SchedulerPhase::Idle,
            stop: StopHandle::new(),
        }
    }

    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn order_ids(&self) -> &OrderIdGen {
        &self.ids
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn stop_handle(&self) -> &StopHandle {
        &self.stop
    }

    /// Move forward through Idle → Running → Draining → Terminated.
    /// Phases never go backwards; a backwards request is ignored.
    pub fn advance(&mut self, to: SchedulerPhase) {
        if to <= self.phase {
            warn!(run = %self.run_id.short(), from = %self.phase, %to, "ignoring phase regression");
            return;
        }
        info!(run = %self.run_id.short(), from = %self.phase, %to, "scheduler phase");
        self.phase = to;
    }
}
