//! Strategy timers, interleaved with data by timestamp.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::domain::{StrategyId, TimerFired, Timestamp};
use crate::runtime::TimerRequest;

/// Min-heap of pending timers keyed by (fire time, scheduling order).
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<(Timestamp, u64, StrategyId, String)>>,
    next: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, request: TimerRequest) {
        self.heap
            .push(Reverse((request.at, self.next, request.strategy, request.name)));
        self.next += 1;
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn next_due(&self) -> Option<Timestamp> {
        self.heap.peek().map(|Reverse((at, ..))| *at)
    }

    /// Pop the earliest timer if it is due at or before `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<(Timestamp, TimerFired)> {
        if self.next_due()? > now {
            return None;
        }
        self.pop()
    }

    pub fn pop(&mut self) -> Option<(Timestamp, TimerFired)> {
        let Reverse((at, _, strategy, name)) = self.heap.pop()?;
        Some((at, TimerFired { strategy, name }))
    }
}
