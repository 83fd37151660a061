//! Engine scheduler: drives a run from the first event to termination.
//!
//! Both schedulers share one per-event `Dispatcher`:
//!
//! 1. Timers due at or before the event fire first
//! 2. Gateways see the market event (working simulated orders are matched)
//! 3. Updates produced so far are dispatched as OrderUpdate events
//! 4. The event is dispatched to the strategy runtime
//! 5. Intents are forwarded to the gateways; resulting updates are dispatched
//!
//! The backtest scheduler pulls from a bounded merged stream; the live
//! scheduler selects over a stop signal, the feed channel and a gateway poll.

pub mod backtest;
pub mod context;
pub mod dispatcher;
pub mod live;
pub mod report;
pub mod sink;
pub mod timers;

pub use backtest::BacktestScheduler;
pub use context::{RunContext, SchedulerPhase, StopHandle};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use live::{ArrivalGate, LiveScheduler, LiveSettings};
pub use report::{RunReport, StrategyReport, SubmissionRecord};
pub use sink::{MemorySink, NullSink, RecordSink, RunRecord};
pub use timers::TimerQueue;
