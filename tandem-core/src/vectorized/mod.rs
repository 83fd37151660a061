//! Vectorized backtesting and the signal-logic contract it shares with the
//! event-driven modes.
//!
//! Vectorized mode does not run strategy handlers. It evaluates the same
//! `SignalLogic` the event-driven `SignalStrategy` adapter runs, over whole
//! bar arrays, and prices the resulting orders with the same simulator.
//! "Same strategy code" therefore means "same signal logic" here.

pub mod batch;
pub mod conditions;
pub mod logic;
pub mod parity;

pub use batch::{run_vectorized, VectorizedParams, VectorizedReport, VectorizedResult};
pub use conditions::{signals_from_conditions, ConditionError};
pub use logic::{target_order, SignalJournal, SignalLogic, SignalPoint, SignalStrategy, TargetMode};
pub use parity::{compare_signals, fills_match, SignalMismatch, SignalParity};
