//! Strategy runtime: the authoring contract, per-instance contexts and the
//! host that dispatches events to them.

pub mod context;
pub mod host;
pub mod signal;
pub mod strategy;

pub use context::{Intent, StrategyContext, TimerRequest};
pub use host::{InstanceStats, RuntimeConfig, RuntimeError, StrategyRuntime, StrategyState};
pub use signal::{rolling_zscore, FeatureWindow, SignalModel};
pub use strategy::{Strategy, StrategyError, Subscription};
