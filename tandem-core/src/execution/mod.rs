//! Execution simulation: fill policy, cost model, liquidity constraints.

pub mod cost_model;
pub mod liquidity;
pub mod market_state;
pub mod simulator;

pub use cost_model::CostModel;
pub use liquidity::LiquidityPolicy;
pub use market_state::{crossing_price, MarketState, Quote};
pub use simulator::{ExecutionSimulator, FillPolicy};
