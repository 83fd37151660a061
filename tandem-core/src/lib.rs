//! Tandem Core: event model, data adapters, execution, gateways, strategy runtime, schedulers.
//!
//! One strategy code path, four ways to run it:
//! - Domain types (events, orders, fills, positions, market data)
//! - Data resolution adapters (encode, stream, k-way merge, tick→bar resampling, live feeds)
//! - Deterministic execution simulator (fill policy, cost model, liquidity caps)
//! - Venue gateways (simulated and live) behind one trait
//! - Strategy runtime with per-instance lifecycle and contexts
//! - Backtest and live schedulers sharing one per-event dispatcher
//! - Mode switch controller and vectorized signal evaluation

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod gateway;
pub mod mode;
pub mod runtime;
pub mod vectorized;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything that crosses a thread or task boundary is Send.
    ///
    /// Live mode moves the dispatcher into a tokio task and the runner fans
    /// backtests out over rayon, so a non-Send type here breaks both.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Event>();
        require_sync::<domain::Event>();
        require_send::<domain::Order>();
        require_sync::<domain::Order>();
        require_send::<domain::Fill>();
        require_sync::<domain::Fill>();
        require_send::<domain::Ledger>();
        require_sync::<domain::Ledger>();
        require_send::<domain::OrderIdGen>();
        require_sync::<domain::OrderIdGen>();

        // Data
        require_send::<data::EventStream>();
        require_send::<data::MergedStream>();
        require_send::<data::DropCounters>();
        require_sync::<data::DropCounters>();

        // Execution + gateways
        require_send::<execution::ExecutionSimulator>();
        require_send::<gateway::SimulatedGateway>();
        require_send::<gateway::LiveGateway>();
        require_send::<gateway::GatewayRouter>();

        // Runtime + engine
        require_send::<runtime::StrategyRuntime>();
        require_send::<runtime::StrategyContext>();
        require_send::<engine::Dispatcher>();
        require_send::<engine::BacktestScheduler>();
        require_send::<engine::LiveScheduler>();
        require_send::<engine::StopHandle>();
        require_sync::<engine::StopHandle>();

        // Configuration
        require_send::<config::RunConfig>();
        require_sync::<config::RunConfig>();

        // Mode switch
        require_send::<mode::Engine>();
        require_send::<mode::EngineBuilder>();
    }

    /// Architecture contract: strategy handlers only see the context, never a gateway or source.
    #[test]
    fn strategy_handlers_receive_context_only() {
        fn _check_trait_object_builds(
            strategy: &mut dyn runtime::Strategy,
            ctx: &mut runtime::StrategyContext,
            trade: &domain::Trade,
        ) -> Result<(), runtime::StrategyError> {
            strategy.on_tick(ctx, trade)
        }
    }
}
