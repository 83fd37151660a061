//! Engine assembly: configuration plus collaborators in, a runnable engine out.
//!
//! Every mode-dependent decision is made here, once, before the scheduler
//! starts. Strategies are registered the same way in every mode; only the
//! source, the gateways and the scheduler behind them change.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::{resolve, EngineFatalError, Evaluation, GatewayKind, Mode, SourceKind, Wiring};
use crate::config::RunConfig;
use crate::data::{replay, spawn_feeds, DropStats, HistoricalSource, LiveFeed, SourceSpec};
use crate::domain::{Bar, Fill, MarketData, RunId, StrategyId, Symbol, VenueId};
use crate::engine::{
    BacktestScheduler, Dispatcher, LiveScheduler, NullSink, RecordSink, RunContext, RunReport,
    StopHandle, SubmissionRecord,
};
use crate::execution::ExecutionSimulator;
use crate::gateway::{GatewayRouter, LiveGateway, SimulatedGateway, VenueConnector};
use crate::runtime::{Strategy, StrategyRuntime};
use crate::vectorized::{
    run_vectorized, SignalJournal, SignalLogic, SignalStrategy, VectorizedParams, VectorizedReport,
};

/// A named `SignalLogic` bound to one venue/symbol bar stream.
#[derive(Clone)]
struct SignalEntry {
    name: String,
    venue: VenueId,
    symbol: Symbol,
    logic: Arc<dyn SignalLogic>,
    journal: SignalJournal,
}

pub struct EngineBuilder {
    config: RunConfig,
    strategies: Vec<Box<dyn Strategy>>,
    signals: Vec<SignalEntry>,
    sources: Vec<SourceSpec>,
    feeds: Vec<Box<dyn LiveFeed>>,
    connectors: BTreeMap<VenueId, Arc<dyn VenueConnector>>,
    sink: Option<Box<dyn RecordSink>>,
    stop: StopHandle,
}

impl EngineBuilder {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            strategies: Vec::new(),
            signals: Vec::new(),
            sources: Vec::new(),
            feeds: Vec::new(),
            connectors: BTreeMap::new(),
            sink: None,
            stop: StopHandle::new(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Names of everything registered so far: handler strategies, then signal logic.
    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies
            .iter()
            .map(|s| s.name().to_string())
            .chain(self.signals.iter().map(|e| e.name.clone()))
            .collect()
    }

    /// Register a handler strategy (event-driven modes only).
    pub fn strategy(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn boxed_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Register signal logic. Vectorized mode evaluates it over the whole bar
    /// array; the event-driven modes run it bar by bar through `SignalStrategy`.
    pub fn signal_logic(
        mut self,
        name: impl Into<String>,
        venue: impl Into<VenueId>,
        symbol: impl Into<Symbol>,
        logic: Arc<dyn SignalLogic>,
    ) -> Self {
        self.signals.push(SignalEntry {
            name: name.into(),
            venue: venue.into(),
            symbol: symbol.into(),
            logic,
            journal: SignalJournal::new(),
        });
        self
    }

    /// Signal series the named signal logic produces once the engine runs,
    /// in whichever mode it is built for.
    pub fn signal_journal(&self, name: &str) -> Option<SignalJournal> {
        self.signals
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.journal.clone())
    }

    pub fn source(mut self, source: Arc<dyn HistoricalSource>) -> Self {
        self.sources.push(SourceSpec::new(source));
        self
    }

    pub fn source_spec(mut self, spec: SourceSpec) -> Self {
        self.sources.push(spec);
        self
    }

    pub fn feed(mut self, feed: impl LiveFeed) -> Self {
        self.feeds.push(Box::new(feed));
        self
    }

    pub fn connector(mut self, venue: impl Into<VenueId>, connector: Arc<dyn VenueConnector>) -> Self {
        self.connectors.insert(venue.into(), connector);
        self
    }

    pub fn sink(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use an externally owned stop handle (e.g. one wired to ctrl-c).
    pub fn stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Validate everything and assemble the engine for the configured mode.
    pub fn build(self) -> Result<Engine, EngineFatalError> {
        let wiring = resolve(&self.config)?;
        if self.strategies.is_empty() && self.signals.is_empty() {
            return Err(EngineFatalError::NoStrategies);
        }
        if let Some(entry) = self
            .signals
            .iter()
            .find(|e| self.config.venue(&e.venue).is_none())
        {
            return Err(EngineFatalError::UnknownVenue(entry.venue.clone()));
        }

        info!(
            run = %self.config.name,
            mode = %wiring.mode,
            source = ?wiring.source,
            gateway = ?wiring.gateway,
            evaluation = ?wiring.evaluation,
            "engine wiring resolved"
        );

        match wiring.evaluation {
            Evaluation::Vectorized => self.build_vectorized(wiring),
            Evaluation::EventDriven => self.build_event_driven(wiring),
        }
    }

    fn build_vectorized(self, wiring: Wiring) -> Result<Engine, EngineFatalError> {
        if let Some(strategy) = self.strategies.first() {
            return Err(EngineFatalError::HandlersNotVectorizable(StrategyId::new(
                strategy.name(),
            )));
        }
        if self.sources.is_empty() {
            return Err(EngineFatalError::MissingHistoricalSource(wiring.mode));
        }

        let opened = replay(&self.sources)?;
        let counters = opened.counters.clone();
        let mut bars: BTreeMap<(VenueId, Symbol), Vec<Bar>> = BTreeMap::new();
        let mut skipped = 0u64;
        for event in opened.events {
            match event.market_data() {
                Some(MarketData::Bar(bar)) => bars
                    .entry((event.venue().clone(), event.symbol().to_string()))
                    .or_default()
                    .push(*bar),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(skipped, "vectorized mode ignores non-bar events");
        }
        let drops = counters
            .iter()
            .fold(DropStats::default(), |acc, c| acc.merge(c.snapshot()));

        Ok(Engine::Vectorized(VectorizedRun {
            run_id: self.config.run_id(),
            params: self
                .signals
                .iter()
                .map(|e| (e.venue.clone(), self.config.vectorized_params(&e.venue)))
                .collect(),
            entries: self.signals,
            bars,
            drops,
        }))
    }

    fn build_event_driven(self, wiring: Wiring) -> Result<Engine, EngineFatalError> {
        let needs_runtime = wiring.source == SourceKind::Live || wiring.gateway == GatewayKind::Live;
        let handle = if needs_runtime {
            Some(Handle::try_current().map_err(|_| EngineFatalError::NoAsyncRuntime(wiring.mode))?)
        } else {
            None
        };

        match wiring.source {
            SourceKind::Historical if self.sources.is_empty() => {
                return Err(EngineFatalError::MissingHistoricalSource(wiring.mode))
            }
            SourceKind::Live if self.feeds.is_empty() => {
                return Err(EngineFatalError::MissingLiveFeed(wiring.mode))
            }
            _ => {}
        }

        let ctx = RunContext::new(self.config.run_id()).with_stop(self.stop);
        let mut runtime = StrategyRuntime::new(self.config.scheduler.runtime(), ctx.order_ids().clone());
        for strategy in self.strategies {
            runtime.add(strategy)?;
        }
        for entry in self.signals {
            runtime.add(Box::new(
                SignalStrategy::new(
                    entry.name,
                    entry.venue,
                    entry.symbol,
                    entry.logic,
                    self.config.vectorized.target,
                    self.config.vectorized.unit_quantity,
                )
                .with_journal(entry.journal),
            ))?;
        }
        if let Some(sub) = runtime
            .subscriptions()
            .into_iter()
            .find(|s| self.config.venue(&s.venue).is_none())
        {
            return Err(EngineFatalError::UnknownVenue(sub.venue));
        }

        let mut gateways = GatewayRouter::new();
        for venue in &self.config.venues {
            match (wiring.gateway, handle.as_ref()) {
                (GatewayKind::Live, Some(handle)) => {
                    let connector = self
                        .connectors
                        .get(&venue.id)
                        .cloned()
                        .ok_or_else(|| EngineFatalError::MissingConnector(venue.id.clone()))?;
                    gateways.insert(Box::new(LiveGateway::new(
                        venue.id.clone(),
                        connector,
                        self.config.scheduler.gateway_timeout(),
                        handle.clone(),
                    )));
                }
                (GatewayKind::Live, None) => return Err(EngineFatalError::NoAsyncRuntime(wiring.mode)),
                (GatewayKind::Simulated, _) => {
                    if self.connectors.contains_key(&venue.id) {
                        warn!(venue = %venue.id, mode = %wiring.mode, "connector ignored; orders are simulated");
                    }
                    gateways.insert(Box::new(SimulatedGateway::new(
                        venue.id.clone(),
                        ExecutionSimulator::from_policy(self.config.policy_for(&venue.id)),
                    )));
                }
            }
        }

        let sink = self.sink.unwrap_or_else(|| Box::new(NullSink));
        let dispatcher = Dispatcher::new(runtime, gateways, sink);

        match (wiring.source, handle) {
            (SourceKind::Live, Some(handle)) => {
                let streams = spawn_feeds(self.feeds, self.config.scheduler.channel_capacity, &handle);
                Ok(Engine::Live {
                    mode: wiring.mode,
                    scheduler: LiveScheduler::new(ctx, dispatcher, streams, self.config.scheduler.live()),
                })
            }
            (SourceKind::Live, None) => Err(EngineFatalError::NoAsyncRuntime(wiring.mode)),
            (SourceKind::Historical, _) => {
                let opened = replay(&self.sources)?;
                Ok(Engine::Backtest(BacktestScheduler::new(ctx, dispatcher, opened)))
            }
        }
    }
}

/// Vectorized evaluation, ready to run: bars already collected per stream.
pub struct VectorizedRun {
    run_id: RunId,
    entries: Vec<SignalEntry>,
    params: BTreeMap<VenueId, VectorizedParams>,
    bars: BTreeMap<(VenueId, Symbol), Vec<Bar>>,
    drops: DropStats,
}

impl VectorizedRun {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn bars(&self, venue: &VenueId, symbol: &str) -> &[Bar] {
        self.bars
            .get(&(venue.clone(), symbol.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn run(self) -> VectorizedReport {
        let mut results = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let bars = self.bars(&entry.venue, &entry.symbol);
            if bars.is_empty() {
                warn!(strategy = %entry.name, venue = %entry.venue, symbol = %entry.symbol, "no bars for signal logic");
            }
            let params = self.params.get(&entry.venue).copied().unwrap_or_default();
            let result = run_vectorized(
                StrategyId::new(entry.name.as_str()),
                entry.venue.clone(),
                &entry.symbol,
                bars,
                entry.logic.as_ref(),
                &params,
            );
            for point in &result.signals {
                entry.journal.push(*point);
            }
            results.push(result);
        }
        info!(
            run = %self.run_id.short(),
            strategies = results.len(),
            fills = results.iter().map(|r| r.fills.len()).sum::<usize>(),
            "vectorized run finished"
        );
        VectorizedReport {
            run_id: self.run_id,
            results,
            drops: self.drops,
        }
    }
}

/// A fully wired engine for one of the four modes.
pub enum Engine {
    Backtest(BacktestScheduler),
    /// Paper or live: a live source, awaited on a tokio runtime.
    Live { mode: Mode, scheduler: LiveScheduler },
    Vectorized(VectorizedRun),
}

impl Engine {
    /// Run to completion. Backtests run synchronously inside the future.
    pub async fn run(self) -> RunOutcome {
        match self {
            Self::Backtest(scheduler) => RunOutcome::Events(scheduler.run()),
            Self::Live { scheduler, .. } => RunOutcome::Events(scheduler.run().await),
            Self::Vectorized(run) => RunOutcome::Vectorized(run.run()),
        }
    }

    /// Run a historical engine on the current thread. Live engines must be awaited.
    pub fn run_blocking(self) -> Result<RunOutcome, EngineFatalError> {
        match self {
            Self::Backtest(scheduler) => Ok(RunOutcome::Events(scheduler.run())),
            Self::Vectorized(run) => Ok(RunOutcome::Vectorized(run.run())),
            Self::Live { mode, .. } => Err(EngineFatalError::NoAsyncRuntime(mode)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Events(RunReport),
    Vectorized(VectorizedReport),
}

impl RunOutcome {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::Events(r) => &r.run_id,
            Self::Vectorized(r) => &r.run_id,
        }
    }

    pub fn fills(&self) -> Vec<Fill> {
        match self {
            Self::Events(r) => r.fills.clone(),
            Self::Vectorized(r) => r.results.iter().flat_map(|x| x.fills.clone()).collect(),
        }
    }

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        match self {
            Self::Events(r) => r.submissions.clone(),
            Self::Vectorized(r) => r
                .results
                .iter()
                .flat_map(|x| x.submissions.clone())
                .collect(),
        }
    }

    pub fn drops(&self) -> DropStats {
        match self {
            Self::Events(r) => r.drops,
            Self::Vectorized(r) => r.drops,
        }
    }

    pub fn events_report(&self) -> Option<&RunReport> {
        match self {
            Self::Events(r) => Some(r),
            Self::Vectorized(_) => None,
        }
    }

    pub fn vectorized_report(&self) -> Option<&VectorizedReport> {
        match self {
            Self::Vectorized(r) => Some(r),
            Self::Events(_) => None,
        }
    }
}
