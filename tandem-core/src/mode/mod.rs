//! Mode switch controller: one configuration field rewires the engine.
//!
//! | mode | source | gateway | evaluation |
//! |---|---|---|---|
//! | vectorized-backtest | historical | simulated | vectorized |
//! | event-driven-backtest | historical | simulated | event-driven |
//! | paper | live | simulated | event-driven |
//! | live | live | live | event-driven |
//!
//! Strategy code never sees which row it is running under.

pub mod builder;

pub use builder::{Engine, EngineBuilder, RunOutcome};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::RunConfig;
use crate::data::SourceError;
use crate::domain::{ResolutionKind, StrategyId, VenueId};
use crate::runtime::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    VectorizedBacktest,
    EventDrivenBacktest,
    Paper,
    Live,
}

impl Mode {
    pub const ALL: [Mode; 4] = [
        Mode::VectorizedBacktest,
        Mode::EventDrivenBacktest,
        Mode::Paper,
        Mode::Live,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VectorizedBacktest => "vectorized-backtest",
            Self::EventDrivenBacktest => "event-driven-backtest",
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }

    pub fn is_historical(self) -> bool {
        matches!(self, Self::VectorizedBacktest | Self::EventDrivenBacktest)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = EngineFatalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| EngineFatalError::UnknownMode(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Historical,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayKind {
    Simulated,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    Vectorized,
    EventDriven,
}

/// The resolved (source, gateway, evaluation) triple for a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wiring {
    pub mode: Mode,
    pub source: SourceKind,
    pub gateway: GatewayKind,
    pub evaluation: Evaluation,
}

impl Wiring {
    pub fn for_mode(mode: Mode) -> Self {
        let (source, gateway, evaluation) = match mode {
            Mode::VectorizedBacktest => (SourceKind::Historical, GatewayKind::Simulated, Evaluation::Vectorized),
            Mode::EventDrivenBacktest => (SourceKind::Historical, GatewayKind::Simulated, Evaluation::EventDriven),
            Mode::Paper => (SourceKind::Live, GatewayKind::Simulated, Evaluation::EventDriven),
            Mode::Live => (SourceKind::Live, GatewayKind::Live, Evaluation::EventDriven),
        };
        Self {
            mode,
            source,
            gateway,
            evaluation,
        }
    }
}

/// Configuration-time failures. Raised before the scheduler starts; never after.
#[derive(Debug, Error)]
pub enum EngineFatalError {
    #[error("unknown mode {0:?}")]
    UnknownMode(String),

    #[error("no strategies registered")]
    NoStrategies,

    #[error("no subscriptions configured")]
    NoSubscriptions,

    #[error("venue {0} is configured twice")]
    DuplicateVenue(VenueId),

    #[error("subscription references unknown venue {0}")]
    UnknownVenue(VenueId),

    #[error("mode {0} needs at least one historical source")]
    MissingHistoricalSource(Mode),

    #[error("mode {0} needs at least one live feed")]
    MissingLiveFeed(Mode),

    #[error("live venue {0} has no connector")]
    MissingConnector(VenueId),

    #[error("live venue {0} has no credentials reference")]
    MissingCredentials(VenueId),

    #[error("vectorized mode needs bar subscriptions, got {0}")]
    VectorizedNeedsBars(ResolutionKind),

    #[error("vectorized mode evaluates signal logic only; strategy {0} is a handler strategy")]
    HandlersNotVectorizable(StrategyId),

    #[error("mode {0} needs a tokio runtime")]
    NoAsyncRuntime(Mode),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error(transparent)]
    Strategy(#[from] RuntimeError),

    #[error("historical source: {0}")]
    Source(#[from] SourceError),
}

/// Validate `config` and map its mode to a wiring.
pub fn resolve(config: &RunConfig) -> Result<Wiring, EngineFatalError> {
    let wiring = Wiring::for_mode(config.mode);

    let mut venues = BTreeSet::new();
    for venue in &config.venues {
        if !venues.insert(&venue.id) {
            return Err(EngineFatalError::DuplicateVenue(venue.id.clone()));
        }
    }

    if config.subscriptions.is_empty() {
        return Err(EngineFatalError::NoSubscriptions);
    }
    if let Some(sub) = config.subscriptions.iter().find(|s| !venues.contains(&s.venue)) {
        return Err(EngineFatalError::UnknownVenue(sub.venue.clone()));
    }

    if wiring.gateway == GatewayKind::Live {
        if let Some(venue) = config.venues.iter().find(|v| v.credentials.is_none()) {
            return Err(EngineFatalError::MissingCredentials(venue.id.clone()));
        }
    }

    if wiring.evaluation == Evaluation::Vectorized {
        if let Some(sub) = config
            .subscriptions
            .iter()
            .find(|s| s.resolution != ResolutionKind::Bar)
        {
            return Err(EngineFatalError::VectorizedNeedsBars(sub.resolution));
        }
    }

    let sched = &config.scheduler;
    if sched.channel_capacity == 0 {
        return Err(EngineFatalError::InvalidSetting("channel_capacity must be > 0".into()));
    }
    if sched.poll_interval_ms == 0 {
        return Err(EngineFatalError::InvalidSetting("poll_interval_ms must be > 0".into()));
    }
    let participation = config.fill_policy.liquidity.bar_participation;
    if !(0.0..=1.0).contains(&participation) {
        return Err(EngineFatalError::InvalidSetting(format!(
            "bar_participation must be within 0..=1, got {participation}"
        )));
    }
    if config.vectorized.unit_quantity <= 0.0 || !config.vectorized.unit_quantity.is_finite() {
        return Err(EngineFatalError::InvalidSetting("unit_quantity must be positive".into()));
    }

    Ok(wiring)
}
