//! Serializable run configuration.
//!
//! This struct captures everything needed to wire and reproduce a run:
//! - Mode (the one-line switch between backtest, paper and live)
//! - Venues with credentials reference and fee schedule
//! - Subscriptions and historical data files
//! - Simulated-fill policy and scheduler settings
//!
//! Loading from TOML lives in the runner; the core only defines the shape.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{BarPeriod, RunId, VenueId};
use crate::engine::LiveSettings;
use crate::execution::{CostModel, FillPolicy};
use crate::mode::Mode;
use crate::runtime::{RuntimeConfig, Subscription};
use crate::vectorized::{TargetMode, VectorizedParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub mode: Mode,
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub data: Vec<DataFileConfig>,
    #[serde(default)]
    pub fill_policy: FillPolicy,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub vectorized: VectorizedConfig,
}

/// Kind of venue; informational for simulated runs, selects nothing by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    #[default]
    Exchange,
    Broker,
    Protocol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueConfig {
    pub id: VenueId,
    #[serde(default)]
    pub kind: VenueKind,
    /// Reference to credentials (env var name, vault path); never the secret itself.
    #[serde(default)]
    pub credentials: Option<String>,
    /// Venue fee schedule; falls back to `fill_policy.cost`.
    #[serde(default)]
    pub fees: Option<CostModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFileConfig {
    pub path: PathBuf,
    /// Convert this file's ticks to bars of the given period.
    #[serde(default)]
    pub resample: Option<BarPeriod>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub handler_deadline_ms: u64,
    pub gateway_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub drain_timeout_ms: u64,
    /// Cancel working live orders on stop. Off: real orders are never cancelled silently.
    pub cancel_on_stop: bool,
    pub fatal_on_error: bool,
    pub channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            handler_deadline_ms: 50,
            gateway_timeout_ms: 5_000,
            poll_interval_ms: 100,
            drain_timeout_ms: 10_000,
            cancel_on_stop: false,
            fatal_on_error: false,
            channel_capacity: 1_024,
        }
    }
}

impl SchedulerConfig {
    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            handler_deadline_ms: self.handler_deadline_ms,
            fatal_on_error: self.fatal_on_error,
        }
    }

    pub fn live(&self) -> LiveSettings {
        LiveSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            cancel_on_stop: self.cancel_on_stop,
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizedConfig {
    /// Position size for a signal of 1.0.
    pub unit_quantity: f64,
    pub target: TargetMode,
}

impl Default for VectorizedConfig {
    fn default() -> Self {
        Self {
            unit_quantity: 1.0,
            target: TargetMode::default(),
        }
    }
}

impl RunConfig {
    /// Minimal configuration: one mode, nothing else.
    pub fn new(name: impl Into<String>, mode: Mode) -> Self {
        Self {
            name: name.into(),
            mode,
            venues: Vec::new(),
            subscriptions: Vec::new(),
            data: Vec::new(),
            fill_policy: FillPolicy::default(),
            scheduler: SchedulerConfig::default(),
            vectorized: VectorizedConfig::default(),
        }
    }

    pub fn with_venue(mut self, venue: VenueConfig) -> Self {
        self.venues.push(venue);
        self
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    /// Deterministic identity: BLAKE3 over the canonical JSON of this configuration.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_vec(self).unwrap_or_default();
        RunId::from_bytes(&json)
    }

    pub fn venue(&self, id: &VenueId) -> Option<&VenueConfig> {
        self.venues.iter().find(|v| &v.id == id)
    }

    /// Fill policy for one venue: its fee schedule if configured, else the default costs.
    pub fn policy_for(&self, id: &VenueId) -> FillPolicy {
        let mut policy = self.fill_policy;
        if let Some(fees) = self.venue(id).and_then(|v| v.fees) {
            policy.cost = fees;
        }
        policy
    }

    pub fn vectorized_params(&self, venue: &VenueId) -> VectorizedParams {
        VectorizedParams {
            mode: self.vectorized.target,
            unit_quantity: self.vectorized.unit_quantity,
            policy: self.policy_for(venue),
        }
    }
}

impl VenueConfig {
    pub fn new(id: impl Into<VenueId>) -> Self {
        Self {
            id: id.into(),
            kind: VenueKind::default(),
            credentials: None,
            fees: None,
        }
    }

    pub fn with_credentials(mut self, reference: impl Into<String>) -> Self {
        self.credentials = Some(reference.into());
        self
    }

    pub fn with_fees(mut self, fees: CostModel) -> Self {
        self.fees = Some(fees);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResolutionKind;

    fn config(mode: Mode) -> RunConfig {
        RunConfig::new("demo", mode)
            .with_venue(VenueConfig::new("sim"))
            .with_subscription(Subscription::new("sim", "X", ResolutionKind::Tick))
    }

    #[test]
    fn run_id_is_deterministic() {
        assert_eq!(
            config(Mode::EventDrivenBacktest).run_id(),
            config(Mode::EventDrivenBacktest).run_id()
        );
    }

    #[test]
    fn run_id_changes_with_mode() {
        assert_ne!(
            config(Mode::EventDrivenBacktest).run_id(),
            config(Mode::Paper).run_id()
        );
    }

    #[test]
    fn venue_fees_override_default_costs() {
        let mut cfg = config(Mode::Paper);
        cfg.fill_policy.cost = CostModel::new(1.0, 1.0);
        cfg.venues[0].fees = Some(CostModel::new(0.0, 7.5));
        assert_eq!(cfg.policy_for(&VenueId::from("sim")).cost.commission_bps, 7.5);
        assert_eq!(cfg.policy_for(&VenueId::from("other")).cost.commission_bps, 1.0);
    }
}
