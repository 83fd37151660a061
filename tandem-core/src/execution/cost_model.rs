//! Cost model: slippage and commission per venue.
//!
//! Slippage is directional: buyers pay more, sellers receive less. It applies
//! to aggressive (market) fills only; limit fills are passive.
//! Commission is symmetric per fill in basis points of notional.

use serde::{Deserialize, Serialize};

use crate::domain::Side;

const BPS: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub slippage_bps: f64,
    pub commission_bps: f64,
}

impl CostModel {
    pub fn new(slippage_bps: f64, commission_bps: f64) -> Self {
        Self {
            slippage_bps,
            commission_bps,
        }
    }

    pub fn is_free(&self) -> bool {
        self.slippage_bps == 0.0 && self.commission_bps == 0.0
    }

    /// Price an aggressive order actually gets at `quote`.
    pub fn aggressive_price(&self, quote: f64, side: Side) -> f64 {
        quote * (1.0 + side.sign() * self.slippage_bps / BPS)
    }

    pub fn commission(&self, price: f64, quantity: f64) -> f64 {
        price * quantity * self.commission_bps / BPS
    }
}
