//! Vectorized vs event-driven parity checks.

use serde::{Deserialize, Serialize};

use super::SignalPoint;
use crate::domain::{Fill, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMismatch {
    pub index: usize,
    pub timestamp: Timestamp,
    pub vectorized: Option<f64>,
    pub event_driven: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalParity {
    pub compared: usize,
    /// `(vectorized, event_driven)` lengths when they differ.
    pub length_mismatch: Option<(usize, usize)>,
    pub mismatches: Vec<SignalMismatch>,
}

impl SignalParity {
    pub fn is_match(&self) -> bool {
        self.length_mismatch.is_none() && self.mismatches.is_empty()
    }
}

fn close(a: Option<f64>, b: Option<f64>, tolerance: f64) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => (x - y).abs() <= tolerance,
        _ => false,
    }
}

/// Compare two signal series point by point (timestamps must line up too).
pub fn compare_signals(
    vectorized: &[SignalPoint],
    event_driven: &[SignalPoint],
    tolerance: f64,
) -> SignalParity {
    let mut parity = SignalParity {
        compared: vectorized.len().min(event_driven.len()),
        ..Default::default()
    };
    if vectorized.len() != event_driven.len() {
        parity.length_mismatch = Some((vectorized.len(), event_driven.len()));
    }
    for (index, (v, e)) in vectorized.iter().zip(event_driven).enumerate() {
        if v.timestamp != e.timestamp || !close(v.signal, e.signal, tolerance) {
            parity.mismatches.push(SignalMismatch {
                index,
                timestamp: v.timestamp,
                vectorized: v.signal,
                event_driven: e.signal,
            });
        }
    }
    parity
}

/// Same executions in the same order: time, side, quantity and price.
pub fn fills_match(a: &[Fill], b: &[Fill], tolerance: f64) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.timestamp == y.timestamp
                && x.side == y.side
                && x.venue == y.venue
                && x.symbol == y.symbol
                && (x.quantity - y.quantity).abs() <= tolerance
                && (x.price - y.price).abs() <= tolerance
        })
}
