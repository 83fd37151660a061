//! Positions derived from the append-only fill ledger.
//!
//! A position is never mutated directly. `Ledger::append` is the only writer,
//! and `position.quantity` is always the signed sum of the ledger's fills for
//! that (venue, symbol), accumulated in fill order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Fill, Symbol, VenueId, QTY_EPSILON};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub venue: VenueId,
    pub symbol: Symbol,
    /// Signed: positive long, negative short.
    pub quantity: f64,
    /// Average entry price of the open quantity (0 when flat).
    pub avg_price: f64,
    pub realized_pnl: f64,
    pub commission: f64,
}

impl Position {
    pub fn flat(venue: VenueId, symbol: Symbol) -> Self {
        Self {
            venue,
            symbol,
            quantity: 0.0,
            avg_price: 0.0,
            realized_pnl: 0.0,
            commission: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.abs() <= QTY_EPSILON
    }

    pub fn market_value(&self, mark: f64) -> f64 {
        self.quantity * mark
    }

    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        (mark - self.avg_price) * self.quantity
    }

    fn apply(&mut self, fill: &Fill) {
        let signed = fill.signed_quantity();
        let prev = self.quantity;
        self.commission += fill.commission;

        if prev.abs() <= QTY_EPSILON || prev.signum() == signed.signum() {
            // Opening or adding
            let total = prev.abs() + signed.abs();
            self.avg_price = (self.avg_price * prev.abs() + fill.price * signed.abs()) / total;
        } else {
            // Reducing, closing or flipping
            let closing = signed.abs().min(prev.abs());
            self.realized_pnl += closing * (fill.price - self.avg_price) * prev.signum();
            if signed.abs() > prev.abs() + QTY_EPSILON {
                self.avg_price = fill.price;
            }
        }

        self.quantity = prev + signed;
        if self.is_flat() {
            self.avg_price = 0.0;
        }
    }
}

/// Append-only fill ledger with positions cached per (venue, symbol).
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    fills: Vec<Fill>,
    positions: BTreeMap<(VenueId, Symbol), Position>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, fill: Fill) {
        self.positions
            .entry((fill.venue.clone(), fill.symbol.clone()))
            .or_insert_with(|| Position::flat(fill.venue.clone(), fill.symbol.clone()))
            .apply(&fill);
        self.fills.push(fill);
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Position for (venue, symbol); flat if nothing has traded.
    pub fn position(&self, venue: &VenueId, symbol: &str) -> Position {
        self.positions
            .get(&(venue.clone(), symbol.to_string()))
            .cloned()
            .unwrap_or_else(|| Position::flat(venue.clone(), symbol.to_string()))
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Signed sum of fill quantities for (venue, symbol), recomputed from the fills.
    pub fn signed_sum(&self, venue: &VenueId, symbol: &str) -> f64 {
        self.fills
            .iter()
            .filter(|f| &f.venue == venue && f.symbol == symbol)
            .fold(0.0, |acc, f| acc + f.signed_quantity())
    }
}
