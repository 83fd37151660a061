//! ML signal collaborator and look-ahead-free feature helpers.
//!
//! Models are black boxes called synchronously from handlers. Feature
//! helpers only ever look at values up to and including the current one.

use std::collections::VecDeque;

/// `predict(features) -> signal`. Expected to be fast; the handler deadline covers it.
pub trait SignalModel: Send + Sync {
    fn predict(&self, features: &[f64]) -> f64;
}

impl<F> SignalModel for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn predict(&self, features: &[f64]) -> f64 {
        self(features)
    }
}

/// Z-score of each value against the trailing `window` values ending at it.
///
/// `None` until the window is full, and wherever the window has zero spread.
pub fn rolling_zscore(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut win = FeatureWindow::new(window);
    for &v in values {
        win.push(v);
        out.push(win.zscore());
    }
    out
}

/// Fixed-capacity trailing window of a feature.
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl FeatureWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            values: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let var = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / self.values.len() as f64;
        Some(var.sqrt())
    }

    /// Z-score of the newest value; `None` until full or when the spread is zero.
    pub fn zscore(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        let sd = self.std_dev()?;
        if sd <= f64::EPSILON {
            return None;
        }
        Some((self.last()? - self.mean()?) / sd)
    }

    /// Oldest to newest.
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}
