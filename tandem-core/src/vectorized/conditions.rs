//! Buy/sell boolean columns → signal series.
//!
//! A buy condition yields `+1`, a sell condition `-1`, neither yields no
//! signal. With `first_only`, only the first signal of each run of equal
//! signals is kept (gaps without a signal do not break a run).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("either a buy or a sell condition is required")]
    Missing,

    #[error("buy and sell conditions differ in length ({buy} vs {sell})")]
    LengthMismatch { buy: usize, sell: usize },

    #[error("buy and sell conditions overlap at index {0}; they must be mutually exclusive")]
    Overlap(usize),
}

pub fn signals_from_conditions(
    buy: Option<&[bool]>,
    sell: Option<&[bool]>,
    first_only: bool,
) -> Result<Vec<Option<f64>>, ConditionError> {
    let len = match (buy, sell) {
        (None, None) => return Err(ConditionError::Missing),
        (Some(b), Some(s)) if b.len() != s.len() => {
            return Err(ConditionError::LengthMismatch {
                buy: b.len(),
                sell: s.len(),
            })
        }
        (Some(b), _) => b.len(),
        (None, Some(s)) => s.len(),
    };

    let at = |col: Option<&[bool]>, i: usize| col.is_some_and(|c| c[i]);
    let mut signals = Vec::with_capacity(len);
    let mut last: Option<f64> = None;
    for i in 0..len {
        let signal = match (at(buy, i), at(sell, i)) {
            (true, true) => return Err(ConditionError::Overlap(i)),
            (true, false) => Some(1.0),
            (false, true) => Some(-1.0),
            (false, false) => None,
        };
        let keep = match signal {
            Some(s) if first_only => {
                let changed = last != Some(s);
                last = Some(s);
                changed
            }
            _ => true,
        };
        signals.push(if keep { signal } else { None });
    }
    Ok(signals)
}
