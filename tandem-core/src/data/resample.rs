//! Tick → bar resolution conversion.
//!
//! Windows are half-open `[start, end)` and aligned to the Unix epoch, so a
//! tick exactly on a boundary belongs to the later bar only. Bars are emitted
//! as events stamped with the window end.

use std::collections::{BTreeMap, VecDeque};

use crate::domain::{Bar, BarPeriod, Event, MarketData, Symbol, Timestamp, Trade, VenueId};

#[derive(Debug, Clone)]
struct BarBuilder {
    bar: Bar,
}

impl BarBuilder {
    fn open(start: Timestamp, end: Timestamp, trade: &Trade) -> Self {
        Self {
            bar: Bar {
                start,
                end,
                open: trade.price,
                high: trade.price,
                low: trade.price,
                close: trade.price,
                volume: trade.size,
            },
        }
    }

    fn push(&mut self, trade: &Trade) {
        self.bar.high = self.bar.high.max(trade.price);
        self.bar.low = self.bar.low.min(trade.price);
        self.bar.close = trade.price;
        self.bar.volume += trade.size;
    }

    fn into_event(self, venue: VenueId, symbol: Symbol) -> Event {
        Event::market(self.bar.end, venue, symbol, MarketData::Bar(self.bar))
    }
}

type Key = (VenueId, Symbol);

/// Pure fold: aggregate tick events into bar events, ordered by `(end, venue, symbol)`.
///
/// Non-tick events are ignored.
pub fn bars_from_ticks<'a>(
    ticks: impl IntoIterator<Item = &'a Event>,
    period: BarPeriod,
) -> Vec<Event> {
    let windows = ticks.into_iter().fold(
        BTreeMap::<(Timestamp, Key), BarBuilder>::new(),
        |mut acc, event| {
            if let Some(MarketData::Tick(trade)) = event.market_data() {
                let start = period.window_start(event.timestamp());
                let end = period.window_end(event.timestamp());
                let key = (end, (event.venue().clone(), event.symbol().to_string()));
                acc.entry(key)
                    .and_modify(|b| b.push(trade))
                    .or_insert_with(|| BarBuilder::open(start, end, trade));
            }
            acc
        },
    );
    windows
        .into_iter()
        .map(|((_, (venue, symbol)), builder)| builder.into_event(venue, symbol))
        .collect()
}

/// Lazy resampling adapter.
///
/// Tick events are absorbed into per-(venue, symbol) bars; a bar is emitted
/// as soon as an event at or past its window end arrives, or when the inner
/// stream is exhausted. Other events pass through unchanged, after any bars
/// that closed before them.
pub struct Resample<I> {
    inner: I,
    period: BarPeriod,
    open: BTreeMap<Key, BarBuilder>,
    pending: VecDeque<Event>,
    done: bool,
}

impl<I: Iterator<Item = Event>> Resample<I> {
    pub fn new(inner: I, period: BarPeriod) -> Self {
        Self {
            inner,
            period,
            open: BTreeMap::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn close_until(&mut self, ts: Option<Timestamp>) {
        let mut closed: Vec<(Timestamp, Key)> = self
            .open
            .iter()
            .filter(|(_, b)| ts.map_or(true, |t| b.bar.end <= t))
            .map(|(k, b)| (b.bar.end, k.clone()))
            .collect();
        closed.sort();
        for (_, key) in closed {
            if let Some(builder) = self.open.remove(&key) {
                let (venue, symbol) = key;
                self.pending.push_back(builder.into_event(venue, symbol));
            }
        }
    }
}

impl<I: Iterator<Item = Event>> Iterator for Resample<I> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.done {
                return None;
            }
            match self.inner.next() {
                Some(event) => {
                    self.close_until(Some(event.timestamp()));
                    if let Some(MarketData::Tick(trade)) = event.market_data() {
                        let key = (event.venue().clone(), event.symbol().to_string());
                        let start = self.period.window_start(event.timestamp());
                        let end = self.period.window_end(event.timestamp());
                        self.open
                            .entry(key)
                            .and_modify(|b| b.push(trade))
                            .or_insert_with(|| BarBuilder::open(start, end, trade));
                    } else {
                        self.pending.push_back(event);
                    }
                }
                None => {
                    self.done = true;
                    self.close_until(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tick(secs: i64, price: f64, size: f64) -> Event {
        Event::market(
            Utc.timestamp_opt(secs, 0).unwrap(),
            VenueId::from("sim"),
            "X",
            MarketData::Tick(Trade { price, size }),
        )
    }

    fn bar_of(event: &Event) -> Bar {
        match event.market_data() {
            Some(MarketData::Bar(bar)) => *bar,
            other => panic!("expected bar, got {other:?}"),
        }
    }

    #[test]
    fn boundary_tick_belongs_to_next_window() {
        let period = BarPeriod::parse("1m").unwrap();
        let ticks = vec![tick(0, 10.0, 1.0), tick(59, 12.0, 1.0), tick(60, 11.0, 2.0)];
        let bars = bars_from_ticks(&ticks, period);
        assert_eq!(bars.len(), 2);

        let first = bar_of(&bars[0]);
        assert_eq!(first.open, 10.0);
        assert_eq!(first.high, 12.0);
        assert_eq!(first.close, 12.0);
        assert_eq!(first.volume, 2.0);
        assert_eq!(bars[0].timestamp().timestamp(), 60);

        let second = bar_of(&bars[1]);
        assert_eq!(second.open, 11.0);
        assert_eq!(second.volume, 2.0);
        assert_eq!(bars[1].timestamp().timestamp(), 120);
    }

    #[test]
    fn lazy_resample_matches_fold() {
        let period = BarPeriod::parse("10s").unwrap();
        let ticks: Vec<Event> = (0..50)
            .map(|i| tick(i * 3, 100.0 + (i % 7) as f64, 1.0))
            .collect();
        let folded = bars_from_ticks(&ticks, period);
        let lazy: Vec<Event> = Resample::new(ticks.into_iter(), period).collect();
        assert_eq!(folded, lazy);
    }

    #[test]
    fn bar_is_emitted_before_the_event_that_closes_it() {
        let period = BarPeriod::parse("1m").unwrap();
        let ticks = vec![tick(10, 10.0, 1.0), tick(70, 11.0, 1.0)];
        let mut it = Resample::new(ticks.into_iter(), period);
        let first = it.next().unwrap();
        assert_eq!(first.timestamp().timestamp(), 60);
        let second = it.next().unwrap();
        assert_eq!(second.timestamp().timestamp(), 120);
        assert!(it.next().is_none());
    }

    #[test]
    fn volume_is_never_double_counted() {
        let period = BarPeriod::parse("5s").unwrap();
        let ticks: Vec<Event> = (0..100).map(|i| tick(i, 50.0, 1.5)).collect();
        let total: f64 = bars_from_ticks(&ticks, period)
            .iter()
            .map(|e| bar_of(e).volume)
            .sum();
        assert!((total - 150.0).abs() < 1e-9);
    }
}
