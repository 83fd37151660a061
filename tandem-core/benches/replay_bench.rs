//! Criterion benchmarks for the replay hot path.
//!
//! Benchmarks:
//! 1. Encode + filter + k-way merge of several tick sources
//! 2. Tick → bar resampling
//! 3. Full event-driven backtest of a direction-following strategy

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use tandem_core::config::{RunConfig, VenueConfig};
use tandem_core::data::{
    bars_from_ticks, replay, HistoricalSource, RawRecord, SourceSpec, VecSource,
};
use tandem_core::domain::{BarPeriod, Event, OrderRequest, ResolutionKind, Side, Trade, VenueId};
use tandem_core::mode::{EngineBuilder, Mode};
use tandem_core::runtime::{Strategy, StrategyContext, StrategyError, Subscription};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_ticks(symbol: &str, n: usize) -> Vec<RawRecord> {
    (0..n)
        .map(|i| {
            let price = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            RawRecord::tick(
                Utc.timestamp_opt(i as i64, 0).unwrap(),
                "sim",
                symbol,
                price,
                1.0 + (i % 7) as f64,
            )
        })
        .collect()
}

fn sources(count: usize, n: usize) -> Vec<SourceSpec> {
    (0..count)
        .map(|k| {
            let src: Arc<dyn HistoricalSource> =
                Arc::new(VecSource::new(format!("s{k}"), make_ticks(&format!("S{k}"), n)));
            SourceSpec::new(src)
        })
        .collect()
}

struct Flipper {
    last: Option<f64>,
}

impl Strategy for Flipper {
    fn name(&self) -> &str {
        "flipper"
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::new("sim", "S0", ResolutionKind::Tick)]
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext, trade: &Trade) -> Result<(), StrategyError> {
        if let Some(last) = self.last.replace(trade.price) {
            let side = if trade.price >= last { Side::Buy } else { Side::Sell };
            ctx.submit(OrderRequest::market(VenueId::from("sim"), "S0", side, 1.0));
        }
        Ok(())
    }
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for count in [1usize, 4, 16] {
        let specs = sources(count, 10_000 / count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &specs, |b, specs| {
            b.iter(|| {
                let opened = replay(specs).unwrap();
                black_box(opened.events.count())
            })
        });
    }
    group.finish();
}

fn bench_resample(c: &mut Criterion) {
    let specs = sources(1, 20_000);
    let ticks: Vec<Event> = replay(&specs).unwrap().events.collect();
    let period = BarPeriod::from_secs(60).unwrap();
    c.bench_function("resample_20k_ticks", |b| {
        b.iter(|| black_box(bars_from_ticks(&ticks, period).len()))
    });
}

fn bench_backtest(c: &mut Criterion) {
    let records = make_ticks("S0", 10_000);
    let config = RunConfig::new("bench", Mode::EventDrivenBacktest)
        .with_venue(VenueConfig::new("sim"))
        .with_subscription(Subscription::new("sim", "S0", ResolutionKind::Tick));
    c.bench_function("backtest_10k_ticks", |b| {
        b.iter(|| {
            let src: Arc<dyn HistoricalSource> = Arc::new(VecSource::new("s0", records.clone()));
            let outcome = EngineBuilder::new(config.clone())
                .strategy(Flipper { last: None })
                .source(src)
                .build()
                .unwrap()
                .run_blocking()
                .unwrap();
            black_box(outcome.fills().len())
        })
    });
}

criterion_group!(benches, bench_merge, bench_resample, bench_backtest);
criterion_main!(benches);
