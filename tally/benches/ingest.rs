//! Microbenchmarks for the ingestion hot path.
//!
//! Measures per-sample latency for each metric family against a warm engine,
//! where every name already has its aggregator.
//!
//! Run with: `cargo bench -p tally -- ingest`

#![allow(missing_docs, clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use std::ops::ControlFlow;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tally::{AggregationEngine, EngineConfig, HistogramConfig, MetricKind, PrefixResolver};

fn names(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}.{i}")).collect()
}

fn histogram_resolver() -> PrefixResolver {
    let config = EngineConfig {
        histograms: vec![
            HistogramConfig::linear("timers.", 0.0, 1000.0, 10.0).unwrap(),
            HistogramConfig::new("timers.api.", vec![1.0, 5.0, 25.0, 100.0, 500.0]).unwrap(),
        ],
        ..EngineConfig::default()
    };
    config.build_resolver().unwrap()
}

fn bench_counter(c: &mut Criterion) {
    let mut engine = AggregationEngine::with_defaults();
    engine.add_sample(MetricKind::Counter, "requests", 1.0, 1.0).unwrap();

    c.bench_function("ingest/counter", |b| {
        b.iter(|| {
            engine
                .add_sample(MetricKind::Counter, black_box("requests"), black_box(1.0), 1.0)
                .unwrap();
        });
    });
}

fn bench_timer(c: &mut Criterion) {
    let resolver = histogram_resolver();
    let mut group = c.benchmark_group("ingest/timer");

    for (label, name) in [("plain", "latency"), ("histogram", "timers.api.get")] {
        let mut engine = AggregationEngine::new(&EngineConfig::default(), &resolver).unwrap();
        let mut value = 0u32;

        group.bench_function(label, |b| {
            b.iter(|| {
                value = value.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let sample = f64::from(value % 1000);
                engine
                    .add_sample(MetricKind::Timer, black_box(name), black_box(sample), 1.0)
                    .unwrap();
            });
        });
    }
    group.finish();
}

fn bench_set(c: &mut Criterion) {
    let members = names("user", 10_000);
    let mut engine = AggregationEngine::with_defaults();
    let mut i = 0;

    c.bench_function("ingest/set", |b| {
        b.iter(|| {
            i = (i + 1) % members.len();
            engine.set_update(black_box("visitors"), black_box(&members[i])).unwrap();
        });
    });
}

fn bench_gauge(c: &mut Criterion) {
    let mut engine = AggregationEngine::with_defaults();
    c.bench_function("ingest/gauge_delta", |b| {
        b.iter(|| {
            engine
                .set_gauge(black_box("queue.depth"), black_box(1.0), true, 0)
                .unwrap();
        });
    });
}

fn bench_many_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest/name_count");

    for count in [10, 1_000, 100_000] {
        let keys = names("requests", count);
        let mut engine = AggregationEngine::with_defaults();
        for key in &keys {
            engine.add_sample(MetricKind::Counter, key, 1.0, 1.0).unwrap();
        }
        let mut i = 0;

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                i = (i + 7919) % keys.len();
                engine
                    .add_sample(MetricKind::Counter, black_box(&keys[i]), 1.0, 1.0)
                    .unwrap();
            });
        });
    }
    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let resolver = histogram_resolver();
    let mut engine = AggregationEngine::new(&EngineConfig::default(), &resolver).unwrap();
    for (i, name) in names("timers.api", 1_000).iter().enumerate() {
        for v in 0..100 {
            engine
                .add_sample(MetricKind::Timer, name, f64::from(v) + i as f64, 1.0)
                .unwrap();
        }
    }

    c.bench_function("iterate/1000_timers", |b| {
        b.iter(|| {
            let mut total = 0.0;
            let _ = engine.iterate(|metric| {
                if let tally::MetricValue::Timer(timer) = metric.value {
                    total += timer.quantiles().map(|(_, v)| v).sum::<f64>();
                }
                ControlFlow::Continue(())
            });
            black_box(total)
        });
    });
}

criterion_group!(
    benches,
    bench_counter,
    bench_timer,
    bench_set,
    bench_gauge,
    bench_many_names,
    bench_iterate
);
criterion_main!(benches);
