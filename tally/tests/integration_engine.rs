//! Integration tests for engine ingestion and the iteration contract.
//!
//! A mixed sample stream is fed through the public API and every visited
//! aggregate is compared against reference values computed independently.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

use tally::{
    AggregationEngine, EngineConfig, HistogramConfig, MetricKind, MetricValue, SampleError,
    SetMode, TallyError,
};

/// Reference statistics for one counter.
#[derive(Default)]
struct Reference {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Reference {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        }
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

#[test]
fn test_round_trip_matches_reference() {
    let mut engine = AggregationEngine::with_defaults();
    let mut counters: HashMap<String, Reference> = HashMap::new();
    let mut timers: HashMap<String, Vec<f64>> = HashMap::new();
    let mut sets: HashMap<String, HashSet<String>> = HashMap::new();
    let mut gauges: HashMap<String, f64> = HashMap::new();

    for i in 0..5_000u32 {
        let value = f64::from((i * 37) % 101);
        let counter = format!("requests.{}", i % 7);
        engine.add_sample(MetricKind::Counter, &counter, value, 1.0).unwrap();
        counters.entry(counter).or_default().add(value);

        let timer = format!("latency.{}", i % 3);
        engine.add_sample(MetricKind::Timer, &timer, value, 1.0).unwrap();
        timers.entry(timer).or_default().push(value);

        let set = format!("users.{}", i % 2);
        let member = format!("user-{}", i % 40);
        engine.set_update(&set, &member).unwrap();
        sets.entry(set).or_default().insert(member);

        let gauge = format!("depth.{}", i % 5);
        engine.set_gauge(&gauge, value, false, 0).unwrap();
        gauges.insert(gauge, value);
    }
    engine.append_kv("build", 17.0);

    let mut visited: HashMap<(MetricKind, String), usize> = HashMap::new();
    let flow = engine.iterate(|metric| {
        *visited.entry((metric.kind(), metric.name.to_owned())).or_default() += 1;

        match metric.value {
            MetricValue::Counter(moments) => {
                let reference = &counters[metric.name];
                assert_eq!(moments.count(), reference.count);
                assert!((moments.sum() - reference.sum).abs() < 1e-6);
                assert_eq!(moments.min(), reference.min);
                assert_eq!(moments.max(), reference.max);
            }
            MetricValue::Timer(timer) => {
                let mut values = timers[metric.name].clone();
                values.sort_by(f64::total_cmp);
                let n = values.len() as f64;
                assert_eq!(timer.moments().count(), values.len() as u64);

                for (phi, estimate) in timer.quantiles() {
                    // Rank of the estimate must be within eps * n of phi * n.
                    let below = values.partition_point(|&v| v < estimate) as f64;
                    let through = values.partition_point(|&v| v <= estimate) as f64;
                    let target = phi * n;
                    let slack = timer.targets().eps() * n;
                    assert!(
                        below - slack <= target && target <= through + slack,
                        "{} p{phi}: {estimate} outside rank bound",
                        metric.name
                    );
                }
            }
            MetricValue::Set(set) => {
                assert_eq!(set.mode(), SetMode::Exact);
                assert_eq!(set.cardinality(), sets[metric.name].len() as u64);
            }
            MetricValue::Gauge(cell) => {
                assert_eq!(cell.value(), gauges[metric.name]);
            }
            MetricValue::KeyVal(value) => {
                assert_eq!(metric.name, "build");
                assert_eq!(value, 17.0);
            }
        }
        ControlFlow::Continue(())
    });

    assert_eq!(flow, ControlFlow::Continue(()));
    assert_eq!(visited.len(), 7 + 3 + 2 + 5 + 1);
    assert!(visited.values().all(|&n| n == 1));
    assert_eq!(engine.metric_count(), visited.len());
}

#[test]
fn test_type_conflict_leaves_counter_unchanged() {
    let mut engine = AggregationEngine::with_defaults();
    engine.add_sample(MetricKind::Counter, "foo", 3.0, 1.0).unwrap();

    let err = engine.add_sample(MetricKind::Timer, "foo", 9.0, 1.0).unwrap_err();
    match err {
        TallyError::Sample(SampleError::TypeConflict {
            name,
            existing,
            requested,
        }) => {
            assert_eq!(name, "foo");
            assert_eq!(existing, MetricKind::Counter);
            assert_eq!(requested, MetricKind::Timer);
        }
        other => panic!("expected type conflict, got {other}"),
    }
    assert!(engine.set_gauge("foo", 1.0, false, 0).unwrap_err().is_type_conflict());
    assert!(engine.set_update("foo", "x").unwrap_err().is_type_conflict());

    assert_eq!(engine.metric_count(), 1);
    let metric = engine.iter().next().unwrap();
    let MetricValue::Counter(moments) = metric.value else {
        panic!("expected counter");
    };
    assert_eq!(moments.count(), 1);
    assert_eq!(moments.sum(), 3.0);
}

#[test]
fn test_visitor_stops_across_families() {
    let mut engine = AggregationEngine::with_defaults();
    engine.add_sample(MetricKind::Counter, "c", 1.0, 1.0).unwrap();
    engine.add_sample(MetricKind::Timer, "t", 1.0, 1.0).unwrap();
    engine.set_update("s", "x").unwrap();
    engine.set_gauge("g", 1.0, false, 0).unwrap();
    engine.append_kv("kv", 1.0);

    let mut kinds = Vec::new();
    let flow = engine.iterate(|metric| {
        kinds.push(metric.kind());
        ControlFlow::Break(())
    });
    assert_eq!(flow, ControlFlow::Break(()));
    assert_eq!(kinds, [MetricKind::Counter]);
}

#[test]
fn test_prefix_histograms() {
    let config = EngineConfig {
        histograms: vec![
            HistogramConfig::new("app.", vec![100.0]).unwrap(),
            HistogramConfig::new("app.request.", vec![10.0, 20.0, 30.0]).unwrap(),
        ],
        ..EngineConfig::default()
    };
    let resolver = config.build_resolver().unwrap();
    let mut engine = AggregationEngine::new(&config, &resolver).unwrap();

    for value in [5.0, 15.0, 25.0, 35.0, 45.0] {
        engine.add_sample(MetricKind::Timer, "app.request.latency", value, 1.0).unwrap();
        engine.add_sample(MetricKind::Timer, "app.db.query", value, 0.5).unwrap();
        engine.add_sample(MetricKind::Timer, "other.metric", value, 1.0).unwrap();
    }

    let timers: HashMap<&str, _> = engine.registry().timers().collect();

    let request = timers["app.request.latency"].histogram().unwrap();
    assert_eq!(request.boundaries(), &[10.0, 20.0, 30.0]);
    assert_eq!(request.counts(), &[1.0, 1.0, 1.0, 2.0]);

    let db = timers["app.db.query"].histogram().unwrap();
    assert_eq!(db.prefix(), "app.");
    assert_eq!(db.counts(), &[10.0, 0.0]);

    assert!(timers["other.metric"].histogram().is_none());
}

#[test]
fn test_large_set_switches_to_estimate() {
    let mut engine = AggregationEngine::with_defaults();
    let max_exact = engine.settings().set_max_exact();
    for i in 0..10_000 {
        engine.set_update("visitors", &format!("visitor-{i}")).unwrap();
    }

    let (_, set) = engine.registry().sets().next().unwrap();
    assert!(max_exact < 10_000);
    assert_eq!(set.mode(), SetMode::Approximate);
    let error = (set.cardinality() as f64 - 10_000.0).abs() / 10_000.0;
    assert!(error < 4.0 * set.standard_error(), "relative error {error}");
}
