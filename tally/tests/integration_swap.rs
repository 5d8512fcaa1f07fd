//! Integration tests for concurrent ingestion and epoch swaps.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};

use tally::{ActiveEngine, EngineConfig, MetricKind, MetricValue};

#[test]
fn test_no_sample_lost_across_swaps() {
    let config = EngineConfig::default();
    let resolver = config.build_resolver().unwrap();
    let active = ActiveEngine::new(&config, &resolver).unwrap();
    let done = AtomicBool::new(false);

    const WRITERS: u32 = 4;
    const SAMPLES: u32 = 5_000;

    let mut epochs = Vec::new();
    std::thread::scope(|scope| {
        let writers: Vec<_> = (0..WRITERS)
            .map(|writer| {
                let active = &active;
                scope.spawn(move || {
                    for i in 0..SAMPLES {
                        active
                            .add_sample(MetricKind::Counter, "events", 1.0, 1.0)
                            .unwrap();
                        active
                            .add_sample(MetricKind::Timer, &format!("w{writer}"), f64::from(i), 1.0)
                            .unwrap();
                    }
                })
            })
            .collect();

        let flusher = scope.spawn(|| {
            let mut detached = Vec::new();
            while !done.load(Ordering::Acquire) {
                detached.push(active.swap());
                std::thread::yield_now();
            }
            detached
        });

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        epochs = flusher.join().unwrap();
    });
    epochs.push(active.swap());

    let mut events = 0;
    let mut timer_samples = 0;
    for epoch in &epochs {
        let _ = epoch.iterate(|metric| {
            match metric.value {
                MetricValue::Counter(moments) => events += moments.count(),
                MetricValue::Timer(timer) => timer_samples += timer.moments().count(),
                _ => {}
            }
            ControlFlow::Continue(())
        });
    }

    let expected = u64::from(WRITERS * SAMPLES);
    assert_eq!(events, expected);
    assert_eq!(timer_samples, expected);
}

#[test]
fn test_detached_engine_is_independent() {
    let config = EngineConfig::default();
    let resolver = config.build_resolver().unwrap();
    let active = ActiveEngine::new(&config, &resolver).unwrap();

    active.set_gauge("g", 1.0, false, 0).unwrap();
    let epoch = active.swap();

    // Writes after the swap land in the fresh engine only.
    active.set_gauge("g", 5.0, true, 0).unwrap();
    assert_eq!(epoch.len(MetricKind::Gauge), 1);
    let (_, old) = epoch.registry().gauges().next().unwrap();
    assert_eq!(old.value(), 1.0);

    active.with(|engine| {
        let (_, fresh) = engine.registry().gauges().next().unwrap();
        // First write of the new epoch is absolute.
        assert_eq!(fresh.value(), 5.0);
    });

    // Detached engines can be exported from another thread.
    std::thread::scope(|scope| {
        scope
            .spawn(move || {
                assert_eq!(epoch.metric_count(), 1);
                epoch.destroy();
            })
            .join()
            .unwrap();
    });
}

#[test]
fn test_settings_survive_swaps() {
    let config = EngineConfig {
        set_max_exact: 3,
        ..EngineConfig::default()
    };
    let resolver = config.build_resolver().unwrap();
    let active = ActiveEngine::new(&config, &resolver).unwrap();

    for _ in 0..3 {
        let epoch = active.swap();
        assert_eq!(epoch.settings().set_max_exact(), 3);
        assert_eq!(active.settings(), epoch.settings());
    }
}
