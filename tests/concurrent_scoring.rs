//! Shared engine under parallel scoring

mod common;

use common::*;
use gridguard_core::logic::config::EngineConfig;
use gridguard_core::logic::model::threshold::{ThresholdConfig, ThresholdPolicyKind};
use gridguard_core::logic::model::Scorer;

const THREADS: usize = 4;
const PER_THREAD: usize = 250;

fn run(config: EngineConfig) {
    let engine = fixture().engine(config);

    let flagged: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let engine = &engine;
                scope.spawn(move || {
                    let mut flagged = 0;
                    for i in 0..PER_THREAD {
                        let stream = (t + i) % STREAMS.len();
                        let nominal = STREAMS[stream].4;
                        // every 10th reading is a 40% sag
                        let value = if i % 10 == 0 { nominal * 0.6 } else { nominal };
                        let result = engine.score(&request(stream, value));
                        assert!(result.error.is_none());
                        if result.is_anomaly {
                            flagged += 1;
                        }
                    }
                    flagged
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    let stats = engine.statistics();
    assert_eq!(stats.total_samples, (THREADS * PER_THREAD) as u64);
    assert_eq!(stats.anomalies_detected, flagged as u64);
    let expected_rate = flagged as f64 / (THREADS * PER_THREAD) as f64 * 100.0;
    assert!((stats.anomaly_rate - expected_rate).abs() < 1e-9);
}

#[test]
fn test_fixed_policy_counters_consistent() {
    run(EngineConfig::default());
}

#[test]
fn test_adaptive_policy_counters_consistent() {
    run(EngineConfig {
        threshold: ThresholdConfig {
            policy: ThresholdPolicyKind::Adaptive,
            ..Default::default()
        },
        ..Default::default()
    });
}
