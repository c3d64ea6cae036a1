//! End-to-end detection scenarios on a trained model

mod common;

use common::*;
use gridguard_core::logic::config::{EngineConfig, HistoryMode, ScoreMode};
use gridguard_core::logic::features::{CategoryPolicy, CriticalityTier};
use gridguard_core::logic::model::{DecisionEngine, ModelStatus, RuleOverridePolicy, Scorer};
use gridguard_core::{DetectorError, ThreatLevel};

#[test]
fn test_zero_deviation_round_trip_is_normal() {
    let engine = fixture().engine(EngineConfig::default());
    let result = engine.score(&request(0, 345_000.0));

    assert!(result.error.is_none(), "{:?}", result.error);
    assert!(result.history_approximated);
    assert!(!result.is_anomaly, "error {} threshold {}", result.reconstruction_error, result.threshold);
    assert_eq!(result.threat_level, ThreatLevel::Normal);
    assert!(result.reconstruction_error < result.threshold);
    assert!(result.confidence >= 0.1 && result.confidence <= 1.0);
}

#[test]
fn test_voltage_sag_exceeds_threshold() {
    let engine = fixture().engine(EngineConfig::default());
    let result = engine.score(&request(0, 0.6 * 345_000.0));

    assert!(result.error.is_none());
    assert!(result.is_anomaly);
    assert!(result.anomaly_score > 1.0);
    assert!(result.threat_level >= ThreatLevel::Medium);
    // critical device: 0.8 x base
    assert!((result.threshold - 0.8 * fixture().base_threshold()).abs() < 1e-6);

    let stats = engine.statistics();
    assert_eq!(stats.anomalies_detected, 1);
    assert_eq!(stats.current_threat_level, result.threat_level);
    assert!(stats.last_detection_time.is_some());
}

#[test]
fn test_scoring_is_deterministic() {
    let engine = fixture().engine(EngineConfig::default());
    let req = request(2, 121.3);
    let a = engine.score(&req);
    let b = engine.score(&req);
    assert_eq!(a.reconstruction_error, b.reconstruction_error);
    assert_eq!(a.anomaly_score, b.anomaly_score);
    assert_eq!(a.is_anomaly, b.is_anomaly);
    assert_eq!(a.threat_level, b.threat_level);
    assert_eq!(a.confidence, b.confidence);
}

#[test]
fn test_normal_floor_on_calibration_set() {
    let outcome = &fixture().outcome;
    let base = outcome.calibration.base_threshold;
    let errors = &outcome.validation_errors;
    assert_eq!(errors.len(), outcome.report.validation_samples);

    let flagged = errors.iter().filter(|e| **e > base).count();
    let rate = flagged as f64 / errors.len() as f64;
    assert!((0.03..=0.07).contains(&rate), "rate {rate}");
}

#[test]
fn test_error_grows_with_single_feature_deviation() {
    let fx = fixture();
    let engine = fx.engine(EngineConfig::default());

    let dataset = normal_dataset(3);
    let encoded = dataset.encode(&fx.tables, CategoryPolicy::Strict).unwrap();
    let base = encoded.vectors[ROWS_PER_STREAM * 2 + 1].clone();

    let params = fx.outcome.standardizer.params().unwrap();
    for feature in ["z_score", "rate_of_change", "sensor_value"] {
        let index = gridguard_core::logic::features::layout::feature_index(feature).unwrap();
        let sigma = params.std[index];
        let start = base.values[index];

        let mut previous = 0.0f32;
        for k in [25.0f32, 50.0, 100.0, 200.0, 400.0, 800.0] {
            let mut v = base.clone();
            v.values[index] = start + k * sigma;
            let err = engine.score_vector(&v, CriticalityTier::High).unwrap().reconstruction_error;
            assert!(err >= previous, "{feature}: error fell from {previous} to {err} at {k} sigma");
            previous = err;
        }
    }
}

#[test]
fn test_unknown_device_strict_vs_lenient() {
    let fx = fixture();
    let mut req = request(1, 60.0);
    req.device_id = "SUB_999".to_string();

    let strict = fx.engine(EngineConfig {
        category_policy: CategoryPolicy::Strict,
        ..Default::default()
    });
    match strict.try_score(&req) {
        Err(DetectorError::UnknownCategory { field, value }) => {
            assert_eq!(field, "device_id");
            assert_eq!(value, "SUB_999");
        }
        other => panic!("expected UnknownCategory, got {other:?}"),
    }
    // recovered into the result, never counted
    let recovered = strict.score(&req);
    assert!(recovered.is_error());
    assert!(!recovered.is_anomaly);
    assert_eq!(strict.statistics().total_samples, 0);

    let lenient = fx.engine(EngineConfig::default());
    let result = lenient.try_score(&req).unwrap();
    assert!(result.error.is_none());
    assert_eq!(lenient.statistics().total_samples, 1);
}

#[test]
fn test_not_ready_result() {
    let engine = DecisionEngine::new(EngineConfig::default());
    let result = engine.score(&request(0, 345_000.0));
    assert!(!result.is_anomaly);
    assert_eq!(result.reconstruction_error, 0.0);
    assert!(result.error.unwrap().contains("not ready"));
    assert_eq!(engine.statistics().model_status, ModelStatus::NotLoaded);
}

#[test]
fn test_tracked_history_feeds_context() {
    let engine = fixture().engine(EngineConfig {
        history_mode: HistoryMode::Tracked,
        ..Default::default()
    });
    let first = engine.score(&request(3, 290.0));
    assert!(!first.history_approximated);
    let second = engine.score(&request(3, 291.0));
    assert!(!second.history_approximated);
    assert_eq!(engine.statistics().total_samples, 2);
}

#[test]
fn test_rule_override_forces_critical() {
    let scorer = RuleOverridePolicy::new(fixture().engine(EngineConfig::default()));

    let forced = scorer.score(&request(0, 345_000.0));
    assert!(forced.is_anomaly);
    assert_eq!(forced.threat_level, ThreatLevel::Critical);
    assert_eq!(forced.policy, "rule_override");

    // counters follow the returned verdicts, not the wrapped engine's
    let stats = scorer.statistics();
    assert_eq!(stats.anomalies_detected, 1);
    assert_eq!(stats.current_threat_level, ThreatLevel::Critical);
    assert!((stats.anomaly_rate - 100.0).abs() < 1e-9);
    assert_eq!(stats.last_detection_time, Some(forced.timestamp));
    assert_eq!(scorer.inner().statistics().anomalies_detected, 0);

    // high-criticality stream is delegated untouched
    let delegated = scorer.score(&request(1, 60.0));
    assert_eq!(delegated.policy, "fixed");

    let stats = scorer.statistics();
    assert_eq!(stats.total_samples, 2);
    assert_eq!(stats.anomalies_detected, 1 + delegated.is_anomaly as u64);
    assert_eq!(stats.current_threat_level, delegated.threat_level);
}

#[test]
fn test_raw_score_mode_reports_error() {
    let engine = fixture().engine(EngineConfig {
        score_mode: ScoreMode::Raw,
        ..Default::default()
    });
    let result = engine.score(&request(0, 0.6 * 345_000.0));
    assert_eq!(result.anomaly_score, result.reconstruction_error);
    // banding still follows the ratio
    assert!(result.threat_level >= ThreatLevel::Medium);
}

#[test]
fn test_extreme_readings_are_critical() {
    let engine = fixture().engine(EngineConfig::default());
    for value in [1e20, 1e30, 1e40, -1e40] {
        let result = engine.score(&request(0, value));
        assert!(result.error.is_none(), "{value}: {:?}", result.error);
        assert_eq!(result.sanitized_features, 0, "{value}");
        assert!(result.is_anomaly, "{value}: error {}", result.reconstruction_error);
        assert_eq!(result.threat_level, ThreatLevel::Critical, "{value}");
        assert!(result.reconstruction_error.is_finite());
        assert!(result.anomaly_score.is_finite());
        assert_eq!(result.confidence, 1.0);
    }

    let stats = engine.statistics();
    assert_eq!(stats.total_samples, 4);
    assert_eq!(stats.anomalies_detected, 4);
    assert_eq!(stats.current_threat_level, ThreatLevel::Critical);
}

#[test]
fn test_rejected_request_leaves_history_untouched() {
    let tracked_strict = || EngineConfig {
        history_mode: HistoryMode::Tracked,
        category_policy: CategoryPolicy::Strict,
        ..Default::default()
    };
    let clean = fixture().engine(tracked_strict());
    let noisy = fixture().engine(tracked_strict());

    // same stream key, unseen voltage level
    let mut rejected = request(3, 900.0);
    rejected.voltage_level = "999kV".to_string();
    for _ in 0..20 {
        assert!(noisy.score(&rejected).is_error());
    }
    // unseen devices never allocate a stream
    for i in 0..50 {
        let mut ghost = request(1, 60.0);
        ghost.device_id = format!("GHOST_{i}");
        assert!(noisy.score(&ghost).is_error());
    }
    let stats = noisy.statistics();
    assert_eq!(stats.total_samples, 0);
    assert_eq!(stats.tracked_streams, 0);

    for value in [290.0, 291.0, 289.5] {
        let a = clean.score(&request(3, value));
        let b = noisy.score(&request(3, value));
        assert!(a.error.is_none() && b.error.is_none());
        assert_eq!(a.reconstruction_error, b.reconstruction_error);
    }
    assert_eq!(noisy.statistics().tracked_streams, 1);
}
