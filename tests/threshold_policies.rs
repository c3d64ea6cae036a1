//! Threat banding and adaptive threshold behaviour

use gridguard_core::logic::features::CriticalityTier;
use gridguard_core::logic::model::inference::DetectionState;
use gridguard_core::logic::model::threshold::{AdaptiveConfig, AdaptiveRateThreshold};
use gridguard_core::logic::model::ModelStatus;
use gridguard_core::logic::threat::{classify, BandThresholds};
use gridguard_core::ThreatLevel;

#[test]
fn test_band_boundaries() {
    let cases = [
        (0.5, ThreatLevel::Normal),
        (1.0, ThreatLevel::Normal),
        (1.5, ThreatLevel::Low),
        (2.0, ThreatLevel::Low),
        (2.0001, ThreatLevel::Medium),
        (5.0, ThreatLevel::Medium),
        (5.0001, ThreatLevel::High),
        (10.0, ThreatLevel::High),
        (10.0001, ThreatLevel::Critical),
        (250.0, ThreatLevel::Critical),
    ];
    for (error, expected) in cases {
        let verdict = classify(error, 1.0);
        assert_eq!(verdict.threat_level, expected, "ratio {error}");
        assert_eq!(verdict.is_anomaly, error > 1.0);
        assert!((0.0..=1.0).contains(&verdict.confidence));
    }
}

#[test]
fn test_confidence_formula() {
    // anomalous: min((e - t) / t, 1)
    assert!((classify(1.5, 1.0).confidence - 0.5).abs() < 1e-6);
    assert_eq!(classify(4.0, 1.0).confidence, 1.0);
    // normal: max(1 - e / t, 0.1)
    assert!((classify(0.25, 1.0).confidence - 0.75).abs() < 1e-6);
    assert!((classify(0.95, 1.0).confidence - 0.1).abs() < 1e-6);
}

/// 3 of every 10 errors exceed the base threshold of 1.0
const STREAM: [f32; 10] = [3.0, 0.5, 0.5, 2.0, 0.5, 0.5, 1.5, 0.5, 0.5, 0.5];

#[test]
fn test_adaptive_rises_until_rate_capped() {
    let policy = AdaptiveRateThreshold::new(1.0, AdaptiveConfig::default());
    let mut state = DetectionState::with_policy(Box::new(policy));
    let bands = BandThresholds::default();

    let mut previous = 1.0f32;
    let mut capped_at = None;
    for i in 0..500 {
        let decision = state.decide(STREAM[i % STREAM.len()], CriticalityTier::Normal, &bands).unwrap();
        assert!(decision.threshold >= previous, "threshold fell at decision {i}");
        previous = decision.threshold;

        let stats = state.statistics(ModelStatus::Ready).threshold.unwrap();
        if stats.window_len >= 20 && stats.window_anomaly_rate <= 0.15 {
            capped_at = Some(i);
            break;
        }
    }

    let capped_at = capped_at.expect("trailing rate never fell to 15%");
    assert!(capped_at < 100, "took {capped_at} decisions");
    assert!(previous > 1.0);
}

#[test]
fn test_adaptive_settles_inside_band() {
    let policy = AdaptiveRateThreshold::new(1.0, AdaptiveConfig::default());
    let mut state = DetectionState::with_policy(Box::new(policy));
    let bands = BandThresholds::default();

    for i in 0..5_000 {
        state.decide(STREAM[i % STREAM.len()], CriticalityTier::Normal, &bands).unwrap();
    }
    let stats = state.statistics(ModelStatus::Ready);
    let threshold = stats.threshold.unwrap();
    assert_eq!(threshold.policy, "adaptive");
    assert_eq!(threshold.window_len, 100);
    assert!(threshold.current >= 0.5 && threshold.current <= 20.0);
    assert_eq!(stats.total_samples, 5_000);
}
