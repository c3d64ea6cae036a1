//! Threat Classifier
//!
//! Only the classify logic. Input: reconstruction error and the effective
//! threshold. Output: `ThreatAssessment`.

use super::rules::{BandThresholds, NORMAL_CONFIDENCE_FLOOR};
use super::types::{ThreatAssessment, ThreatLevel};

// ============================================================================
// MAIN CLASSIFICATION FUNCTION
// ============================================================================

/// Classify with the default bands
pub fn classify(error: f32, threshold: f32) -> ThreatAssessment {
    classify_with_bands(error, threshold, &BandThresholds::default())
}

/// Classify with custom bands
///
/// `threshold` must be positive; a non-positive threshold yields a normal
/// verdict with zero confidence. A non-finite error is saturated first, so it
/// always bands as CRITICAL.
pub fn classify_with_bands(error: f32, threshold: f32, bands: &BandThresholds) -> ThreatAssessment {
    if !(threshold > 0.0) || !threshold.is_finite() {
        log::warn!("Cannot classify error={} against threshold={}", error, threshold);
        return ThreatAssessment::default();
    }

    let error = saturate_error(error);
    let ratio = (error / threshold).min(f32::MAX);
    let is_anomaly = error > threshold;
    let threat_level = if is_anomaly {
        level_for_ratio(ratio, bands)
    } else {
        ThreatLevel::Normal
    };

    ThreatAssessment {
        is_anomaly,
        anomaly_score: ratio,
        confidence: confidence(error, threshold, is_anomaly),
        threat_level,
    }
}

/// Map a non-finite reconstruction error to `f32::MAX`.
///
/// Inputs are sanitized before reconstruction, so a NaN or infinite error
/// means the network overflowed on an extreme reading.
pub fn saturate_error(error: f32) -> f32 {
    if error.is_finite() {
        error
    } else {
        f32::MAX
    }
}

/// Band an anomalous ratio
pub fn level_for_ratio(ratio: f32, bands: &BandThresholds) -> ThreatLevel {
    if ratio > bands.critical_above {
        ThreatLevel::Critical
    } else if ratio > bands.high_above {
        ThreatLevel::High
    } else if ratio > bands.medium_above {
        ThreatLevel::Medium
    } else {
        ThreatLevel::Low
    }
}

/// Anomalous: how far past the threshold, capped at 1.
/// Normal: how far below it, floored at 0.1.
pub fn confidence(error: f32, threshold: f32, is_anomaly: bool) -> f32 {
    let c = if is_anomaly {
        ((error - threshold) / threshold).min(1.0)
    } else {
        (1.0 - error / threshold).max(NORMAL_CONFIDENCE_FLOOR)
    };
    c.clamp(0.0, 1.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn level_at(ratio: f32) -> ThreatLevel {
        classify(ratio, 1.0).threat_level
    }

    #[test]
    fn test_normal_below_threshold() {
        let a = classify(0.5, 1.0);
        assert!(!a.is_anomaly);
        assert_eq!(a.threat_level, ThreatLevel::Normal);
        assert!((a.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_equal_to_threshold_is_normal() {
        let a = classify(1.0, 1.0);
        assert!(!a.is_anomaly);
        assert_eq!(a.threat_level, ThreatLevel::Normal);
        assert_eq!(a.confidence, NORMAL_CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(level_at(1.5), ThreatLevel::Low);
        assert_eq!(level_at(2.0), ThreatLevel::Low);
        assert_eq!(level_at(2.0001), ThreatLevel::Medium);
        assert_eq!(level_at(5.0), ThreatLevel::Medium);
        assert_eq!(level_at(5.0001), ThreatLevel::High);
        assert_eq!(level_at(10.0), ThreatLevel::High);
        assert_eq!(level_at(10.0001), ThreatLevel::Critical);
    }

    #[test]
    fn test_non_finite_error_is_critical() {
        for error in [f32::INFINITY, f32::NAN, f32::MAX] {
            let a = classify(error, 0.25);
            assert!(a.is_anomaly, "{error}");
            assert_eq!(a.threat_level, ThreatLevel::Critical);
            assert!(a.anomaly_score.is_finite());
            assert_eq!(a.confidence, 1.0);
        }
        assert_eq!(saturate_error(f32::NEG_INFINITY), f32::MAX);
        assert_eq!(saturate_error(0.5), 0.5);
    }

    #[test]
    fn test_invalid_threshold_is_not_classified() {
        let a = classify(5.0, 0.0);
        assert!(!a.is_anomaly);
        assert_eq!(a.confidence, 0.0);
    }

    #[test]
    fn test_anomaly_confidence_capped() {
        let a = classify(1.5, 1.0);
        assert!((a.confidence - 0.5).abs() < 1e-6);
        let b = classify(50.0, 1.0);
        assert_eq!(b.confidence, 1.0);
    }

    #[test]
    fn test_normal_confidence_floor() {
        let a = classify(0.95, 1.0);
        assert_eq!(a.confidence, NORMAL_CONFIDENCE_FLOOR);
        let b = classify(0.0, 1.0);
        assert_eq!(b.confidence, 1.0);
    }

    #[test]
    fn test_invalid_threshold() {
        let a = classify(1.0, 0.0);
        assert!(!a.is_anomaly);
        assert_eq!(a.confidence, 0.0);
    }

    #[test]
    fn test_custom_bands() {
        let bands = BandThresholds { critical_above: 4.0, high_above: 3.0, medium_above: 1.5 };
        assert!(bands.is_valid());
        assert_eq!(classify_with_bands(3.5, 1.0, &bands).threat_level, ThreatLevel::High);
        assert!(!BandThresholds { critical_above: 1.0, high_above: 3.0, medium_above: 1.5 }.is_valid());
    }

    #[test]
    fn test_threat_level_serde() {
        let json = serde_json::to_string(&ThreatLevel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let back: ThreatLevel = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(back, ThreatLevel::Medium);
        assert_eq!("high".parse::<ThreatLevel>().unwrap(), ThreatLevel::High);
    }
}
