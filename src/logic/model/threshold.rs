//! Threshold Calibration & Deployment Policies
//!
//! The base threshold is a percentile of reconstruction errors on held-out
//! normal data. At serving time a `ThresholdPolicy` turns it into the
//! effective threshold for each decision:
//! - `FixedThreshold`: base scaled by a per-criticality multiplier
//! - `AdaptiveRateThreshold`: base nudged to keep the recent anomaly rate in a band

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ADAPTIVE_LOWER_FACTOR, ADAPTIVE_MIN_DECISIONS, ADAPTIVE_RAISE_FACTOR, ADAPTIVE_RATE_HIGH,
    ADAPTIVE_RATE_LOW, ADAPTIVE_WINDOW, DEFAULT_CALIBRATION_PERCENTILE,
};
use crate::error::{DetectorError, DetectorResult};
use crate::logic::features::CriticalityTier;

// ============================================================================
// CALIBRATION
// ============================================================================

/// Percentile with linear interpolation between closest ranks
///
/// `sorted` must be ascending and non-empty.
pub fn percentile_of_sorted(sorted: &[f32], percentile: f32) -> f32 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (percentile.clamp(0.0, 100.0) as f64 / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Base threshold from normal validation errors
pub fn calibrate(errors: &[f32], percentile: f32) -> DetectorResult<f32> {
    if errors.is_empty() {
        return Err(DetectorError::DegenerateInput(
            "no reconstruction errors to calibrate on".to_string(),
        ));
    }
    if let Some(bad) = errors.iter().find(|e| !e.is_finite()) {
        return Err(DetectorError::DegenerateInput(format!(
            "non-finite reconstruction error during calibration: {}",
            bad
        )));
    }
    if !(percentile > 0.0 && percentile < 100.0) {
        return Err(DetectorError::DegenerateInput(format!(
            "calibration percentile must be in (0, 100), got {}",
            percentile
        )));
    }

    let mut sorted = errors.to_vec();
    sorted.sort_by(f32::total_cmp);
    Ok(percentile_of_sorted(&sorted, percentile))
}

/// Persisted calibration (threshold.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub base_threshold: f32,
    pub percentile: f32,
    pub samples: usize,
    pub mean_error: f32,
    pub std_error: f32,
    pub min_error: f32,
    pub max_error: f32,
    pub p50_error: f32,
    pub p99_error: f32,
}

impl Calibration {
    pub fn from_errors(errors: &[f32], percentile: f32) -> DetectorResult<Self> {
        let base_threshold = calibrate(errors, percentile)?;

        let mut sorted = errors.to_vec();
        sorted.sort_by(f32::total_cmp);
        let n = sorted.len() as f64;
        let mean = sorted.iter().map(|e| *e as f64).sum::<f64>() / n;
        let var = sorted.iter().map(|e| (*e as f64 - mean).powi(2)).sum::<f64>() / n;

        Ok(Self {
            base_threshold,
            percentile,
            samples: sorted.len(),
            mean_error: mean as f32,
            std_error: var.sqrt() as f32,
            min_error: sorted[0],
            max_error: sorted[sorted.len() - 1],
            p50_error: percentile_of_sorted(&sorted, 50.0),
            p99_error: percentile_of_sorted(&sorted, 99.0),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.base_threshold.is_finite() && self.base_threshold > 0.0
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicyKind {
    #[default]
    Fixed,
    Adaptive,
}

/// Per-criticality multipliers for the fixed policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalityMultipliers {
    pub critical: f32,
    pub high: f32,
    pub normal: f32,
}

impl Default for CriticalityMultipliers {
    fn default() -> Self {
        Self {
            critical: 0.8,
            high: 1.0,
            normal: 1.2,
        }
    }
}

impl CriticalityMultipliers {
    pub fn for_tier(&self, tier: CriticalityTier) -> f32 {
        match tier {
            CriticalityTier::Critical => self.critical,
            CriticalityTier::High => self.high,
            CriticalityTier::Normal => self.normal,
        }
    }
}

/// Adaptive policy parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Number of recent decisions kept
    pub window: usize,
    /// Decisions required before adjusting
    pub min_decisions: usize,
    /// Target anomaly-rate band
    pub rate_low: f32,
    pub rate_high: f32,
    pub raise_factor: f32,
    pub lower_factor: f32,
    /// Effective threshold bounds, as multiples of the base
    pub min_factor: f32,
    pub max_factor: f32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            window: ADAPTIVE_WINDOW,
            min_decisions: ADAPTIVE_MIN_DECISIONS,
            rate_low: ADAPTIVE_RATE_LOW,
            rate_high: ADAPTIVE_RATE_HIGH,
            raise_factor: ADAPTIVE_RAISE_FACTOR,
            lower_factor: ADAPTIVE_LOWER_FACTOR,
            min_factor: 0.5,
            max_factor: 20.0,
        }
    }
}

/// Threshold Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Percentile used for calibration
    pub percentile: f32,
    pub policy: ThresholdPolicyKind,
    pub multipliers: CriticalityMultipliers,
    pub adaptive: AdaptiveConfig,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            percentile: DEFAULT_CALIBRATION_PERCENTILE,
            policy: ThresholdPolicyKind::Fixed,
            multipliers: CriticalityMultipliers::default(),
            adaptive: AdaptiveConfig::default(),
        }
    }
}

impl ThresholdConfig {
    pub fn adaptive() -> Self {
        Self {
            policy: ThresholdPolicyKind::Adaptive,
            ..Default::default()
        }
    }

    /// Instantiate the configured policy around a calibrated base
    pub fn build(&self, base: f32) -> Box<dyn ThresholdPolicy> {
        match self.policy {
            ThresholdPolicyKind::Fixed => Box::new(FixedThreshold::new(base, self.multipliers)),
            ThresholdPolicyKind::Adaptive => Box::new(AdaptiveRateThreshold::new(base, self.adaptive)),
        }
    }
}

// ============================================================================
// POLICY TRAIT
// ============================================================================

/// Threshold statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStats {
    pub policy: String,
    pub base: f32,
    pub current: f32,
    pub window_len: usize,
    pub window_anomaly_rate: f32,
}

/// Deployment-time threshold strategy
///
/// Callers hold the policy under the same lock as the detection counters and
/// call `effective` then `record` for each decision.
pub trait ThresholdPolicy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn base(&self) -> f32;

    /// Threshold for the next decision
    fn effective(&self, tier: CriticalityTier) -> f32;

    /// Record the outcome of a decision
    fn record(&mut self, is_anomaly: bool);

    /// Drop history and return to the base
    fn reset(&mut self);

    fn stats(&self) -> ThresholdStats;
}

// ============================================================================
// FIXED
// ============================================================================

#[derive(Debug, Clone)]
pub struct FixedThreshold {
    base: f32,
    multipliers: CriticalityMultipliers,
}

impl FixedThreshold {
    pub fn new(base: f32, multipliers: CriticalityMultipliers) -> Self {
        Self { base, multipliers }
    }
}

impl ThresholdPolicy for FixedThreshold {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn base(&self) -> f32 {
        self.base
    }

    fn effective(&self, tier: CriticalityTier) -> f32 {
        self.base * self.multipliers.for_tier(tier)
    }

    fn record(&mut self, _is_anomaly: bool) {}

    fn reset(&mut self) {}

    fn stats(&self) -> ThresholdStats {
        ThresholdStats {
            policy: self.name().to_string(),
            base: self.base,
            current: self.base,
            window_len: 0,
            window_anomaly_rate: 0.0,
        }
    }
}

// ============================================================================
// ADAPTIVE
// ============================================================================

/// Adaptive Threshold - Adjusts based on recent decisions
///
/// A novel attack arriving after a run of mild anomalies is judged against
/// the raised threshold.
#[derive(Debug, Clone)]
pub struct AdaptiveRateThreshold {
    config: AdaptiveConfig,
    base: f32,
    current: f32,
    recent: VecDeque<bool>,
    anomalies_in_window: usize,
}

impl AdaptiveRateThreshold {
    pub fn new(base: f32, config: AdaptiveConfig) -> Self {
        Self {
            config,
            base,
            current: base,
            recent: VecDeque::with_capacity(config.window),
            anomalies_in_window: 0,
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn window_rate(&self) -> f32 {
        if self.recent.is_empty() {
            0.0
        } else {
            self.anomalies_in_window as f32 / self.recent.len() as f32
        }
    }

    fn adjust(&mut self) {
        if self.recent.len() < self.config.min_decisions {
            return;
        }
        let rate = self.window_rate();
        let next = if rate > self.config.rate_high {
            self.current * self.config.raise_factor
        } else if rate < self.config.rate_low {
            self.current * self.config.lower_factor
        } else {
            return;
        };

        let lo = self.base * self.config.min_factor;
        let hi = self.base * self.config.max_factor;
        self.current = next.clamp(lo, hi);
        log::debug!(
            "Adaptive threshold {:.6} (rate {:.3} over {} decisions)",
            self.current, rate, self.recent.len()
        );
    }
}

impl ThresholdPolicy for AdaptiveRateThreshold {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn base(&self) -> f32 {
        self.base
    }

    fn effective(&self, _tier: CriticalityTier) -> f32 {
        self.current
    }

    fn record(&mut self, is_anomaly: bool) {
        self.recent.push_back(is_anomaly);
        if is_anomaly {
            self.anomalies_in_window += 1;
        }
        while self.recent.len() > self.config.window {
            if self.recent.pop_front() == Some(true) {
                self.anomalies_in_window -= 1;
            }
        }
        self.adjust();
    }

    fn reset(&mut self) {
        self.recent.clear();
        self.anomalies_in_window = 0;
        self.current = self.base;
    }

    fn stats(&self) -> ThresholdStats {
        ThresholdStats {
            policy: self.name().to_string(),
            base: self.base,
            current: self.current,
            window_len: self.recent.len(),
            window_anomaly_rate: self.window_rate(),
        }
    }
}
