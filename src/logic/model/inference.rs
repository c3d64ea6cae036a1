//! Decision Engine - real-time scoring
//!
//! SensorRequest → encode → standardize → reconstruct → threshold → verdict.
//!
//! Shared state:
//! - the loaded model (`Arc<LoadedModel>`, swapped under an `RwLock`), read-only
//! - `DetectionState` (counters, threshold policy, stream histories) behind one
//!   `Mutex`. Each decision reads the threshold, decides, records the outcome
//!   and updates the counters inside a single critical section.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::artifacts::{load_bundle, ArtifactManifest, ModelBundle};
use super::network::Autoencoder;
use super::scaler::Standardizer;
use super::threshold::{Calibration, ThresholdPolicy, ThresholdStats};
use crate::error::{DetectorError, DetectorResult};
use crate::logic::config::{EngineConfig, HistoryMode, ScoreMode};
use crate::logic::features::{
    CategoryTables, CriticalityTier, FeatureEncoder, FeatureVector, SensorReading, SensorRequest,
    StreamHistories, TimeSeriesContext,
};
use crate::logic::threat::{classify_with_bands, saturate_error, BandThresholds, ThreatAssessment, ThreatLevel};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Verdict for one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub timestamp: DateTime<Utc>,
    pub is_anomaly: bool,
    /// reconstruction_error / threshold
    pub anomaly_score: f32,
    pub reconstruction_error: f32,
    /// Effective threshold used for this decision
    pub threshold: f32,
    /// Calibrated base threshold
    pub base_threshold: f32,
    pub confidence: f32,
    pub threat_level: ThreatLevel,
    /// Rolling/lag features were approximated from the current value
    pub history_approximated: bool,
    /// Non-finite inputs replaced by 0.0
    pub sanitized_features: usize,
    /// Name of the policy that produced the verdict
    pub policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    /// Non-anomalous result carrying an error message
    pub fn failed(error: &DetectorError) -> Self {
        Self {
            timestamp: Utc::now(),
            is_anomaly: false,
            anomaly_score: 0.0,
            reconstruction_error: 0.0,
            threshold: 0.0,
            base_threshold: 0.0,
            confidence: 0.0,
            threat_level: ThreatLevel::Normal,
            history_approximated: false,
            sanitized_features: 0,
            policy: "none".to_string(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Ready,
    NotLoaded,
}

/// Running statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionStatistics {
    pub total_samples: u64,
    pub anomalies_detected: u64,
    /// Percent of samples flagged
    pub anomaly_rate: f64,
    pub last_detection_time: Option<DateTime<Utc>>,
    pub current_threat_level: ThreatLevel,
    pub model_status: ModelStatus,
    pub threshold: Option<ThresholdStats>,
    pub avg_latency_us: f64,
    /// Streams with tracked history (`HistoryMode::Tracked`)
    #[serde(default)]
    pub tracked_streams: usize,
}

// ============================================================================
// LOADED MODEL
// ============================================================================

/// Immutable serving bundle
#[derive(Debug)]
pub struct LoadedModel {
    model: Autoencoder,
    standardizer: Standardizer,
    tables: CategoryTables,
    calibration: Calibration,
    manifest: Option<ArtifactManifest>,
}

impl LoadedModel {
    pub fn new(
        model: Autoencoder,
        standardizer: Standardizer,
        tables: CategoryTables,
        calibration: Calibration,
    ) -> DetectorResult<Self> {
        if !standardizer.is_fitted() {
            return Err(DetectorError::NotFitted);
        }
        if !calibration.is_valid() {
            return Err(DetectorError::DegenerateInput(format!(
                "invalid base threshold {}",
                calibration.base_threshold
            )));
        }
        Ok(Self {
            model,
            standardizer,
            tables,
            calibration,
            manifest: None,
        })
    }

    pub fn from_bundle(bundle: ModelBundle) -> DetectorResult<Self> {
        let standardizer = Standardizer::from_params(bundle.scaler)?;
        let mut loaded = Self::new(bundle.model, standardizer, bundle.tables, bundle.calibration)?;
        loaded.manifest = Some(bundle.manifest);
        Ok(loaded)
    }

    pub fn base_threshold(&self) -> f32 {
        self.calibration.base_threshold
    }

    pub fn tables(&self) -> &CategoryTables {
        &self.tables
    }

    pub fn manifest(&self) -> Option<&ArtifactManifest> {
        self.manifest.as_ref()
    }

    pub fn model(&self) -> &Autoencoder {
        &self.model
    }

    /// Mean squared reconstruction error over standardized features
    pub fn reconstruction_error(&self, vector: &FeatureVector) -> DetectorResult<f32> {
        let standardized = self.standardizer.transform(vector)?;
        self.model.reconstruction_error(standardized.as_slice())
    }
}

// ============================================================================
// DETECTION STATE
// ============================================================================

/// All mutable scoring state
#[derive(Debug, Default)]
pub struct DetectionState {
    policy: Option<Box<dyn ThresholdPolicy>>,
    histories: StreamHistories,
    total_samples: u64,
    anomalies_detected: u64,
    last_detection_time: Option<DateTime<Utc>>,
    current_threat_level: ThreatLevel,
    latency_sum_us: u64,
}

/// Outcome of one decision transaction
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub assessment: ThreatAssessment,
    pub threshold: f32,
    pub base_threshold: f32,
}

impl DetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: Box<dyn ThresholdPolicy>) -> Self {
        Self {
            policy: Some(policy),
            ..Default::default()
        }
    }

    pub fn install_policy(&mut self, policy: Box<dyn ThresholdPolicy>) {
        self.policy = Some(policy);
    }

    pub fn policy_name(&self) -> Option<&'static str> {
        self.policy.as_ref().map(|p| p.name())
    }

    /// Threshold → decide → record → count, as one step
    pub fn decide(&mut self, error: f32, tier: CriticalityTier, bands: &BandThresholds) -> DetectorResult<Decision> {
        let policy = self.policy.as_mut().ok_or(DetectorError::NotReady)?;

        let threshold = policy.effective(tier);
        let base_threshold = policy.base();
        let assessment = classify_with_bands(error, threshold, bands);
        policy.record(assessment.is_anomaly);

        self.total_samples += 1;
        if assessment.is_anomaly {
            self.anomalies_detected += 1;
            self.last_detection_time = Some(Utc::now());
        }
        self.current_threat_level = assessment.threat_level;

        Ok(Decision {
            assessment,
            threshold,
            base_threshold,
        })
    }

    /// Context for a reading without recording it
    pub fn preview_history(&self, device_id: &str, sensor_name: &str, value: f64) -> TimeSeriesContext {
        self.histories.preview(device_id, sensor_name, value)
    }

    pub fn observe_history(&mut self, device_id: &str, sensor_name: &str, value: f64) -> TimeSeriesContext {
        self.histories.observe(device_id, sensor_name, value)
    }

    fn add_latency(&mut self, micros: u64) {
        self.latency_sum_us += micros;
    }

    pub fn statistics(&self, model_status: ModelStatus) -> DetectionStatistics {
        let anomaly_rate = if self.total_samples > 0 {
            self.anomalies_detected as f64 / self.total_samples as f64 * 100.0
        } else {
            0.0
        };
        let avg_latency_us = if self.total_samples > 0 {
            self.latency_sum_us as f64 / self.total_samples as f64
        } else {
            0.0
        };
        DetectionStatistics {
            total_samples: self.total_samples,
            anomalies_detected: self.anomalies_detected,
            anomaly_rate,
            last_detection_time: self.last_detection_time,
            current_threat_level: self.current_threat_level,
            model_status,
            threshold: self.policy.as_ref().map(|p| p.stats()),
            avg_latency_us,
            tracked_streams: self.histories.stream_count(),
        }
    }

    /// Clear counters and policy history, keep the policy
    pub fn reset(&mut self) {
        if let Some(policy) = self.policy.as_mut() {
            policy.reset();
        }
        self.histories.clear();
        self.total_samples = 0;
        self.anomalies_detected = 0;
        self.last_detection_time = None;
        self.current_threat_level = ThreatLevel::Normal;
        self.latency_sum_us = 0;
    }
}

// ============================================================================
// DECISION ENGINE
// ============================================================================

/// Scoring surface shared by the engine and its decorators
pub trait Scorer: Send + Sync {
    fn try_score_reading(
        &self,
        reading: &SensorReading,
        context: Option<&TimeSeriesContext>,
    ) -> DetectorResult<DetectionResult>;

    fn statistics(&self) -> DetectionStatistics;

    fn try_score(&self, request: &SensorRequest) -> DetectorResult<DetectionResult> {
        let reading = request.to_reading();
        self.try_score_reading(&reading, request.context.as_ref())
    }

    /// Never fails: errors come back in `DetectionResult::error`
    fn score(&self, request: &SensorRequest) -> DetectionResult {
        self.try_score(request).unwrap_or_else(|e| {
            log::debug!("Scoring {}/{} failed: {}", request.device_id, request.sensor_name, e);
            DetectionResult::failed(&e)
        })
    }

    fn score_reading(&self, reading: &SensorReading, context: Option<&TimeSeriesContext>) -> DetectionResult {
        self.try_score_reading(reading, context)
            .unwrap_or_else(|e| DetectionResult::failed(&e))
    }
}

pub struct DecisionEngine {
    config: EngineConfig,
    model: RwLock<Option<Arc<LoadedModel>>>,
    state: Mutex<DetectionState>,
}

impl DecisionEngine {
    /// Engine with no model: every score is NotReady until `load`
    pub fn new(config: EngineConfig) -> Self {
        Self::with_state(config, DetectionState::new())
    }

    /// Inject an existing state (e.g. a pre-configured policy)
    pub fn with_state(config: EngineConfig, state: DetectionState) -> Self {
        Self {
            config,
            model: RwLock::new(None),
            state: Mutex::new(state),
        }
    }

    /// Build and load in one step
    pub fn with_model(config: EngineConfig, model: LoadedModel) -> Self {
        let engine = Self::new(config);
        engine.install(model);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load a bundle from disk and start serving it
    pub fn load_from_dir(&self, dir: &std::path::Path) -> DetectorResult<()> {
        let bundle = load_bundle(dir)?;
        self.install(LoadedModel::from_bundle(bundle)?);
        Ok(())
    }

    /// Swap in a model; the threshold policy is rebuilt from its base
    pub fn install(&self, model: LoadedModel) {
        let base = model.base_threshold();
        let policy = self.config.threshold.build(base);
        log::info!(
            "Serving model (base threshold {:.6}, policy {}, categories {:?})",
            base,
            policy.name(),
            self.config.category_policy
        );
        let model = Arc::new(model);
        let mut slot = self.model.write();
        self.state.lock().install_policy(policy);
        *slot = Some(model);
    }

    pub fn unload(&self) {
        *self.model.write() = None;
        log::info!("Model unloaded");
    }

    pub fn is_ready(&self) -> bool {
        self.model.read().is_some()
    }

    pub fn loaded(&self) -> Option<Arc<LoadedModel>> {
        self.model.read().clone()
    }

    pub fn reset_statistics(&self) {
        self.state.lock().reset();
    }

    /// Score a pre-encoded vector (batch evaluation path)
    pub fn score_vector(&self, vector: &FeatureVector, tier: CriticalityTier) -> DetectorResult<DetectionResult> {
        vector
            .validate()
            .map_err(|e| DetectorError::DegenerateInput(e.to_string()))?;
        let model = self.loaded().ok_or(DetectorError::NotReady)?;
        let start = Instant::now();
        let error = model.reconstruction_error(vector)?;
        self.decide(error, tier, false, 0, None, start)
    }

    /// `history` is recorded in the same critical section as the decision,
    /// so a reading that fails earlier never enters its stream.
    fn decide(
        &self,
        error: f32,
        tier: CriticalityTier,
        history_approximated: bool,
        sanitized_features: usize,
        history: Option<(&str, &str, f64)>,
        start: Instant,
    ) -> DetectorResult<DetectionResult> {
        if !error.is_finite() {
            log::warn!("Reconstruction error overflowed ({}), saturating to f32::MAX", error);
        }
        let error = saturate_error(error);
        let (decision, policy) = {
            let mut state = self.state.lock();
            let decision = state.decide(error, tier, &self.config.bands)?;
            if let Some((device_id, sensor_name, value)) = history {
                state.observe_history(device_id, sensor_name, value);
            }
            state.add_latency(start.elapsed().as_micros() as u64);
            (decision, state.policy_name().unwrap_or("none"))
        };

        let a = decision.assessment;
        if a.is_anomaly {
            log::debug!(
                "Anomaly: error={:.6} threshold={:.6} ratio={:.2} level={}",
                error, decision.threshold, a.anomaly_score, a.threat_level
            );
        }

        let anomaly_score = match self.config.score_mode {
            ScoreMode::Ratio => a.anomaly_score,
            ScoreMode::Raw => error,
        };

        Ok(DetectionResult {
            timestamp: Utc::now(),
            is_anomaly: a.is_anomaly,
            anomaly_score,
            reconstruction_error: error,
            threshold: decision.threshold,
            base_threshold: decision.base_threshold,
            confidence: a.confidence,
            threat_level: a.threat_level,
            history_approximated,
            sanitized_features,
            policy: policy.to_string(),
            error: None,
        })
    }
}

impl Scorer for DecisionEngine {
    fn try_score_reading(
        &self,
        reading: &SensorReading,
        context: Option<&TimeSeriesContext>,
    ) -> DetectorResult<DetectionResult> {
        let model = self.loaded().ok_or(DetectorError::NotReady)?;
        let start = Instant::now();

        let tracked = match (context, self.config.history_mode) {
            (None, HistoryMode::Tracked) => Some(self.state.lock().preview_history(
                &reading.device_id,
                &reading.sensor_name,
                reading.sensor_value,
            )),
            _ => None,
        };
        let history = tracked
            .as_ref()
            .map(|_| (reading.device_id.as_str(), reading.sensor_name.as_str(), reading.sensor_value));

        let encoded = FeatureEncoder::new(model.tables(), self.config.category_policy)
            .encode(reading, context.or(tracked.as_ref()))?;
        let error = model.reconstruction_error(&encoded.vector)?;

        self.decide(
            error,
            reading.criticality_tier(),
            encoded.history_approximated,
            encoded.sanitized,
            history,
            start,
        )
    }

    fn statistics(&self) -> DetectionStatistics {
        let status = if self.is_ready() { ModelStatus::Ready } else { ModelStatus::NotLoaded };
        self.state.lock().statistics(status)
    }
}

// ============================================================================
// RULE OVERRIDE (demo/testing only)
// ============================================================================

/// Forces CRITICAL for devices labelled `critical`, delegates otherwise.
///
/// For demonstrations only. Never wrap a production engine with this.
/// `statistics()` reports the verdicts this scorer returned: promoted
/// readings count as anomalies and the last returned level is current.
pub struct RuleOverridePolicy<S: Scorer> {
    inner: S,
    counters: Mutex<OverrideCounters>,
}

#[derive(Debug, Default)]
struct OverrideCounters {
    /// Verdicts flipped from normal to anomalous
    promoted: u64,
    last_level: Option<ThreatLevel>,
    last_detection_time: Option<DateTime<Utc>>,
}

impl<S: Scorer> RuleOverridePolicy<S> {
    pub const POLICY_NAME: &'static str = "rule_override";

    pub fn new(inner: S) -> Self {
        log::warn!("Rule override enabled: 'critical' devices are always reported as CRITICAL");
        Self {
            inner,
            counters: Mutex::new(OverrideCounters::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Scorer> Scorer for RuleOverridePolicy<S> {
    fn try_score_reading(
        &self,
        reading: &SensorReading,
        context: Option<&TimeSeriesContext>,
    ) -> DetectorResult<DetectionResult> {
        let mut result = self.inner.try_score_reading(reading, context)?;
        let forced = reading.criticality.trim().eq_ignore_ascii_case("critical");

        let mut counters = self.counters.lock();
        if forced {
            if !result.is_anomaly {
                counters.promoted += 1;
            }
            result.is_anomaly = true;
            result.threat_level = ThreatLevel::Critical;
            result.confidence = 1.0;
            result.policy = Self::POLICY_NAME.to_string();
            counters.last_detection_time = Some(result.timestamp);
        }
        counters.last_level = Some(result.threat_level);
        Ok(result)
    }

    fn statistics(&self) -> DetectionStatistics {
        let mut stats = self.inner.statistics();
        let counters = self.counters.lock();
        stats.anomalies_detected += counters.promoted;
        stats.anomaly_rate = if stats.total_samples > 0 {
            stats.anomalies_detected as f64 / stats.total_samples as f64 * 100.0
        } else {
            0.0
        };
        if let Some(level) = counters.last_level {
            stats.current_threat_level = level;
        }
        stats.last_detection_time = stats.last_detection_time.max(counters.last_detection_time);
        stats
    }
}
