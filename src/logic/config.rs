//! Detector Configuration
//!
//! JSON file (optional) → `GRIDGUARD_*` environment overrides → validate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{DetectorError, DetectorResult};
use crate::logic::features::CategoryPolicy;
use crate::logic::model::threshold::{ThresholdConfig, ThresholdPolicyKind};
use crate::logic::model::trainer::TrainingConfig;
use crate::logic::threat::BandThresholds;

/// Where rolling/lag features come from when a request has no context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    /// Repeat the current value, flag the result
    #[default]
    Approximate,
    /// Engine keeps a bounded history per (device, sensor)
    Tracked,
}

/// What `DetectionResult::anomaly_score` reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMode {
    /// error / effective threshold
    #[default]
    Ratio,
    /// The reconstruction error itself; banding still uses the ratio
    Raw,
}

/// Serving-side settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub category_policy: CategoryPolicy,
    pub history_mode: HistoryMode,
    pub score_mode: ScoreMode,
    pub threshold: ThresholdConfig,
    pub bands: BandThresholds,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub engine: EngineConfig,
    pub training: TrainingConfig,
    /// Model bundle directory; `GRIDGUARD_ARTIFACT_DIR` or the data dir when unset
    pub artifact_dir: Option<PathBuf>,
}

impl DetectorConfig {
    /// Read a JSON config file
    pub fn from_file(path: &Path) -> DetectorResult<Self> {
        let data = std::fs::read(path)?;
        let config: DetectorConfig = serde_json::from_slice(&data)?;
        log::info!("Loaded detector config from {}", path.display());
        Ok(config)
    }

    /// File (if given) plus environment overrides, validated
    pub fn load(path: Option<&Path>) -> DetectorResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay `GRIDGUARD_*` variables that are set
    pub fn apply_env(&mut self) {
        if std::env::var("GRIDGUARD_STRICT_CATEGORIES").is_ok() {
            self.engine.category_policy = if constants::is_strict_categories() {
                CategoryPolicy::Strict
            } else {
                CategoryPolicy::Lenient
            };
        }
        if std::env::var("GRIDGUARD_CALIBRATION_PERCENTILE").is_ok() {
            let p = constants::get_calibration_percentile();
            self.engine.threshold.percentile = p;
            self.training.calibration_percentile = p;
        }
        if std::env::var("GRIDGUARD_SEED").is_ok() {
            self.training.seed = constants::get_seed();
        }
        match std::env::var("GRIDGUARD_THRESHOLD_POLICY").as_deref() {
            Ok("fixed") => self.engine.threshold.policy = ThresholdPolicyKind::Fixed,
            Ok("adaptive") => self.engine.threshold.policy = ThresholdPolicyKind::Adaptive,
            Ok(other) => log::warn!("Ignoring unknown GRIDGUARD_THRESHOLD_POLICY '{}'", other),
            Err(_) => {}
        }
        match std::env::var("GRIDGUARD_HISTORY_MODE").as_deref() {
            Ok("approximate") => self.engine.history_mode = HistoryMode::Approximate,
            Ok("tracked") => self.engine.history_mode = HistoryMode::Tracked,
            Ok(other) => log::warn!("Ignoring unknown GRIDGUARD_HISTORY_MODE '{}'", other),
            Err(_) => {}
        }
        match std::env::var("GRIDGUARD_SCORE_MODE").as_deref() {
            Ok("ratio") => self.engine.score_mode = ScoreMode::Ratio,
            Ok("raw") => self.engine.score_mode = ScoreMode::Raw,
            Ok(other) => log::warn!("Ignoring unknown GRIDGUARD_SCORE_MODE '{}'", other),
            Err(_) => {}
        }
        if self.artifact_dir.is_none() {
            if let Ok(dir) = std::env::var("GRIDGUARD_ARTIFACT_DIR") {
                self.artifact_dir = Some(PathBuf::from(dir));
            }
        }
    }

    pub fn validate(&self) -> DetectorResult<()> {
        let invalid = |msg: String| Err(DetectorError::DegenerateInput(msg));

        let p = self.engine.threshold.percentile;
        if !(p > 0.0 && p < 100.0) {
            return invalid(format!("threshold percentile must be in (0, 100), got {}", p));
        }
        if !self.engine.bands.is_valid() {
            return invalid("threat bands must be positive and strictly increasing".to_string());
        }
        let m = &self.engine.threshold.multipliers;
        if [m.critical, m.high, m.normal].iter().any(|v| !(*v > 0.0)) {
            return invalid("criticality multipliers must be positive".to_string());
        }
        let a = &self.engine.threshold.adaptive;
        if a.window == 0 || a.min_decisions > a.window || a.rate_low > a.rate_high {
            return invalid("adaptive window/band settings are inconsistent".to_string());
        }
        if !(a.min_factor > 0.0 && a.min_factor <= 1.0 && a.max_factor >= 1.0) {
            return invalid("adaptive bounds must bracket the base threshold".to_string());
        }
        self.training.architecture.validate()?;
        Ok(())
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(constants::get_artifact_dir)
    }
}
