//! GridGuard Core - reconstruction-based anomaly detection for industrial
//! sensor telemetry (power grid, water treatment, nuclear plant).
//!
//! Train an autoencoder on normal readings, calibrate a threshold on held-out
//! reconstruction errors, then score live readings through a `DecisionEngine`.

pub mod constants;
pub mod error;
pub mod logic;

pub use error::{DetectorError, DetectorResult, LoadError};
pub use logic::config::{DetectorConfig, EngineConfig, HistoryMode, ScoreMode};
pub use logic::features::{
    CategoryPolicy, CriticalityTier, FeatureVector, SensorReading, SensorRequest, TimeSeriesContext,
};
pub use logic::model::{
    DecisionEngine, DetectionResult, DetectionStatistics, LoadedModel, RuleOverridePolicy, Scorer,
    Trainer, TrainingConfig,
};
pub use logic::threat::ThreatLevel;
