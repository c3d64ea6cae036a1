//! Model Module - Autoencoder training and inference
//!
//! - `scaler`: per-feature standardization
//! - `network`: encoder/decoder layers
//! - `optimizer`: Adam + plateau schedule
//! - `trainer`: offline training run
//! - `threshold`: calibration and serving policies
//! - `artifacts`: persisted bundle
//! - `inference`: decision engine

pub mod scaler;
pub mod network;
pub mod optimizer;
pub mod trainer;
pub mod threshold;
pub mod artifacts;
pub mod inference;


// Re-export common types
pub use scaler::{StandardizationParameters, Standardizer};
pub use network::{Architecture, Autoencoder};
pub use trainer::{Trainer, TrainingConfig, TrainingOutcome, TrainingReport};
pub use threshold::{
    calibrate, AdaptiveRateThreshold, Calibration, FixedThreshold, ThresholdConfig,
    ThresholdPolicy, ThresholdPolicyKind,
};
pub use artifacts::{load_bundle, save_bundle, ArtifactManifest, ModelBundle};
pub use inference::{
    DecisionEngine, DetectionResult, DetectionState, DetectionStatistics, LoadedModel,
    ModelStatus, RuleOverridePolicy, Scorer,
};
