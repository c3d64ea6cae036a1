//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Environment variables (`GRIDGUARD_*`) override the values below.

use std::path::PathBuf;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "GridGuard";

/// Artifact directory name under the local data dir
pub const ARTIFACT_DIR_NAME: &str = "gridguard";

// ============================================
// Calibration / scoring defaults
// ============================================

/// Percentile of normal validation errors used as the base threshold
pub const DEFAULT_CALIBRATION_PERCENTILE: f32 = 95.0;

/// Normal-data contamination tolerated before filtering (0.1%)
pub const CONTAMINATION_TOLERANCE: f64 = 0.001;

/// Validation slice: fraction of normal data, capped
pub const VALIDATION_FRACTION: f64 = 0.05;
pub const VALIDATION_CAP: usize = 50_000;

/// Confidence floor reported for normal verdicts
pub const NORMAL_CONFIDENCE_FLOOR: f32 = 0.1;

// ============================================
// Adaptive threshold defaults
// ============================================

pub const ADAPTIVE_WINDOW: usize = 100;
pub const ADAPTIVE_MIN_DECISIONS: usize = 20;
pub const ADAPTIVE_RATE_LOW: f32 = 0.10;
pub const ADAPTIVE_RATE_HIGH: f32 = 0.15;
pub const ADAPTIVE_RAISE_FACTOR: f32 = 1.1;
pub const ADAPTIVE_LOWER_FACTOR: f32 = 0.95;

// ============================================
// Training defaults
// ============================================

pub const DEFAULT_EPOCHS: usize = 20;
pub const DEFAULT_BATCH_SIZE: usize = 1024;
pub const DEFAULT_LEARNING_RATE: f32 = 0.001;
pub const DEFAULT_SEED: u64 = 42;

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get artifact directory from environment or use default
pub fn get_artifact_dir() -> PathBuf {
    std::env::var("GRIDGUARD_ARTIFACT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(ARTIFACT_DIR_NAME)
                .join("models")
        })
}

/// Get calibration percentile from environment or use default
pub fn get_calibration_percentile() -> f32 {
    std::env::var("GRIDGUARD_CALIBRATION_PERCENTILE")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|p: &f32| *p > 0.0 && *p < 100.0)
        .unwrap_or(DEFAULT_CALIBRATION_PERCENTILE)
}

/// Get training seed from environment or use default
pub fn get_seed() -> u64 {
    std::env::var("GRIDGUARD_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SEED)
}

/// Check if strict category handling is enabled
pub fn is_strict_categories() -> bool {
    std::env::var("GRIDGUARD_STRICT_CATEGORIES")
        .map(|s| s.to_lowercase() == "true" || s == "1")
        .unwrap_or(false)
}
