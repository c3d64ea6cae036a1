//! Artifact Store - persisted model bundle
//!
//! One directory per trained model:
//!
//! | file                  | content                                        |
//! |-----------------------|------------------------------------------------|
//! | `manifest.json`       | versions, layout hash, weights checksum, run id |
//! | `weights.json`        | autoencoder layers                             |
//! | `scaler.json`         | standardization parameters                     |
//! | `vocabulary.json`     | categorical tables                             |
//! | `feature_columns.json`| ordered column names                           |
//! | `threshold.json`      | calibration                                    |
//!
//! Loading is all-or-nothing: any mismatch is a `LoadError` naming the file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::network::{Architecture, Autoencoder};
use super::scaler::StandardizationParameters;
use super::threshold::Calibration;
use super::trainer::{TrainingOutcome, TrainingReport};
use crate::constants::APP_VERSION;
use crate::error::{DetectorError, DetectorResult, LoadError};
use crate::logic::features::layout::{
    feature_columns, first_column_mismatch, layout_hash, validate_layout,
};
use crate::logic::features::{CategoryTables, FEATURE_COUNT, FEATURE_VERSION};

/// Bumped when the bundle layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const WEIGHTS_FILE: &str = "weights.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const VOCABULARY_FILE: &str = "vocabulary.json";
pub const COLUMNS_FILE: &str = "feature_columns.json";
pub const THRESHOLD_FILE: &str = "threshold.json";

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub format_version: u32,
    pub feature_version: u8,
    pub layout_hash: u32,
    pub input_dim: usize,
    pub architecture: Architecture,
    /// Hex SHA-256 of `weights.json`
    pub weights_sha256: String,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub app_version: String,
    #[serde(default)]
    pub training: Option<TrainingReport>,
}

// ============================================================================
// BUNDLE
// ============================================================================

/// Everything needed to serve a trained model
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub manifest: ArtifactManifest,
    pub model: Autoencoder,
    pub scaler: StandardizationParameters,
    pub tables: CategoryTables,
    pub calibration: Calibration,
}

impl ModelBundle {
    /// Assemble a bundle from a finished training run
    pub fn from_training(outcome: TrainingOutcome, tables: CategoryTables) -> DetectorResult<Self> {
        let scaler = outcome
            .standardizer
            .params()
            .cloned()
            .ok_or(DetectorError::NotFitted)?;
        let manifest = ArtifactManifest {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            input_dim: outcome.model.input_dim(),
            architecture: outcome.model.architecture().clone(),
            weights_sha256: String::new(),
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            app_version: APP_VERSION.to_string(),
            training: Some(outcome.report),
        };
        Ok(Self {
            manifest,
            model: outcome.model,
            scaler,
            tables,
            calibration: outcome.calibration,
        })
    }

    pub fn base_threshold(&self) -> f32 {
        self.calibration.base_threshold
    }
}

// ============================================================================
// SAVE
// ============================================================================

/// Write the bundle; `weights_sha256` is filled in from the written bytes.
/// Returns the manifest as saved.
pub fn save_bundle(bundle: &ModelBundle, dir: &Path) -> DetectorResult<ArtifactManifest> {
    fs::create_dir_all(dir)?;

    let weights = serde_json::to_vec(&bundle.model)?;
    fs::write(dir.join(WEIGHTS_FILE), &weights)?;

    write_json(&dir.join(SCALER_FILE), &bundle.scaler)?;
    write_json(&dir.join(VOCABULARY_FILE), &bundle.tables)?;
    write_json(&dir.join(COLUMNS_FILE), &feature_columns())?;
    write_json(&dir.join(THRESHOLD_FILE), &bundle.calibration)?;

    let mut manifest = bundle.manifest.clone();
    manifest.weights_sha256 = sha256_hex(&weights);
    // manifest last: a directory without one is an incomplete write
    write_json(&dir.join(MANIFEST_FILE), &manifest)?;

    log::info!(
        "Saved model bundle {} to {} (threshold {:.6})",
        manifest.run_id,
        dir.display(),
        bundle.calibration.base_threshold
    );
    Ok(manifest)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> DetectorResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// ============================================================================
// LOAD
// ============================================================================

/// Load and validate a bundle
pub fn load_bundle(dir: &Path) -> Result<ModelBundle, LoadError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest: ArtifactManifest = read_json(&manifest_path)?;

    validate_layout(manifest.feature_version, manifest.layout_hash).map_err(|e| {
        LoadError::LayoutMismatch {
            path: manifest_path.clone(),
            expected_version: e.expected_version,
            expected_hash: e.expected_hash,
            actual_version: e.actual_version,
            actual_hash: e.actual_hash,
        }
    })?;
    check_dim("manifest input", &manifest_path, FEATURE_COUNT, manifest.input_dim)?;

    // columns
    let columns_path = dir.join(COLUMNS_FILE);
    let columns: Vec<String> = read_json(&columns_path)?;
    check_dim("feature column", &columns_path, FEATURE_COUNT, columns.len())?;
    if let Some((index, expected, actual)) = first_column_mismatch(&columns) {
        return Err(LoadError::ColumnMismatch {
            path: columns_path,
            index,
            expected,
            actual,
        });
    }

    // weights, checksum first
    let weights_path = dir.join(WEIGHTS_FILE);
    let weights = read_bytes(&weights_path)?;
    let actual = sha256_hex(&weights);
    if !actual.eq_ignore_ascii_case(&manifest.weights_sha256) {
        return Err(LoadError::ChecksumMismatch {
            path: weights_path,
            expected: manifest.weights_sha256.clone(),
            actual,
        });
    }
    let model: Autoencoder = serde_json::from_slice(&weights).map_err(|source| LoadError::Parse {
        path: weights_path.clone(),
        source,
    })?;
    check_dim("model input", &weights_path, manifest.input_dim, model.input_dim())?;
    if let Err(e) = model.validate() {
        log::warn!("Model structure check failed: {}", e);
        return Err(match e {
            DetectorError::DimensionMismatch { expected, actual } => LoadError::DimensionMismatch {
                what: "model layer".to_string(),
                path: weights_path,
                expected,
                actual,
            },
            other => LoadError::InvalidParameters {
                path: weights_path,
                reason: other.to_string(),
            },
        });
    }

    // scaler
    let scaler_path = dir.join(SCALER_FILE);
    let scaler: StandardizationParameters = read_json(&scaler_path)?;
    check_dim("scaler mean", &scaler_path, FEATURE_COUNT, scaler.mean.len())?;
    check_dim("scaler std", &scaler_path, FEATURE_COUNT, scaler.std.len())?;
    scaler.validate().map_err(|e| LoadError::InvalidParameters {
        path: scaler_path.clone(),
        reason: e.to_string(),
    })?;

    let tables: CategoryTables = read_json(&dir.join(VOCABULARY_FILE))?;

    let threshold_path = dir.join(THRESHOLD_FILE);
    let calibration: Calibration = read_json(&threshold_path)?;
    if !calibration.is_valid() {
        return Err(LoadError::InvalidThreshold {
            path: threshold_path,
            value: calibration.base_threshold,
        });
    }

    log::info!(
        "Loaded model bundle {} from {} (trained {}, threshold {:.6})",
        manifest.run_id,
        dir.display(),
        manifest.created_at.format("%Y-%m-%d %H:%M:%S"),
        calibration.base_threshold
    );

    Ok(ModelBundle {
        manifest,
        model,
        scaler,
        tables,
        calibration,
    })
}

fn check_dim(what: &str, path: &Path, expected: usize, actual: usize) -> Result<(), LoadError> {
    if expected != actual {
        return Err(LoadError::DimensionMismatch {
            what: what.to_string(),
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, LoadError> {
    if !path.exists() {
        return Err(LoadError::MissingArtifact { path: path.to_path_buf() });
    }
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let data = read_bytes(path)?;
    serde_json::from_slice(&data).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Manifest only, for `info`-style inspection
pub fn read_manifest(dir: &Path) -> Result<ArtifactManifest, LoadError> {
    read_json(&dir.join(MANIFEST_FILE))
}

/// Default bundle location
pub fn default_bundle_dir() -> PathBuf {
    crate::constants::get_artifact_dir()
}
