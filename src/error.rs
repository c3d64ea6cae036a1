//! Error handling
//!
//! `LoadError` is fatal at startup. `DetectorError` covers everything else;
//! per-request variants are folded into `DetectionResult::error` by the
//! decision engine instead of reaching the caller.

use std::path::PathBuf;
use thiserror::Error;

pub type DetectorResult<T> = Result<T, DetectorError>;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("unknown category '{value}' for field '{field}'")]
    UnknownCategory { field: String, value: String },

    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("detector not ready: model artifacts are not loaded")]
    NotReady,

    #[error("standardizer used before fit/load")]
    NotFitted,

    #[error("training diverged at epoch {epoch}, batch {batch}: loss = {loss}")]
    TrainingDivergence { epoch: usize, batch: usize, loss: f32 },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Artifact load failures. Always carry the offending path.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("missing artifact: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error(
        "feature layout mismatch in {}: expected v{expected_version} ({expected_hash:08x}), got v{actual_version} ({actual_hash:08x})",
        path.display()
    )]
    LayoutMismatch {
        path: PathBuf,
        expected_version: u8,
        expected_hash: u32,
        actual_version: u8,
        actual_hash: u32,
    },

    #[error("feature column mismatch in {} at position {index}: expected '{expected}', got '{actual}'", path.display())]
    ColumnMismatch {
        path: PathBuf,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("{what} dimension mismatch in {}: expected {expected}, got {actual}", path.display())]
    DimensionMismatch {
        what: String,
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("checksum mismatch for {}: manifest says {expected}, file hashes to {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("invalid threshold {value} in {}", path.display())]
    InvalidThreshold { path: PathBuf, value: f32 },

    #[error("invalid parameters in {}: {reason}", path.display())]
    InvalidParameters { path: PathBuf, reason: String },

    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
