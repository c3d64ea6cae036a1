//! Trainer - offline fit of standardizer, autoencoder and threshold
//!
//! Single-threaded and deterministic for a given seed: one `StdRng` drives
//! weight init, the validation split, epoch shuffles and dropout masks.

use chrono::{DateTime, Utc};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::network::{Architecture, Autoencoder};
use super::optimizer::{Adam, PlateauScheduler};
use super::scaler::Standardizer;
use super::threshold::Calibration;
use crate::constants::{
    CONTAMINATION_TOLERANCE, DEFAULT_BATCH_SIZE, DEFAULT_CALIBRATION_PERCENTILE, DEFAULT_EPOCHS,
    DEFAULT_LEARNING_RATE, DEFAULT_SEED, VALIDATION_CAP, VALIDATION_FRACTION,
};
use crate::error::{DetectorError, DetectorResult};
use crate::logic::features::FeatureVector;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub seed: u64,
    pub architecture: Architecture,
    pub validation_fraction: f64,
    pub validation_cap: usize,
    /// Labelled-anomaly share above which filtering is logged as required
    pub contamination_tolerance: f64,
    pub calibration_percentile: f32,
    pub plateau_patience: usize,
    pub plateau_factor: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: DEFAULT_SEED,
            architecture: Architecture::default(),
            validation_fraction: VALIDATION_FRACTION,
            validation_cap: VALIDATION_CAP,
            contamination_tolerance: CONTAMINATION_TOLERANCE,
            calibration_percentile: DEFAULT_CALIBRATION_PERCENTILE,
            plateau_patience: 10,
            plateau_factor: 0.5,
        }
    }
}

impl TrainingConfig {
    /// Validation rows for `n` normal samples: ceil(n * fraction), at least 1, capped
    pub fn validation_size(&self, n: usize) -> usize {
        let wanted = (n as f64 * self.validation_fraction).ceil() as usize;
        wanted.clamp(1, self.validation_cap.max(1))
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    pub learning_rate: f32,
    pub skipped_batches: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub total_samples: usize,
    pub dropped_anomalies: usize,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub epochs_run: usize,
    pub final_train_loss: f32,
    pub final_val_loss: f32,
    pub best_val_loss: f32,
    pub final_learning_rate: f32,
    pub history: Vec<EpochSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: Autoencoder,
    pub standardizer: Standardizer,
    pub calibration: Calibration,
    pub report: TrainingReport,
    /// Reconstruction errors of the validation rows (post-training)
    pub validation_errors: Vec<f32>,
}

// ============================================================================
// TRAINER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit on encoded vectors. `labels[i] == true` marks a known anomaly;
    /// those rows never reach the model.
    pub fn train(&self, vectors: &[FeatureVector], labels: Option<&[bool]>) -> DetectorResult<TrainingOutcome> {
        let started_at = Utc::now();
        let cfg = &self.config;

        if cfg.batch_size < 2 || cfg.epochs == 0 {
            return Err(DetectorError::DegenerateInput(format!(
                "batch_size must be >= 2 and epochs >= 1 (got {} / {})",
                cfg.batch_size, cfg.epochs
            )));
        }

        let normal = select_normal(vectors, labels, cfg.contamination_tolerance)?;
        let dropped_anomalies = vectors.len() - normal.len();

        if normal.len() < 3 {
            return Err(DetectorError::DegenerateInput(format!(
                "need at least 3 normal samples, got {}",
                normal.len()
            )));
        }
        if is_all_constant(&normal) {
            return Err(DetectorError::DegenerateInput(
                "every feature column is constant".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(cfg.seed);

        let mut standardizer = Standardizer::new();
        standardizer.fit(&normal)?;
        let matrix = standardizer.transform_matrix(&normal)?;

        // validation split
        let mut order: Vec<usize> = (0..matrix.nrows()).collect();
        order.shuffle(&mut rng);
        let val_n = cfg.validation_size(order.len()).min(order.len() - 2);
        let (val_idx, train_idx) = order.split_at(val_n);
        let validation = matrix.select(Axis(0), val_idx);
        let train = matrix.select(Axis(0), train_idx);
        log::info!(
            "Training on {} samples, validating on {} ({} labelled anomalies dropped)",
            train.nrows(), validation.nrows(), dropped_anomalies
        );

        let mut model = Autoencoder::with_rng(matrix.ncols(), &cfg.architecture, &mut rng)?;
        log::info!("Autoencoder: {} parameters", model.parameter_count());

        let mut adam = Adam::new(cfg.learning_rate);
        let mut scheduler = PlateauScheduler::new(cfg.plateau_factor, cfg.plateau_patience);

        let mut history = Vec::with_capacity(cfg.epochs);
        let mut batch_order: Vec<usize> = (0..train.nrows()).collect();

        for epoch in 1..=cfg.epochs {
            batch_order.shuffle(&mut rng);
            let mut loss_sum = 0.0f64;
            let mut seen = 0usize;
            let mut skipped = 0usize;

            for (batch_no, chunk) in batch_order.chunks(cfg.batch_size).enumerate() {
                if chunk.len() < 2 {
                    // batch-norm statistics are undefined for one row
                    skipped += 1;
                    log::debug!("Epoch {} batch {}: skipping single-row batch", epoch, batch_no);
                    continue;
                }
                let batch = train.select(Axis(0), chunk);
                let step = model.train_step(batch.view(), &mut rng);
                if !step.loss.is_finite() {
                    return Err(DetectorError::TrainingDivergence {
                        epoch,
                        batch: batch_no,
                        loss: step.loss,
                    });
                }
                adam.step(model.params_mut(), &step.gradients);
                loss_sum += step.loss as f64 * chunk.len() as f64;
                seen += chunk.len();
            }

            let train_loss = if seen > 0 { (loss_sum / seen as f64) as f32 } else { 0.0 };
            let val_loss = mean_error(&model, &validation);
            if !val_loss.is_finite() {
                return Err(DetectorError::TrainingDivergence {
                    epoch,
                    batch: batch_order.len().div_ceil(cfg.batch_size),
                    loss: val_loss,
                });
            }
            scheduler.observe(val_loss, &mut adam);

            log::info!(
                "Epoch {}/{}: train_loss={:.6} val_loss={:.6} lr={:.2e}",
                epoch, cfg.epochs, train_loss, val_loss, adam.learning_rate
            );
            history.push(EpochSummary {
                epoch,
                train_loss,
                val_loss,
                learning_rate: adam.learning_rate,
                skipped_batches: skipped,
            });
        }

        let validation_errors = model.reconstruction_errors(validation.view()).to_vec();
        let calibration = Calibration::from_errors(&validation_errors, cfg.calibration_percentile)?;
        log::info!(
            "Calibrated base threshold {:.6} (p{} of {} validation errors)",
            calibration.base_threshold, calibration.percentile, calibration.samples
        );

        let last = history.last().cloned();
        let report = TrainingReport {
            total_samples: vectors.len(),
            dropped_anomalies,
            train_samples: train.nrows(),
            validation_samples: validation.nrows(),
            epochs_run: history.len(),
            final_train_loss: last.as_ref().map(|e| e.train_loss).unwrap_or(0.0),
            final_val_loss: last.as_ref().map(|e| e.val_loss).unwrap_or(0.0),
            best_val_loss: scheduler.best(),
            final_learning_rate: adam.learning_rate,
            history,
            started_at,
            finished_at: Utc::now(),
        };

        Ok(TrainingOutcome {
            model,
            standardizer,
            calibration,
            report,
            validation_errors,
        })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Keep normal-labelled rows only
fn select_normal(
    vectors: &[FeatureVector],
    labels: Option<&[bool]>,
    tolerance: f64,
) -> DetectorResult<Vec<FeatureVector>> {
    if vectors.is_empty() {
        return Err(DetectorError::DegenerateInput("empty training set".to_string()));
    }
    let Some(labels) = labels else {
        return Ok(vectors.to_vec());
    };
    if labels.len() != vectors.len() {
        return Err(DetectorError::DimensionMismatch {
            expected: vectors.len(),
            actual: labels.len(),
        });
    }

    let anomalies = labels.iter().filter(|l| **l).count();
    if anomalies > 0 {
        let contamination = anomalies as f64 / vectors.len() as f64;
        if contamination > tolerance {
            log::info!(
                "Training set is {:.2}% anomalous, filtering to normal rows",
                contamination * 100.0
            );
        } else {
            log::warn!("Dropping {} labelled anomalies from the training set", anomalies);
        }
    }

    Ok(vectors
        .iter()
        .zip(labels)
        .filter(|(_, anomalous)| !**anomalous)
        .map(|(v, _)| v.clone())
        .collect())
}

fn is_all_constant(rows: &[FeatureVector]) -> bool {
    match rows.split_first() {
        Some((first, rest)) => rest.iter().all(|r| r.values == first.values),
        None => true,
    }
}

fn mean_error(model: &Autoencoder, rows: &Array2<f32>) -> f32 {
    model.reconstruction_errors(rows.view()).mean().unwrap_or(f32::NAN)
}
