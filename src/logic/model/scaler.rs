//! Standardizer - per-feature z-score normalization
//!
//! Fitted once on the normal training set, then frozen. Zero-variance
//! features keep a unit scale so they pass through centred but unscaled.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, DetectorResult};
use crate::logic::features::{FeatureVector, FEATURE_COUNT};

/// Learned mean/std per feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizationParameters {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
    pub samples: usize,
}

impl StandardizationParameters {
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Lengths match the layout, means are finite, stds finite and positive
    pub fn validate(&self) -> DetectorResult<()> {
        if self.mean.len() != FEATURE_COUNT || self.std.len() != FEATURE_COUNT {
            return Err(DetectorError::DimensionMismatch {
                expected: FEATURE_COUNT,
                actual: self.mean.len().min(self.std.len()),
            });
        }
        if let Some(i) = self.mean.iter().position(|m| !m.is_finite()) {
            return Err(DetectorError::DegenerateInput(format!("feature {i}: non-finite mean")));
        }
        if let Some(i) = self.std.iter().position(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(DetectorError::DegenerateInput(format!(
                "feature {i}: std {} is not finite and positive",
                self.std[i]
            )));
        }
        Ok(())
    }

    /// Population statistics over rows (one row per sample)
    pub fn from_rows(rows: &[FeatureVector]) -> DetectorResult<Self> {
        if rows.is_empty() {
            return Err(DetectorError::DegenerateInput(
                "cannot fit standardizer on an empty set".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut mean = [0.0f64; FEATURE_COUNT];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.values.iter()) {
                *m += *v as f64;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = [0.0f64; FEATURE_COUNT];
        for row in rows {
            for (i, v) in row.values.iter().enumerate() {
                var[i] += (*v as f64 - mean[i]).powi(2);
            }
        }

        let std = var
            .iter()
            .map(|s| {
                let sd = (s / n).sqrt();
                if sd > f64::EPSILON { sd as f32 } else { 1.0 }
            })
            .collect();

        Ok(Self {
            mean: mean.iter().map(|m| *m as f32).collect(),
            std,
            samples: rows.len(),
        })
    }
}

/// Fit/transform wrapper
#[derive(Debug, Clone, Default)]
pub struct Standardizer {
    params: Option<StandardizationParameters>,
}

impl Standardizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: StandardizationParameters) -> DetectorResult<Self> {
        params.validate()?;
        Ok(Self { params: Some(params) })
    }

    pub fn fit(&mut self, rows: &[FeatureVector]) -> DetectorResult<&StandardizationParameters> {
        let params = StandardizationParameters::from_rows(rows)?;
        log::info!("Standardizer fitted on {} samples", params.samples);
        Ok(self.params.insert(params))
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    pub fn params(&self) -> Option<&StandardizationParameters> {
        self.params.as_ref()
    }

    pub fn transform(&self, vector: &FeatureVector) -> DetectorResult<FeatureVector> {
        let params = self.params.as_ref().ok_or(DetectorError::NotFitted)?;
        let mut out = vector.clone();
        for (i, v) in out.values.iter_mut().enumerate() {
            *v = (*v - params.mean[i]) / params.std[i];
        }
        Ok(out)
    }

    /// Undo `transform` for a single standardized row
    pub fn inverse_row(&self, row: ArrayView1<f32>) -> DetectorResult<Vec<f32>> {
        let params = self.params.as_ref().ok_or(DetectorError::NotFitted)?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(i, v)| v * params.std[i] + params.mean[i])
            .collect())
    }

    /// Standardize a batch into an (n, D) matrix
    pub fn transform_matrix(&self, rows: &[FeatureVector]) -> DetectorResult<Array2<f32>> {
        let params = self.params.as_ref().ok_or(DetectorError::NotFitted)?;
        let mut out = Array2::<f32>::zeros((rows.len(), FEATURE_COUNT));
        for (r, row) in rows.iter().enumerate() {
            for (c, v) in row.values.iter().enumerate() {
                out[[r, c]] = (v - params.mean[c]) / params.std[c];
            }
        }
        Ok(out)
    }
}
