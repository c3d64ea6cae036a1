//! Feature Vector - Core data structure for model input
//!
//! **Versioned feature vector with layout validation**
//!
//! Uses centralized layout from `layout.rs` for:
//! - Consistent feature ordering
//! - Version tracking
//! - Layout hash for compatibility checks

use serde::{Deserialize, Serialize};

use super::encoder::{CategoryPolicy, CategoryTables};
use super::history::TimeSeriesContext;
use super::layout::*;
use super::reading::SensorReading;
use crate::error::DetectorResult;

// ============================================================================
// VERSIONED FEATURE VECTOR
// ============================================================================

/// Versioned Feature Vector with layout metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Feature layout version
    pub version: u8,
    /// CRC32 hash of the feature layout (for mismatch detection)
    pub layout_hash: u32,
    /// Feature values in order defined by FEATURE_LAYOUT
    pub values: [f32; FEATURE_COUNT],
}

impl FeatureVector {
    /// Create a new zeroed feature vector with current version
    pub fn new() -> Self {
        Self::from_values([0.0; FEATURE_COUNT])
    }

    /// Create from raw values with current version
    pub fn from_values(values: [f32; FEATURE_COUNT]) -> Self {
        Self {
            version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            values,
        }
    }

    /// Create from a slice; the length must match the layout exactly
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        let array: [f32; FEATURE_COUNT] = values.try_into().ok()?;
        Some(Self::from_values(array))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    pub fn get_by_name(&self, name: &str) -> Option<f32> {
        feature_index(name).and_then(|i| self.get(i))
    }

    pub fn set(&mut self, index: usize, value: f32) {
        if index < FEATURE_COUNT {
            self.values[index] = value;
        }
    }

    pub fn set_by_name(&mut self, name: &str, value: f32) -> bool {
        if let Some(index) = feature_index(name) {
            self.set(index, value);
            true
        } else {
            false
        }
    }

    /// Validate that this vector is compatible with current layout
    pub fn validate(&self) -> Result<(), LayoutMismatchError> {
        validate_layout(self.version, self.layout_hash)
    }

    pub fn is_compatible(&self) -> bool {
        self.validate().is_ok()
    }

    /// Replace NaN/Inf with 0.0; returns how many values were replaced
    pub fn sanitize(&mut self) -> usize {
        let mut replaced = 0;
        for v in self.values.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
                replaced += 1;
            }
        }
        replaced
    }

    /// Convert to JSON-serializable format for logging
    pub fn to_log_entry(&self) -> serde_json::Value {
        serde_json::json!({
            "feature_version": self.version,
            "layout_hash": self.layout_hash,
            "named_values": FEATURE_LAYOUT.iter()
                .zip(self.values.iter())
                .map(|(name, value)| (name.to_string(), *value))
                .collect::<std::collections::BTreeMap<_, _>>(),
        })
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::new()
    }
}

impl From<[f32; FEATURE_COUNT]> for FeatureVector {
    fn from(values: [f32; FEATURE_COUNT]) -> Self {
        Self::from_values(values)
    }
}

// ============================================================================
// FEATURE ENCODER
// ============================================================================

/// Encoder output plus metadata the decision engine reports back
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFeatures {
    pub vector: FeatureVector,
    /// Rolling/lag fields were approximated from the current value
    pub history_approximated: bool,
    /// Non-finite values replaced by 0.0
    pub sanitized: usize,
}

/// SensorReading → FeatureVector
#[derive(Debug, Clone)]
pub struct FeatureEncoder<'a> {
    tables: &'a CategoryTables,
    policy: CategoryPolicy,
}

impl<'a> FeatureEncoder<'a> {
    pub fn new(tables: &'a CategoryTables, policy: CategoryPolicy) -> Self {
        Self { tables, policy }
    }

    /// Encode a reading. Without `context` the time-series fields are
    /// approximated and the output is flagged.
    pub fn encode(
        &self,
        reading: &SensorReading,
        context: Option<&TimeSeriesContext>,
    ) -> DetectorResult<EncodedFeatures> {
        let approximated;
        let ctx = match context {
            Some(c) => {
                approximated = c.approximated;
                c.clone()
            }
            None => {
                approximated = true;
                TimeSeriesContext::approximate(reading.sensor_value)
            }
        };

        let codes = self.tables.encode(
            [
                reading.device_id.as_str(),
                reading.device_type.as_str(),
                reading.sensor_name.as_str(),
                reading.voltage_level.as_str(),
                reading.criticality.as_str(),
            ],
            self.policy,
        )?;

        let mut values = [0.0f32; FEATURE_COUNT];
        values[IDX_SENSOR_VALUE] = narrow(reading.sensor_value);
        values[IDX_NOMINAL_VALUE] = narrow(reading.nominal_value);
        values[IDX_TOLERANCE] = narrow(reading.tolerance_percent);
        values[IDX_HOUR] = reading.time.hour_of_day as f32;
        values[IDX_WEEKDAY] = reading.time.day_of_week as f32;
        values[IDX_DAY_OF_YEAR] = reading.time.day_of_year as f32;
        for i in 0..3 {
            values[IDX_ROLLING_MEAN + i] = narrow(ctx.rolling_mean[i]);
            values[IDX_ROLLING_STD + i] = narrow(ctx.rolling_std[i]);
            values[IDX_LAG + i] = narrow(ctx.lags[i]);
        }
        values[IDX_RATE_OF_CHANGE] = narrow(ctx.rate_of_change);
        values[IDX_DEVIATION] = narrow(reading.deviation_from_nominal());
        values[IDX_Z_SCORE] = narrow(ctx.z_score);
        for (i, code) in codes.iter().enumerate() {
            values[IDX_CATEGORICAL + i] = *code as f32;
        }

        let mut vector = FeatureVector::from_values(values);
        let sanitized = vector.sanitize();
        if sanitized > 0 {
            log::warn!(
                "Sanitized {} non-finite feature(s) for {}/{}",
                sanitized, reading.device_id, reading.sensor_name
            );
        }

        Ok(EncodedFeatures {
            vector,
            history_approximated: approximated,
            sanitized,
        })
    }
}

/// f64 → f32 without overflowing finite values to infinity.
/// NaN and infinities pass through for `sanitize`.
fn narrow(value: f64) -> f32 {
    if value.is_finite() {
        value.clamp(-(f32::MAX as f64), f32::MAX as f64) as f32
    } else {
        value as f32
    }
}

// ============================================================================
// TESTS
// ============================================================================
