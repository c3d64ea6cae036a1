//! Feature Layout - Centralized Feature Definition
//!
//! **CRITICAL: This file controls the feature schema**
//!
//! ## Rules (NEVER break these):
//! 1. Add feature → increment FEATURE_VERSION
//! 2. Change order → increment FEATURE_VERSION
//! 3. Remove feature → increment FEATURE_VERSION
//!
//! Trained artifacts persist the column list and the layout hash. Both are
//! checked on load, so a model trained against another layout never serves.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current feature layout version
/// MUST be incremented when layout changes
pub const FEATURE_VERSION: u8 = 1;

// ============================================================================
// FEATURE LAYOUT (Authoritative source)
// ============================================================================

/// Feature names in exact order they appear in the vector
pub const FEATURE_LAYOUT: &[&str] = &[
    // === Raw reading (0-2) ===
    "sensor_value",           // 0
    "nominal_value",          // 1
    "tolerance_percent",      // 2

    // === Time (3-5) ===
    "hour_of_day",            // 3: 0-23
    "day_of_week",            // 4: 0 = Monday
    "day_of_year",            // 5: 1-366

    // === Rolling statistics (6-11) ===
    "rolling_mean_5",         // 6
    "rolling_mean_10",        // 7
    "rolling_mean_30",        // 8
    "rolling_std_5",          // 9
    "rolling_std_10",         // 10
    "rolling_std_30",         // 11

    // === Lags (12-14) ===
    "lag_1",                  // 12
    "lag_5",                  // 13
    "lag_10",                 // 14

    // === Derived (15-17) ===
    "rate_of_change",         // 15: percent change vs previous sample
    "deviation_from_nominal", // 16: |value - nominal| / nominal
    "z_score",                // 17: vs 30-sample window

    // === Encoded categorical (18-22) ===
    "device_id_encoded",      // 18
    "device_type_encoded",    // 19
    "sensor_name_encoded",    // 20
    "voltage_level_encoded",  // 21: voltage level or facility type
    "criticality_encoded",    // 22
];

/// Total number of features
/// IMPORTANT: Must match FEATURE_LAYOUT.len()!
pub const FEATURE_COUNT: usize = 23;

/// Number of leading numerical features
pub const NUMERICAL_COUNT: usize = 18;

/// Rolling windows, in layout order
pub const ROLLING_WINDOWS: [usize; 3] = [5, 10, 30];

/// Lag offsets, in layout order
pub const LAG_OFFSETS: [usize; 3] = [1, 5, 10];

// Layout indices used by the encoder
pub const IDX_SENSOR_VALUE: usize = 0;
pub const IDX_NOMINAL_VALUE: usize = 1;
pub const IDX_TOLERANCE: usize = 2;
pub const IDX_HOUR: usize = 3;
pub const IDX_WEEKDAY: usize = 4;
pub const IDX_DAY_OF_YEAR: usize = 5;
pub const IDX_ROLLING_MEAN: usize = 6;
pub const IDX_ROLLING_STD: usize = 9;
pub const IDX_LAG: usize = 12;
pub const IDX_RATE_OF_CHANGE: usize = 15;
pub const IDX_DEVIATION: usize = 16;
pub const IDX_Z_SCORE: usize = 17;
pub const IDX_CATEGORICAL: usize = NUMERICAL_COUNT;

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// Compute CRC32 hash of the feature layout
/// Used to detect layout mismatches at runtime
pub fn compute_layout_hash() -> u32 {
    let mut hasher = Hasher::new();

    hasher.update(&[FEATURE_VERSION]);

    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }

    hasher.finalize()
}

/// Get layout hash
pub fn layout_hash() -> u32 {
    compute_layout_hash()
}

// ============================================================================
// LAYOUT INFO
// ============================================================================

/// Complete layout information for serialization/logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: FEATURE_VERSION,
            hash: layout_hash(),
            feature_count: FEATURE_COUNT,
            feature_names: feature_columns(),
        }
    }
}

impl Default for LayoutInfo {
    fn default() -> Self {
        Self::current()
    }
}

/// Ordered column list as persisted next to a trained model
pub fn feature_columns() -> Vec<String> {
    FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// LAYOUT VALIDATION
// ============================================================================

/// Error when feature layout doesn't match expected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutMismatchError {
    pub expected_version: u8,
    pub expected_hash: u32,
    pub actual_version: u8,
    pub actual_hash: u32,
}

impl std::fmt::Display for LayoutMismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Feature layout mismatch: expected v{} (hash: {:08x}), got v{} (hash: {:08x})",
            self.expected_version, self.expected_hash, self.actual_version, self.actual_hash
        )
    }
}

impl std::error::Error for LayoutMismatchError {}

/// Validate that incoming data matches current layout
pub fn validate_layout(incoming_version: u8, incoming_hash: u32) -> Result<(), LayoutMismatchError> {
    let current_hash = layout_hash();

    if incoming_version != FEATURE_VERSION || incoming_hash != current_hash {
        return Err(LayoutMismatchError {
            expected_version: FEATURE_VERSION,
            expected_hash: current_hash,
            actual_version: incoming_version,
            actual_hash: incoming_hash,
        });
    }

    Ok(())
}

/// First position where a persisted column list diverges from the layout
pub fn first_column_mismatch(columns: &[String]) -> Option<(usize, String, String)> {
    let len = columns.len().max(FEATURE_COUNT);
    (0..len).find_map(|i| {
        let expected = FEATURE_LAYOUT.get(i).copied().unwrap_or("<none>");
        let actual = columns.get(i).map(String::as_str).unwrap_or("<none>");
        (expected != actual).then(|| (i, expected.to_string(), actual.to_string()))
    })
}

// ============================================================================
// FEATURE INDEX LOOKUP
// ============================================================================

/// Get feature index by name
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_LAYOUT.iter().position(|&n| n == name)
}

/// Get feature name by index
pub fn feature_name(index: usize) -> Option<&'static str> {
    FEATURE_LAYOUT.get(index).copied()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_count() {
        assert_eq!(FEATURE_LAYOUT.len(), FEATURE_COUNT);
        assert_eq!(FEATURE_COUNT - NUMERICAL_COUNT, 5);
    }

    #[test]
    fn test_layout_hash_consistency() {
        assert_eq!(compute_layout_hash(), compute_layout_hash());
        assert_ne!(layout_hash(), 0);
    }

    #[test]
    fn test_validate_layout() {
        assert!(validate_layout(FEATURE_VERSION, layout_hash()).is_ok());
        assert!(validate_layout(FEATURE_VERSION + 1, layout_hash()).is_err());
        assert!(validate_layout(FEATURE_VERSION, layout_hash() ^ 1).is_err());
    }

    #[test]
    fn test_index_constants_match_names() {
        assert_eq!(feature_index("sensor_value"), Some(IDX_SENSOR_VALUE));
        assert_eq!(feature_index("rolling_mean_5"), Some(IDX_ROLLING_MEAN));
        assert_eq!(feature_index("rolling_std_5"), Some(IDX_ROLLING_STD));
        assert_eq!(feature_index("lag_1"), Some(IDX_LAG));
        assert_eq!(feature_index("deviation_from_nominal"), Some(IDX_DEVIATION));
        assert_eq!(feature_index("z_score"), Some(IDX_Z_SCORE));
        assert_eq!(feature_index("device_id_encoded"), Some(IDX_CATEGORICAL));
        assert_eq!(feature_name(22), Some("criticality_encoded"));
        assert_eq!(feature_name(100), None);
    }

    #[test]
    fn test_column_mismatch_detection() {
        let mut columns = feature_columns();
        assert_eq!(first_column_mismatch(&columns), None);

        columns.swap(0, 1);
        let (index, expected, actual) = first_column_mismatch(&columns).unwrap();
        assert_eq!(index, 0);
        assert_eq!(expected, "sensor_value");
        assert_eq!(actual, "nominal_value");

        let short: Vec<String> = feature_columns().into_iter().take(5).collect();
        assert_eq!(first_column_mismatch(&short).unwrap().0, 5);
    }
}
