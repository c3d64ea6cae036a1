//! Threat Banding Rules
//!
//! Ratio bands for mapping `error / threshold` to a threat level.
//! Constants and config only, the classify logic lives in `classifier`.

use serde::{Deserialize, Serialize};

// ============================================================================
// BANDS (ratio = reconstruction_error / effective_threshold)
// ============================================================================

/// Above this ratio = CRITICAL
pub const CRITICAL_RATIO: f32 = 10.0;

/// Above this ratio = HIGH
pub const HIGH_RATIO: f32 = 5.0;

/// Above this ratio = MEDIUM, at or below = LOW
pub const MEDIUM_RATIO: f32 = 2.0;

/// Minimum confidence reported for a normal verdict
pub const NORMAL_CONFIDENCE_FLOOR: f32 = crate::constants::NORMAL_CONFIDENCE_FLOOR;

// ============================================================================
// CONFIGURABLE BANDS
// ============================================================================

/// Ratio bands (configurable). Each bound is exclusive on the lower side:
/// a ratio exactly on a bound stays in the lower band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandThresholds {
    pub critical_above: f32,
    pub high_above: f32,
    pub medium_above: f32,
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self {
            critical_above: CRITICAL_RATIO,
            high_above: HIGH_RATIO,
            medium_above: MEDIUM_RATIO,
        }
    }
}

impl BandThresholds {
    /// Bands must be strictly increasing and positive
    pub fn is_valid(&self) -> bool {
        self.medium_above > 0.0
            && self.medium_above < self.high_above
            && self.high_above < self.critical_above
    }
}
