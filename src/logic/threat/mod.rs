//! Threat Module
//!
//! Maps a reconstruction error and the effective threshold to a verdict:
//! anomaly flag, ratio score, confidence and threat level.
//!
//! ## Structure
//! - `types`: Core types (ThreatLevel, ThreatAssessment)
//! - `rules`: Ratio bands and constants
//! - `classifier`: Classification logic
//!
//! ## Usage
//! ```ignore
//! use crate::logic::threat::{classify, ThreatLevel};
//!
//! let verdict = classify(error, threshold);
//! if verdict.threat_level >= ThreatLevel::High {
//!     // escalate
//! }
//! ```

pub mod types;
pub mod rules;
pub mod classifier;

pub use types::{ThreatAssessment, ThreatLevel};

pub use rules::{BandThresholds, CRITICAL_RATIO, HIGH_RATIO, MEDIUM_RATIO};

pub use classifier::{classify, classify_with_bands, confidence, level_for_ratio, saturate_error};
