//! Threat Types
//!
//! Core types for threat classification. No logic here, only data.

use serde::{Deserialize, Serialize};

// ============================================================================
// THREAT LEVEL
// ============================================================================

/// Threat level attached to every verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    /// Not anomalous
    #[default]
    Normal,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Normal => "NORMAL",
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        }
    }

    pub fn severity_level(&self) -> u8 {
        match self {
            ThreatLevel::Normal => 0,
            ThreatLevel::Low => 1,
            ThreatLevel::Medium => 2,
            ThreatLevel::High => 3,
            ThreatLevel::Critical => 4,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            ThreatLevel::Normal => "#10b981",   // Green
            ThreatLevel::Low => "#3b82f6",      // Blue
            ThreatLevel::Medium => "#f59e0b",   // Yellow
            ThreatLevel::High => "#f97316",     // Orange
            ThreatLevel::Critical => "#ef4444", // Red
        }
    }

    pub fn is_alert(&self) -> bool {
        *self != ThreatLevel::Normal
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ThreatLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NORMAL" => Ok(ThreatLevel::Normal),
            "LOW" => Ok(ThreatLevel::Low),
            "MEDIUM" => Ok(ThreatLevel::Medium),
            "HIGH" => Ok(ThreatLevel::High),
            "CRITICAL" => Ok(ThreatLevel::Critical),
            other => Err(format!("unknown threat level: {}", other)),
        }
    }
}

// ============================================================================
// ASSESSMENT
// ============================================================================

/// Classifier output for one reconstruction error
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub is_anomaly: bool,
    /// error / threshold
    pub anomaly_score: f32,
    /// 0.0 - 1.0
    pub confidence: f32,
    pub threat_level: ThreatLevel,
}

impl Default for ThreatAssessment {
    fn default() -> Self {
        Self {
            is_anomaly: false,
            anomaly_score: 0.0,
            confidence: 0.0,
            threat_level: ThreatLevel::Normal,
        }
    }
}
