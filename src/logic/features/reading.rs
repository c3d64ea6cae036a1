//! Sensor Reading - Raw telemetry records
//!
//! `SensorRequest` is the wire shape sent by the serving layer.
//! `SensorReading` is the immutable, fully-resolved record the encoder consumes.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::history::TimeSeriesContext;

// ============================================================================
// CRITICALITY
// ============================================================================

/// Device criticality tier (modulates detection sensitivity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriticalityTier {
    Critical,
    High,
    Normal,
}

impl CriticalityTier {
    /// Loose parse: anything mentioning "critical" or "high", else normal
    pub fn parse(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("critical") {
            CriticalityTier::Critical
        } else if lower.contains("high") {
            CriticalityTier::High
        } else {
            CriticalityTier::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CriticalityTier::Critical => "critical",
            CriticalityTier::High => "high",
            CriticalityTier::Normal => "normal",
        }
    }
}

impl std::fmt::Display for CriticalityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TIME FIELDS
// ============================================================================

/// Time-derived fields of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFields {
    /// 0-23
    pub hour_of_day: u32,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u32,
    /// 1-366
    pub day_of_year: u32,
}

impl TimeFields {
    pub fn from_timestamp(ts: &DateTime<Utc>) -> Self {
        Self {
            hour_of_day: ts.hour(),
            day_of_week: ts.weekday().num_days_from_monday(),
            day_of_year: ts.ordinal(),
        }
    }
}

// ============================================================================
// SENSOR READING
// ============================================================================

/// One timestamped observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub device_type: String,
    pub sensor_name: String,
    pub sensor_value: f64,
    pub sensor_unit: String,
    pub nominal_value: f64,
    pub tolerance_percent: f64,
    pub criticality: String,
    /// Voltage level (grid) or facility type (water, nuclear)
    pub voltage_level: String,
    pub time: TimeFields,
}

impl SensorReading {
    pub fn criticality_tier(&self) -> CriticalityTier {
        CriticalityTier::parse(&self.criticality)
    }

    /// `|value - nominal| / nominal`, 0 when nominal is 0
    pub fn deviation_from_nominal(&self) -> f64 {
        if self.nominal_value == 0.0 {
            0.0
        } else {
            (self.sensor_value - self.nominal_value).abs() / self.nominal_value
        }
    }

    /// `(device_id, sensor_name)` key for per-stream history
    pub fn stream_key(&self) -> (String, String) {
        (self.device_id.clone(), self.sensor_name.clone())
    }
}

// ============================================================================
// INFERENCE REQUEST
// ============================================================================

/// Inference request from the serving layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRequest {
    pub device_id: String,
    pub sensor_name: String,
    pub sensor_value: f64,
    pub nominal_value: f64,
    pub device_type: String,
    pub voltage_level: String,
    pub sensor_unit: String,
    pub tolerance_percent: f64,
    pub criticality: String,

    /// Observation time, defaults to now
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// True rolling statistics, when the caller tracks history
    #[serde(default)]
    pub context: Option<TimeSeriesContext>,
}

impl SensorRequest {
    /// Resolve defaults (timestamp) and derive time fields
    pub fn to_reading(&self) -> SensorReading {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        SensorReading {
            timestamp,
            device_id: self.device_id.clone(),
            device_type: self.device_type.clone(),
            sensor_name: self.sensor_name.clone(),
            sensor_value: self.sensor_value,
            sensor_unit: self.sensor_unit.clone(),
            nominal_value: self.nominal_value,
            tolerance_percent: self.tolerance_percent,
            criticality: self.criticality.clone(),
            voltage_level: self.voltage_level.clone(),
            time: TimeFields::from_timestamp(&timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> SensorRequest {
        SensorRequest {
            device_id: "SUB_001".to_string(),
            sensor_name: "voltage".to_string(),
            sensor_value: 345000.0,
            nominal_value: 345000.0,
            device_type: "substation".to_string(),
            voltage_level: "345kV".to_string(),
            sensor_unit: "V".to_string(),
            tolerance_percent: 5.0,
            criticality: "critical".to_string(),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap()),
            context: None,
        }
    }

    #[test]
    fn test_time_fields() {
        let reading = request().to_reading();
        assert_eq!(reading.time.hour_of_day, 14);
        // 2024-03-05 is a Tuesday
        assert_eq!(reading.time.day_of_week, 1);
        // leap year: 31 + 29 + 5
        assert_eq!(reading.time.day_of_year, 65);
    }

    #[test]
    fn test_deviation_from_nominal() {
        let mut req = request();
        assert_eq!(req.to_reading().deviation_from_nominal(), 0.0);

        req.sensor_value = 0.6 * req.nominal_value;
        assert!((req.to_reading().deviation_from_nominal() - 0.4).abs() < 1e-9);

        req.nominal_value = 0.0;
        assert_eq!(req.to_reading().deviation_from_nominal(), 0.0);
    }

    #[test]
    fn test_criticality_parse() {
        assert_eq!(CriticalityTier::parse("CRITICAL"), CriticalityTier::Critical);
        assert_eq!(CriticalityTier::parse("high"), CriticalityTier::High);
        assert_eq!(CriticalityTier::parse("normal"), CriticalityTier::Normal);
        assert_eq!(CriticalityTier::parse(""), CriticalityTier::Normal);
    }

    #[test]
    fn test_request_deserializes_without_optional_fields() {
        let json = r#"{
            "device_id": "SUB_001", "sensor_name": "voltage",
            "sensor_value": 1.0, "nominal_value": 1.0,
            "device_type": "substation", "voltage_level": "345kV",
            "sensor_unit": "V", "tolerance_percent": 5.0,
            "criticality": "high"
        }"#;
        let req: SensorRequest = serde_json::from_str(json).unwrap();
        assert!(req.timestamp.is_none());
        assert!(req.context.is_none());
    }
}
