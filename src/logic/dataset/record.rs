use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::logic::features::{SensorReading, TimeFields, TimeSeriesContext};

/// One row of a fabricated sensor dataset (CSV)
///
/// Columns beyond the raw reading are optional: rolling/lag columns are
/// derived per stream when absent, labels default to normal.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SensorRecord {
    #[serde(deserialize_with = "parse_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub facility_type: Option<String>,
    pub device_id: String,
    pub device_type: String,
    pub sensor_name: String,
    pub sensor_value: f64,
    #[serde(default)]
    pub sensor_unit: String,
    /// Falls back to `facility_type` for water/nuclear rows
    #[serde(default)]
    pub voltage_level: Option<String>,
    pub nominal_value: f64,
    pub tolerance_percent: f64,
    pub criticality: String,

    // Labels
    #[serde(default, deserialize_with = "parse_flag")]
    pub is_anomaly: bool,
    #[serde(default)]
    pub anomaly_type: Option<String>,
    #[serde(default)]
    pub attack_type: Option<String>,

    // Pre-computed time-series columns
    #[serde(default)]
    pub rolling_mean_5: Option<f64>,
    #[serde(default)]
    pub rolling_mean_10: Option<f64>,
    #[serde(default)]
    pub rolling_mean_30: Option<f64>,
    #[serde(default)]
    pub rolling_std_5: Option<f64>,
    #[serde(default)]
    pub rolling_std_10: Option<f64>,
    #[serde(default)]
    pub rolling_std_30: Option<f64>,
    #[serde(default)]
    pub lag_1: Option<f64>,
    #[serde(default)]
    pub lag_5: Option<f64>,
    #[serde(default)]
    pub lag_10: Option<f64>,
    #[serde(default)]
    pub rate_of_change: Option<f64>,
    #[serde(default)]
    pub z_score: Option<f64>,
}

impl SensorRecord {
    pub fn voltage_level(&self) -> &str {
        self.voltage_level
            .as_deref()
            .filter(|v| !v.is_empty())
            .or(self.facility_type.as_deref())
            .unwrap_or("")
    }

    /// Attack label, whichever column carries it
    pub fn attack_label(&self) -> Option<&str> {
        self.attack_type
            .as_deref()
            .or(self.anomaly_type.as_deref())
            .filter(|t| !t.is_empty())
    }

    pub fn to_reading(&self) -> SensorReading {
        SensorReading {
            timestamp: self.timestamp,
            device_id: self.device_id.clone(),
            device_type: self.device_type.clone(),
            sensor_name: self.sensor_name.clone(),
            sensor_value: self.sensor_value,
            sensor_unit: self.sensor_unit.clone(),
            nominal_value: self.nominal_value,
            tolerance_percent: self.tolerance_percent,
            criticality: self.criticality.clone(),
            voltage_level: self.voltage_level().to_string(),
            time: TimeFields::from_timestamp(&self.timestamp),
        }
    }

    /// Context from the CSV columns, only when every one is present
    pub fn stored_context(&self) -> Option<TimeSeriesContext> {
        Some(TimeSeriesContext {
            rolling_mean: [self.rolling_mean_5?, self.rolling_mean_10?, self.rolling_mean_30?],
            rolling_std: [self.rolling_std_5?, self.rolling_std_10?, self.rolling_std_30?],
            lags: [self.lag_1?, self.lag_5?, self.lag_10?],
            rate_of_change: self.rate_of_change?,
            z_score: self.z_score?,
            approximated: false,
        })
    }

    /// Categorical fields in layout order
    pub fn categorical(&self) -> [&str; 5] {
        [
            self.device_id.as_str(),
            self.device_type.as_str(),
            self.sensor_name.as_str(),
            self.voltage_level(),
            self.criticality.as_str(),
        ]
    }
}

/// RFC 3339 or `YYYY-MM-DD HH:MM:SS[.f]` (assumed UTC)
pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp_str(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp '{}'", raw)))
}

/// `0`/`1`, `true`/`false`, empty = false
fn parse_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_lowercase().as_str() {
        "" | "0" | "0.0" | "false" | "no" => Ok(false),
        "1" | "1.0" | "true" | "yes" => Ok(true),
        other => Err(serde::de::Error::custom(format!("invalid label '{}'", other))),
    }
}
