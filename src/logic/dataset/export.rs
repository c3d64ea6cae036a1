//! Result export - scored rows as CSV or JSONL

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DetectorResult;
use crate::logic::model::DetectionResult;
use crate::logic::threat::ThreatLevel;

use super::record::SensorRecord;

/// One scored dataset row, flattened for CSV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow {
    pub timestamp: String,
    pub device_id: String,
    pub sensor_name: String,
    pub sensor_value: f64,
    pub label: bool,
    pub attack_type: String,
    pub is_anomaly: bool,
    pub reconstruction_error: f32,
    pub threshold: f32,
    pub anomaly_score: f32,
    pub confidence: f32,
    pub threat_level: ThreatLevel,
}

impl ScoredRow {
    pub fn new(record: &SensorRecord, attack_type: &str, result: &DetectionResult) -> Self {
        Self {
            timestamp: record.timestamp.to_rfc3339(),
            device_id: record.device_id.clone(),
            sensor_name: record.sensor_name.clone(),
            sensor_value: record.sensor_value,
            label: record.is_anomaly,
            attack_type: attack_type.to_string(),
            is_anomaly: result.is_anomaly,
            reconstruction_error: result.reconstruction_error,
            threshold: result.threshold,
            anomaly_score: result.anomaly_score,
            confidence: result.confidence,
            threat_level: result.threat_level,
        }
    }
}

/// Write rows as CSV with a header. Returns the row count.
pub fn to_csv(path: &Path, rows: &[ScoredRow]) -> DetectorResult<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::info!("Exported {} scored rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

/// One JSON object per line
pub fn to_jsonl(path: &Path, rows: &[ScoredRow]) -> DetectorResult<usize> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    log::info!("Exported {} scored rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

/// Pick the format from the extension (`.jsonl` → JSONL, else CSV)
pub fn export(path: &Path, rows: &[ScoredRow]) -> DetectorResult<usize> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") => to_jsonl(path, rows),
        _ => to_csv(path, rows),
    }
}
