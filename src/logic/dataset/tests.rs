use super::export;
use super::*;
use crate::logic::features::{CategoryPolicy, CriticalityTier};
use crate::logic::model::DetectionResult;
use crate::logic::threat::ThreatLevel;
use std::fs;
use tempfile::tempdir;

const HEADER: &str = "timestamp,facility_type,device_id,device_type,sensor_name,sensor_value,sensor_unit,voltage_level,nominal_value,tolerance_percent,criticality,is_anomaly,attack_type";

fn sample_csv() -> String {
    let mut csv = String::from(HEADER);
    csv.push('\n');
    for i in 0..6 {
        csv.push_str(&format!(
            "2024-03-01 00:0{}:00,power_grid,SUB_001,substation,voltage,{},kV,345kV,345.0,5.0,critical,0,\n",
            i,
            345.0 + i as f64
        ));
    }
    csv.push_str("2024-03-01T00:06:00Z,power_grid,SUB_001,substation,voltage,207.0,kV,345kV,345.0,5.0,critical,1,voltage_sag\n");
    csv.push_str("2024-03-01 00:03:30,water,PUMP_07,pump,flow_rate,120.5,L/s,,120.0,10.0,high,0,\n");
    csv
}

#[test]
fn test_read_records() {
    let dataset = Dataset::from_reader(sample_csv().as_bytes()).unwrap();
    assert_eq!(dataset.len(), 8);
    assert_eq!(dataset.anomaly_count(), 1);

    let sag = &dataset.records[6];
    assert!(sag.is_anomaly);
    assert_eq!(sag.attack_label(), Some("voltage_sag"));
    assert_eq!(sag.sensor_value, 207.0);

    // empty voltage_level falls back to facility_type
    let pump = &dataset.records[7];
    assert_eq!(pump.voltage_level(), "water");
    assert_eq!(pump.attack_label(), None);
    assert_eq!(pump.to_reading().criticality_tier(), CriticalityTier::High);
}

#[test]
fn test_timestamp_formats() {
    assert!(parse_timestamp_str("2024-03-01 12:30:00").is_some());
    assert!(parse_timestamp_str("2024-03-01 12:30:00.250").is_some());
    assert!(parse_timestamp_str("2024-03-01T12:30:00+02:00").is_some());
    assert!(parse_timestamp_str("yesterday").is_none());
}

#[test]
fn test_bad_row_reports_line() {
    let csv = format!("{}\nnot-a-date,x,D,t,s,1.0,u,v,1.0,5.0,normal,0,\n", HEADER);
    let err = Dataset::from_reader(csv.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("row 2"), "{err}");
}

#[test]
fn test_summary() {
    let summary = Dataset::from_reader(sample_csv().as_bytes()).unwrap().summary();
    assert_eq!(summary.rows, 8);
    assert_eq!(summary.anomalies, 1);
    assert_eq!(summary.devices, 2);
    assert_eq!(summary.streams, 2);
    assert_eq!(summary.by_type.get(NORMAL_LABEL), Some(&7));
    assert_eq!(summary.by_type.get("voltage_sag"), Some(&1));
}

#[test]
fn test_contexts_follow_stream_order() {
    let dataset = Dataset::from_reader(sample_csv().as_bytes()).unwrap();
    let (contexts, derived) = dataset.contexts();
    assert_eq!(derived, 8);

    // first voltage reading: no history, lags back-fill with itself
    assert_eq!(contexts[0].lags, [345.0; 3]);
    assert_eq!(contexts[0].rolling_std, [0.0; 3]);

    // second reading lags the first
    assert_eq!(contexts[1].lags[0], 345.0);
    assert!((contexts[1].rolling_mean[0] - 345.5).abs() < 1e-9);

    // the pump stream is independent of the substation stream
    assert_eq!(contexts[7].lags[0], 120.5);
    assert!(contexts.iter().all(|c| !c.approximated));
}

#[test]
fn test_stored_context_is_kept() {
    let csv = "timestamp,device_id,device_type,sensor_name,sensor_value,voltage_level,nominal_value,tolerance_percent,criticality,\
rolling_mean_5,rolling_mean_10,rolling_mean_30,rolling_std_5,rolling_std_10,rolling_std_30,lag_1,lag_5,lag_10,rate_of_change,z_score\n\
2024-03-01 00:00:00,D1,meter,current,10.0,13.8kV,10.0,5.0,normal,9,9,9,1,1,1,8,7,6,0.25,1.0\n";
    let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();
    let (contexts, derived) = dataset.contexts();
    assert_eq!(derived, 0);
    assert_eq!(contexts[0].lags, [8.0, 7.0, 6.0]);
    assert_eq!(contexts[0].rate_of_change, 0.25);
}

#[test]
fn test_encode_dataset() {
    let dataset = Dataset::from_reader(sample_csv().as_bytes()).unwrap();
    let tables = dataset.fit_tables();
    let encoded = dataset.encode(&tables, CategoryPolicy::Strict).unwrap();
    assert_eq!(encoded.len(), 8);
    assert_eq!(encoded.labels.iter().filter(|l| **l).count(), 1);
    assert_eq!(encoded.attack_types[6], "voltage_sag");
    assert_eq!(encoded.tiers[0], CriticalityTier::Critical);
    assert_eq!(encoded.vectors[0].get_by_name("sensor_value"), Some(345.0));
}

#[test]
fn test_encode_unseen_category_strict() {
    let train = Dataset::from_reader(sample_csv().as_bytes()).unwrap();
    let tables = train.fit_tables();

    let csv = format!("{}\n2024-03-02 00:00:00,power_grid,SUB_999,substation,voltage,345.0,kV,345kV,345.0,5.0,critical,0,\n", HEADER);
    let unseen = Dataset::from_reader(csv.as_bytes()).unwrap();
    assert!(unseen.encode(&tables, CategoryPolicy::Strict).is_err());
    assert_eq!(unseen.encode(&tables, CategoryPolicy::Lenient).unwrap().len(), 1);
}

#[test]
fn test_export_csv_and_jsonl() {
    let dir = tempdir().unwrap();
    let dataset = Dataset::from_reader(sample_csv().as_bytes()).unwrap();
    let mut result = DetectionResult::failed(&crate::error::DetectorError::NotReady);
    result.error = None;
    result.is_anomaly = true;
    result.threat_level = ThreatLevel::High;

    let rows: Vec<ScoredRow> = dataset
        .records
        .iter()
        .map(|r| ScoredRow::new(r, "normal", &result))
        .collect();

    let csv_path = dir.path().join("scored.csv");
    assert_eq!(export::export(&csv_path, &rows).unwrap(), 8);
    let content = fs::read_to_string(&csv_path).unwrap();
    assert!(content.starts_with("timestamp,device_id"));
    assert!(content.contains("HIGH"));
    assert_eq!(content.lines().count(), 9);

    let jsonl_path = dir.path().join("scored.jsonl");
    assert_eq!(export::export(&jsonl_path, &rows).unwrap(), 8);
    let first = fs::read_to_string(&jsonl_path).unwrap();
    let row: ScoredRow = serde_json::from_str(first.lines().next().unwrap()).unwrap();
    assert_eq!(row.device_id, "SUB_001");
    assert_eq!(row.threat_level, ThreatLevel::High);
}
