//! Shared fixture: a small model trained once on fabricated normal telemetry

#![allow(dead_code)]

use std::sync::OnceLock;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gridguard_core::logic::config::EngineConfig;
use gridguard_core::logic::dataset::{Dataset, SensorRecord};
use gridguard_core::logic::features::{CategoryPolicy, CategoryTables};
use gridguard_core::logic::model::{Architecture, DecisionEngine, LoadedModel, Trainer, TrainingConfig, TrainingOutcome};
use gridguard_core::SensorRequest;

pub const ROWS_PER_STREAM: usize = 200;

/// (device_id, device_type, sensor_name, unit, nominal, tolerance, voltage_level, criticality, relative noise)
pub const STREAMS: [(&str, &str, &str, &str, f64, f64, &str, &str, f64); 4] = [
    ("SUB_001", "substation", "voltage", "V", 345_000.0, 5.0, "345kV", "critical", 0.0),
    ("SUB_002", "substation", "frequency", "Hz", 60.0, 1.0, "345kV", "high", 0.002),
    ("PUMP_01", "pump", "flow_rate", "L/s", 120.0, 10.0, "water", "normal", 0.01),
    ("RX_01", "reactor", "coolant_temp", "C", 290.0, 2.0, "nuclear", "high", 0.005),
];

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// Mid-range observation time, inside the training span
pub fn mid_time() -> DateTime<Utc> {
    start_time() + Duration::minutes(5 * ROWS_PER_STREAM as i64 / 2)
}

pub fn record(
    stream: usize,
    timestamp: DateTime<Utc>,
    value: f64,
) -> SensorRecord {
    let (device_id, device_type, sensor_name, unit, nominal, tolerance, level, criticality, _) = STREAMS[stream];
    SensorRecord {
        timestamp,
        facility_type: None,
        device_id: device_id.to_string(),
        device_type: device_type.to_string(),
        sensor_name: sensor_name.to_string(),
        sensor_value: value,
        sensor_unit: unit.to_string(),
        voltage_level: Some(level.to_string()),
        nominal_value: nominal,
        tolerance_percent: tolerance,
        criticality: criticality.to_string(),
        is_anomaly: false,
        anomaly_type: None,
        attack_type: None,
        rolling_mean_5: None,
        rolling_mean_10: None,
        rolling_mean_30: None,
        rolling_std_5: None,
        rolling_std_10: None,
        rolling_std_30: None,
        lag_1: None,
        lag_5: None,
        lag_10: None,
        rate_of_change: None,
        z_score: None,
    }
}

/// Readings every 5 minutes per stream; SUB_001 holds its nominal exactly
pub fn normal_dataset(seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(ROWS_PER_STREAM * STREAMS.len());
    for i in 0..ROWS_PER_STREAM {
        let ts = start_time() + Duration::minutes(5 * i as i64);
        for (s, stream) in STREAMS.iter().enumerate() {
            let (nominal, noise) = (stream.4, stream.8);
            let jitter: f64 = (0..4).map(|_| rng.gen_range(-1.0..1.0)).sum::<f64>() / 2.0;
            records.push(record(s, ts, nominal * (1.0 + noise * jitter)));
        }
    }
    Dataset::from_records(records)
}

pub fn training_config() -> TrainingConfig {
    TrainingConfig {
        epochs: 40,
        batch_size: 32,
        learning_rate: 0.005,
        seed: 7,
        architecture: Architecture::compact(),
        validation_fraction: 0.2,
        ..Default::default()
    }
}

pub struct Fixture {
    pub tables: CategoryTables,
    pub outcome: TrainingOutcome,
}

impl Fixture {
    pub fn loaded(&self) -> LoadedModel {
        LoadedModel::new(
            self.outcome.model.clone(),
            self.outcome.standardizer.clone(),
            self.tables.clone(),
            self.outcome.calibration.clone(),
        )
        .unwrap()
    }

    pub fn engine(&self, config: EngineConfig) -> DecisionEngine {
        DecisionEngine::with_model(config, self.loaded())
    }

    pub fn base_threshold(&self) -> f32 {
        self.outcome.calibration.base_threshold
    }
}

pub fn train(dataset: &Dataset, config: TrainingConfig) -> Fixture {
    let tables = dataset.fit_tables();
    let encoded = dataset.encode(&tables, CategoryPolicy::Strict).unwrap();
    let outcome = Trainer::new(config)
        .train(&encoded.vectors, Some(&encoded.labels))
        .unwrap();
    Fixture { tables, outcome }
}

/// Trained once per test binary
pub fn fixture() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        init_logger();
        train(&normal_dataset(11), training_config())
    })
}

pub fn request(stream: usize, value: f64) -> SensorRequest {
    let (device_id, device_type, sensor_name, unit, nominal, tolerance, level, criticality, _) = STREAMS[stream];
    SensorRequest {
        device_id: device_id.to_string(),
        sensor_name: sensor_name.to_string(),
        sensor_value: value,
        nominal_value: nominal,
        device_type: device_type.to_string(),
        voltage_level: level.to_string(),
        sensor_unit: unit.to_string(),
        tolerance_percent: tolerance,
        criticality: criticality.to_string(),
        timestamp: Some(mid_time()),
        context: None,
    }
}
