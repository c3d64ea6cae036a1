//! CSV Loader - Labelled sensor datasets
//!
//! Reads fabricated datasets, fills in time-series context per stream and
//! encodes rows into feature vectors for training or evaluation.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::error::{DetectorError, DetectorResult};
use crate::logic::features::{
    CategoryPolicy, CategoryTables, CriticalityTier, FeatureEncoder, FeatureVector,
    StreamHistories, TimeSeriesContext,
};

use super::record::SensorRecord;

/// Label attached to normal rows in per-type breakdowns
pub const NORMAL_LABEL: &str = "normal";

/// Rows of one dataset, in file order
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<SensorRecord>,
}

/// Feature matrix plus the per-row metadata evaluation needs
#[derive(Debug, Clone, Default)]
pub struct EncodedDataset {
    pub vectors: Vec<FeatureVector>,
    pub labels: Vec<bool>,
    /// Attack/anomaly type, `NORMAL_LABEL` for normal rows
    pub attack_types: Vec<String>,
    pub tiers: Vec<CriticalityTier>,
    /// Rows whose context was derived here rather than read from the file
    pub derived_contexts: usize,
    pub sanitized_values: usize,
}

impl EncodedDataset {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Row counts by label
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetSummary {
    pub rows: usize,
    pub anomalies: usize,
    pub devices: usize,
    pub streams: usize,
    pub by_type: BTreeMap<String, usize>,
}

impl Dataset {
    pub fn from_records(records: Vec<SensorRecord>) -> Self {
        Self { records }
    }

    /// Read a dataset from any CSV source with a header row
    pub fn from_reader<R: Read>(reader: R) -> DetectorResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut records = Vec::new();
        for (i, row) in csv_reader.deserialize::<SensorRecord>().enumerate() {
            let record = row.map_err(|e| {
                // header is line 1
                DetectorError::Dataset(format!("row {}: {}", i + 2, e))
            })?;
            records.push(record);
        }
        Ok(Self { records })
    }

    pub fn load_csv(path: &Path) -> DetectorResult<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| DetectorError::Dataset(format!("{}: {}", path.display(), e)))?;
        let dataset = Self::from_reader(std::io::BufReader::new(file))?;
        log::info!("Loaded {} rows from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    /// Concatenate several files (e.g. normal + attack sets)
    pub fn load_many(paths: &[&Path]) -> DetectorResult<Self> {
        let mut records = Vec::new();
        for path in paths {
            records.extend(Self::load_csv(path)?.records);
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn labels(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.is_anomaly).collect()
    }

    pub fn anomaly_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_anomaly).count()
    }

    pub fn summary(&self) -> DatasetSummary {
        let mut by_type = BTreeMap::new();
        let mut devices = std::collections::HashSet::new();
        let mut streams = std::collections::HashSet::new();
        for record in &self.records {
            *by_type.entry(type_label(record)).or_insert(0) += 1;
            devices.insert(record.device_id.as_str());
            streams.insert((record.device_id.as_str(), record.sensor_name.as_str()));
        }
        DatasetSummary {
            rows: self.records.len(),
            anomalies: self.anomaly_count(),
            devices: devices.len(),
            streams: streams.len(),
            by_type,
        }
    }

    /// Vocabularies over every row (training side)
    pub fn fit_tables(&self) -> CategoryTables {
        CategoryTables::fit(self.records.iter().map(|r| r.categorical()))
    }

    /// One context per row. Rows carrying all rolling columns keep them;
    /// the rest are derived per (device, sensor) stream in timestamp order.
    pub fn contexts(&self) -> (Vec<TimeSeriesContext>, usize) {
        let mut order: Vec<usize> = (0..self.records.len()).collect();
        order.sort_by_key(|&i| self.records[i].timestamp);

        let mut histories = StreamHistories::unbounded();
        let mut derived = 0;
        let mut out: Vec<Option<TimeSeriesContext>> = vec![None; self.records.len()];
        for i in order {
            let record = &self.records[i];
            let tracked = histories.observe(&record.device_id, &record.sensor_name, record.sensor_value);
            out[i] = Some(match record.stored_context() {
                Some(stored) => stored,
                None => {
                    derived += 1;
                    tracked
                }
            });
        }
        let contexts = out
            .into_iter()
            .map(|c| c.unwrap_or_else(|| TimeSeriesContext::approximate(0.0)))
            .collect();
        (contexts, derived)
    }

    /// Encode every row against `tables`
    pub fn encode(&self, tables: &CategoryTables, policy: CategoryPolicy) -> DetectorResult<EncodedDataset> {
        let encoder = FeatureEncoder::new(tables, policy);
        let (contexts, derived) = self.contexts();

        let mut out = EncodedDataset {
            derived_contexts: derived,
            ..Default::default()
        };
        for (record, context) in self.records.iter().zip(contexts.iter()) {
            let reading = record.to_reading();
            let encoded = encoder.encode(&reading, Some(context))?;
            out.sanitized_values += encoded.sanitized;
            out.vectors.push(encoded.vector);
            out.labels.push(record.is_anomaly);
            out.attack_types.push(type_label(record));
            out.tiers.push(reading.criticality_tier());
        }

        if derived > 0 {
            log::debug!("Derived time-series context for {} of {} rows", derived, self.records.len());
        }
        if out.sanitized_values > 0 {
            log::warn!("Replaced {} non-finite feature values with 0.0", out.sanitized_values);
        }
        Ok(out)
    }
}

fn type_label(record: &SensorRecord) -> String {
    if !record.is_anomaly {
        return NORMAL_LABEL.to_string();
    }
    record.attack_label().unwrap_or("unlabelled").to_string()
}
