//! Dataset Module - Labelled sensor telemetry
//!
//! Reads fabricated CSV datasets (normal + attack), derives per-stream
//! time-series context and exports scored results.

pub mod record;
pub mod loader;
pub mod export;

#[cfg(test)]
mod tests;

pub use record::{parse_timestamp_str, SensorRecord};
pub use loader::{Dataset, DatasetSummary, EncodedDataset, NORMAL_LABEL};
pub use export::ScoredRow;
