//! Logic Module - Detection core
//!
//! - `features/` - SensorReading → FeatureVector (layout, vocabularies, history)
//! - `model/` - autoencoder, training, calibration, artifacts, decision engine
//! - `threat/` - threat levels and banding
//! - `dataset/` - labelled CSV ingestion and result export
//! - `evaluation` - offline metrics

pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod features;
pub mod model;
pub mod threat;
