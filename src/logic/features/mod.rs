//! Features Module - Feature Preparation Engine
//!
//! Raw `SensorReading` → fixed-layout `FeatureVector`.
//!
//! - `layout`: authoritative column order + layout hash
//! - `reading`: sensor records and inference requests
//! - `history`: rolling/lag statistics (tracked or approximated)
//! - `encoder`: categorical vocabularies
//! - `vector`: versioned vector + `FeatureEncoder`

pub mod layout;
pub mod reading;
pub mod history;
pub mod encoder;
pub mod vector;


// Re-export common types
pub use layout::{FEATURE_COUNT, FEATURE_LAYOUT, FEATURE_VERSION};
pub use reading::{CriticalityTier, SensorReading, SensorRequest, TimeFields};
pub use history::{SensorHistory, StreamHistories, TimeSeriesContext};
pub use encoder::{CategoricalEncoder, CategoryPolicy, CategoryTables, CATEGORICAL_FIELDS};
pub use vector::{EncodedFeatures, FeatureEncoder, FeatureVector};
