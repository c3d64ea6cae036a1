//! Categorical Encoding
//!
//! Sorted vocabulary → index, fit once at training time. Indices follow the
//! sorted order of the vocabulary, so the same training set always yields the
//! same table. Index `vocabulary.len()` is reserved for unseen categories.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, DetectorResult};

/// Categorical fields, in layout order
pub const CATEGORICAL_FIELDS: [&str; 5] = [
    "device_id",
    "device_type",
    "sensor_name",
    "voltage_level",
    "criticality",
];

// ============================================================================
// POLICY
// ============================================================================

/// What to do with a category not seen during training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryPolicy {
    /// Fail the sample with `UnknownCategory`
    Strict,
    /// Map to the reserved sentinel index
    #[default]
    Lenient,
}

// ============================================================================
// SINGLE FIELD ENCODER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    classes: BTreeMap<String, u32>,
}

impl CategoricalEncoder {
    /// Fit on every value observed for one field
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let sorted: BTreeSet<&str> = values.into_iter().collect();
        let classes = sorted
            .into_iter()
            .enumerate()
            .map(|(i, v)| (v.to_string(), i as u32))
            .collect();
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Reserved index for unseen values
    pub fn sentinel(&self) -> u32 {
        self.classes.len() as u32
    }

    pub fn get(&self, value: &str) -> Option<u32> {
        self.classes.get(value).copied()
    }

    /// Inverse lookup
    pub fn decode(&self, index: u32) -> Option<&str> {
        self.classes
            .iter()
            .find(|(_, i)| **i == index)
            .map(|(k, _)| k.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}

// ============================================================================
// ALL TABLES
// ============================================================================

/// One encoder per categorical field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTables {
    pub device_id: CategoricalEncoder,
    pub device_type: CategoricalEncoder,
    pub sensor_name: CategoricalEncoder,
    pub voltage_level: CategoricalEncoder,
    pub criticality: CategoricalEncoder,
}

impl CategoryTables {
    /// Fit all tables from the raw categorical columns
    pub fn fit<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = [&'a str; 5]> + Clone,
    {
        let column = |idx: usize| CategoricalEncoder::fit(rows.clone().into_iter().map(move |r| r[idx]));
        Self {
            device_id: column(0),
            device_type: column(1),
            sensor_name: column(2),
            voltage_level: column(3),
            criticality: column(4),
        }
    }

    /// Tables in layout order
    pub fn tables(&self) -> [&CategoricalEncoder; 5] {
        [
            &self.device_id,
            &self.device_type,
            &self.sensor_name,
            &self.voltage_level,
            &self.criticality,
        ]
    }

    /// Encode the five categorical values (layout order)
    pub fn encode(&self, values: [&str; 5], policy: CategoryPolicy) -> DetectorResult<[u32; 5]> {
        let mut out = [0u32; 5];
        for (i, (table, value)) in self.tables().iter().zip(values.iter()).enumerate() {
            out[i] = match (table.get(value), policy) {
                (Some(idx), _) => idx,
                (None, CategoryPolicy::Strict) => {
                    return Err(DetectorError::UnknownCategory {
                        field: CATEGORICAL_FIELDS[i].to_string(),
                        value: value.to_string(),
                    });
                }
                (None, CategoryPolicy::Lenient) => {
                    log::debug!(
                        "Unseen {} '{}' mapped to sentinel {}",
                        CATEGORICAL_FIELDS[i], value, table.sentinel()
                    );
                    table.sentinel()
                }
            };
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.tables().iter().all(|t| t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_sorted_and_bijective() {
        let enc = CategoricalEncoder::fit(["b", "a", "c", "a"]);
        assert_eq!(enc.len(), 3);
        assert_eq!(enc.get("a"), Some(0));
        assert_eq!(enc.get("b"), Some(1));
        assert_eq!(enc.get("c"), Some(2));
        assert_eq!(enc.decode(1), Some("b"));
        assert_eq!(enc.sentinel(), 3);
        assert_eq!(enc.get("zzz"), None);
    }

    fn tables() -> CategoryTables {
        let rows = vec![
            ["SUB_001", "substation", "voltage", "345kV", "critical"],
            ["SUB_002", "substation", "current", "345kV", "high"],
            ["GEN_001", "generator", "frequency", "138kV", "normal"],
        ];
        CategoryTables::fit(rows)
    }

    #[test]
    fn test_encode_known() {
        let t = tables();
        let codes = t
            .encode(["SUB_002", "substation", "voltage", "138kV", "normal"], CategoryPolicy::Strict)
            .unwrap();
        // GEN_001 < SUB_001 < SUB_002
        assert_eq!(codes[0], 2);
        assert_eq!(codes[1], 1);
        assert_eq!(codes[3], 0);
    }

    #[test]
    fn test_unknown_strict_fails() {
        let t = tables();
        let err = t
            .encode(["NEW_999", "substation", "voltage", "345kV", "high"], CategoryPolicy::Strict)
            .unwrap_err();
        match err {
            DetectorError::UnknownCategory { field, value } => {
                assert_eq!(field, "device_id");
                assert_eq!(value, "NEW_999");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_lenient_maps_to_sentinel() {
        let t = tables();
        let codes = t
            .encode(["NEW_999", "substation", "voltage", "345kV", "high"], CategoryPolicy::Lenient)
            .unwrap();
        assert_eq!(codes[0], t.device_id.sentinel());
    }

    #[test]
    fn test_serde_round_trip_preserves_indices() {
        let t = tables();
        let json = serde_json::to_string(&t).unwrap();
        let back: CategoryTables = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
