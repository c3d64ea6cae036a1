//! Evaluation - offline detection metrics on labelled data
//!
//! Confusion matrix, accuracy/precision/recall/F1, ROC-AUC over the raw
//! reconstruction errors, and a per-attack-type breakdown.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, DetectorResult};

// ============================================================================
// CONFUSION MATRIX
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: u64,
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
}

impl ConfusionMatrix {
    pub fn record(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.true_positives += 1,
            (false, false) => self.true_negatives += 1,
            (true, false) => self.false_positives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    pub fn from_predictions(predicted: &[bool], actual: &[bool]) -> DetectorResult<Self> {
        check_len(predicted.len(), actual.len())?;
        let mut m = Self::default();
        for (p, a) in predicted.iter().zip(actual) {
            m.record(*p, *a);
        }
        Ok(m)
    }

    pub fn total(&self) -> u64 {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// Also the detection rate on attack rows
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.false_positives, self.false_positives + self.true_negatives)
    }

    pub fn f1_score(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            return 0.0;
        }
        2.0 * p * r / (p + r)
    }
}

fn ratio(num: u64, denom: u64) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

fn check_len(a: usize, b: usize) -> DetectorResult<()> {
    if a != b {
        return Err(DetectorError::DimensionMismatch { expected: a, actual: b });
    }
    Ok(())
}

// ============================================================================
// ROC-AUC
// ============================================================================

/// Area under the ROC curve via the rank statistic (ties get average rank).
/// `None` when only one class is present.
pub fn roc_auc(scores: &[f32], labels: &[bool]) -> DetectorResult<Option<f64>> {
    check_len(scores.len(), labels.len())?;
    if scores.iter().any(|s| s.is_nan()) {
        return Err(DetectorError::DegenerateInput("NaN score in ROC-AUC input".to_string()));
    }
    let positives = labels.iter().filter(|l| **l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Ok(None);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0f64;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] {
                positive_rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Ok(Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n)))
}

// ============================================================================
// REPORT
// ============================================================================

/// Detection numbers for one attack type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub samples: u64,
    pub detected: u64,
    pub detection_rate: f64,
    pub mean_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub false_positive_rate: f64,
    pub roc_auc: Option<f64>,
    pub mean_error_normal: f64,
    pub mean_error_anomaly: f64,
    pub by_type: BTreeMap<String, TypeBreakdown>,
}

impl EvaluationReport {
    /// `types[i]` names the attack type of row i (normal rows included)
    pub fn compute(
        errors: &[f32],
        predicted: &[bool],
        labels: &[bool],
        types: &[String],
    ) -> DetectorResult<Self> {
        check_len(errors.len(), predicted.len())?;
        check_len(errors.len(), labels.len())?;
        check_len(errors.len(), types.len())?;
        if errors.is_empty() {
            return Err(DetectorError::DegenerateInput("no rows to evaluate".to_string()));
        }

        let confusion = ConfusionMatrix::from_predictions(predicted, labels)?;

        let mut sums = [(0.0f64, 0u64); 2];
        let mut by_type: BTreeMap<String, (u64, u64, f64)> = BTreeMap::new();
        for i in 0..errors.len() {
            let slot = &mut sums[labels[i] as usize];
            slot.0 += errors[i] as f64;
            slot.1 += 1;

            let entry = by_type.entry(types[i].clone()).or_default();
            entry.0 += 1;
            entry.1 += predicted[i] as u64;
            entry.2 += errors[i] as f64;
        }
        let mean = |(sum, n): (f64, u64)| if n == 0 { 0.0 } else { sum / n as f64 };

        Ok(Self {
            confusion,
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1_score: confusion.f1_score(),
            false_positive_rate: confusion.false_positive_rate(),
            roc_auc: roc_auc(errors, labels)?,
            mean_error_normal: mean(sums[0]),
            mean_error_anomaly: mean(sums[1]),
            by_type: by_type
                .into_iter()
                .map(|(name, (samples, detected, err_sum))| {
                    let breakdown = TypeBreakdown {
                        samples,
                        detected,
                        detection_rate: ratio(detected, samples),
                        mean_error: err_sum / samples as f64,
                    };
                    (name, breakdown)
                })
                .collect(),
        })
    }

    /// Human-readable summary for the CLI
    pub fn render(&self) -> String {
        let mut out = String::new();
        let c = &self.confusion;
        out.push_str(&format!("Samples:        {}\n", c.total()));
        out.push_str(&format!(
            "Confusion:      TP={} TN={} FP={} FN={}\n",
            c.true_positives, c.true_negatives, c.false_positives, c.false_negatives
        ));
        out.push_str(&format!("Accuracy:       {:.2}%\n", self.accuracy * 100.0));
        out.push_str(&format!("Precision:      {:.2}%\n", self.precision * 100.0));
        out.push_str(&format!("Recall:         {:.2}%\n", self.recall * 100.0));
        out.push_str(&format!("F1 score:       {:.4}\n", self.f1_score));
        out.push_str(&format!("False pos rate: {:.2}%\n", self.false_positive_rate * 100.0));
        match self.roc_auc {
            Some(auc) => out.push_str(&format!("ROC-AUC:        {:.4}\n", auc)),
            None => out.push_str("ROC-AUC:        n/a (single class)\n"),
        }
        out.push_str(&format!(
            "Mean error:     normal {:.6}, anomaly {:.6}\n",
            self.mean_error_normal, self.mean_error_anomaly
        ));
        out.push_str("By type:\n");
        for (name, b) in &self.by_type {
            out.push_str(&format!(
                "  {:<24} {:>8} rows  {:>6.2}% flagged  mean error {:.6}\n",
                name,
                b.samples,
                b.detection_rate * 100.0,
                b.mean_error
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_metrics() {
        let predicted = [true, true, false, false, true];
        let actual = [true, false, false, true, true];
        let m = ConfusionMatrix::from_predictions(&predicted, &actual).unwrap();
        assert_eq!(m.true_positives, 2);
        assert_eq!(m.false_positives, 1);
        assert_eq!(m.true_negatives, 1);
        assert_eq!(m.false_negatives, 1);
        assert!((m.accuracy() - 0.6).abs() < 1e-12);
        assert!((m.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall() - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1_score() - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.false_positive_rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_matrix_is_zero() {
        let m = ConfusionMatrix::default();
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.f1_score(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(ConfusionMatrix::from_predictions(&[true], &[true, false]).is_err());
    }

    #[test]
    fn test_roc_auc() {
        // perfect separation
        let auc = roc_auc(&[0.1, 0.2, 0.8, 0.9], &[false, false, true, true]).unwrap();
        assert_eq!(auc, Some(1.0));
        // inverted
        let auc = roc_auc(&[0.9, 0.8, 0.2, 0.1], &[false, false, true, true]).unwrap();
        assert_eq!(auc, Some(0.0));
        // all tied
        let auc = roc_auc(&[0.5; 4], &[false, true, false, true]).unwrap();
        assert_eq!(auc, Some(0.5));
        // one of four pairs misordered
        let auc = roc_auc(&[0.1, 0.6, 0.5, 0.9], &[false, false, true, true]).unwrap().unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
        // single class
        assert_eq!(roc_auc(&[0.1, 0.2], &[false, false]).unwrap(), None);
    }

    #[test]
    fn test_report_breakdown() {
        let errors = [0.1, 0.2, 5.0, 0.3, 8.0];
        let predicted = [false, false, true, false, true];
        let labels = [false, false, true, true, true];
        let types: Vec<String> = ["normal", "normal", "voltage_sag", "voltage_sag", "frequency_attack"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let report = EvaluationReport::compute(&errors, &predicted, &labels, &types).unwrap();
        assert_eq!(report.confusion.total(), 5);
        let sag = &report.by_type["voltage_sag"];
        assert_eq!(sag.samples, 2);
        assert_eq!(sag.detected, 1);
        assert!((sag.detection_rate - 0.5).abs() < 1e-12);
        assert_eq!(report.by_type["frequency_attack"].detection_rate, 1.0);
        assert_eq!(report.by_type["normal"].detected, 0);
        assert!((report.mean_error_normal - 0.15).abs() < 1e-6);
        assert!(report.roc_auc.unwrap() > 0.9);
        assert!(report.render().contains("voltage_sag"));
    }

    #[test]
    fn test_report_rejects_empty() {
        assert!(EvaluationReport::compute(&[], &[], &[], &[]).is_err());
    }
}
