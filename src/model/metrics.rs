//! Binary classification metrics.

use serde::{Deserialize, Serialize};

use crate::ports::Classifier;

/// Counts at a fixed decision threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    #[must_use]
    pub fn from_predictions(labels: &[bool], predictions: &[bool]) -> Self {
        let mut cm = Self::default();
        for (&actual, &predicted) in labels.iter().zip(predictions) {
            match (actual, predicted) {
                (false, false) => cm.true_negatives += 1,
                (false, true) => cm.false_positives += 1,
                (true, false) => cm.false_negatives += 1,
                (true, true) => cm.true_positives += 1,
            }
        }
        cm
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Evaluation summary of a classifier on a labelled set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `None` when only one class is present
    pub roc_auc: Option<f64>,
    pub confusion: ConfusionMatrix,
    pub samples: usize,
}

impl EvaluationMetrics {
    /// Metrics for probabilities scored at `threshold` (inclusive).
    #[must_use]
    pub fn from_probabilities(labels: &[bool], probabilities: &[f64], threshold: f64) -> Self {
        let predictions: Vec<bool> = probabilities.iter().map(|p| *p >= threshold).collect();
        let cm = ConfusionMatrix::from_predictions(labels, &predictions);

        let precision = ratio(cm.true_positives, cm.true_positives + cm.false_positives);
        let recall = ratio(cm.true_positives, cm.true_positives + cm.false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: ratio(cm.true_positives + cm.true_negatives, cm.total()),
            precision,
            recall,
            f1,
            roc_auc: roc_auc(labels, probabilities),
            confusion: cm,
            samples: labels.len(),
        }
    }

    /// Score every row with `model` and evaluate.
    #[must_use]
    pub fn evaluate<C: Classifier + ?Sized>(
        model: &C,
        rows: &[Vec<f64>],
        labels: &[bool],
        threshold: f64,
    ) -> Self {
        Self::from_probabilities(labels, &model.predict_proba_batch(rows), threshold)
    }

    /// Element-wise mean. ROC-AUC is averaged over the folds that have one.
    #[must_use]
    pub fn mean(all: &[Self]) -> Option<Self> {
        if all.is_empty() {
            return None;
        }
        let n = all.len() as f64;
        let avg = |f: fn(&Self) -> f64| all.iter().map(f).sum::<f64>() / n;
        let aucs: Vec<f64> = all.iter().filter_map(|m| m.roc_auc).collect();
        let mut confusion = ConfusionMatrix::default();
        for m in all {
            confusion.true_negatives += m.confusion.true_negatives;
            confusion.false_positives += m.confusion.false_positives;
            confusion.false_negatives += m.confusion.false_negatives;
            confusion.true_positives += m.confusion.true_positives;
        }

        Some(Self {
            accuracy: avg(|m| m.accuracy),
            precision: avg(|m| m.precision),
            recall: avg(|m| m.recall),
            f1: avg(|m| m.f1),
            roc_auc: if aucs.is_empty() {
                None
            } else {
                Some(aucs.iter().sum::<f64>() / aucs.len() as f64)
            },
            confusion,
            samples: all.iter().map(|m| m.samples).sum(),
        })
    }
}

/// Area under the ROC curve (Mann-Whitney statistic, ties count half).
#[must_use]
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|l| **l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut ranked: Vec<(f64, bool)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Average ranks over tied groups.
    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < ranked.len() {
        let mut j = i;
        while j + 1 < ranked.len() && ranked[j + 1].0 == ranked[i].0 {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum_pos += avg_rank * ranked[i..=j].iter().filter(|(_, l)| *l).count() as f64;
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((rank_sum_pos - p * (p + 1.0) / 2.0) / (p * n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_and_rates() {
        let labels = [true, true, false, false, true];
        let probs = [0.9, 0.4, 0.6, 0.1, 0.5];
        let m = EvaluationMetrics::from_probabilities(&labels, &probs, 0.5);
        assert_eq!(
            m.confusion,
            ConfusionMatrix {
                true_negatives: 1,
                false_positives: 1,
                false_negatives: 1,
                true_positives: 2,
            }
        );
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_perfect_and_inverted() {
        let labels = [false, false, true, true];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
    }

    #[test]
    fn test_roc_auc_ties_count_half() {
        let labels = [false, true];
        assert_eq!(roc_auc(&labels, &[0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[true, true], &[0.1, 0.2]), None);
    }

    #[test]
    fn test_roc_auc_mixed() {
        // sklearn.metrics.roc_auc_score([0, 0, 1, 1], [0.1, 0.4, 0.35, 0.8]) == 0.75
        let labels = [false, false, true, true];
        let auc = roc_auc(&labels, &[0.1, 0.4, 0.35, 0.8]).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_mean_of_folds() {
        let a = EvaluationMetrics::from_probabilities(&[true, false], &[0.9, 0.1], 0.5);
        let b = EvaluationMetrics::from_probabilities(&[true, true], &[0.9, 0.1], 0.5);
        let mean = EvaluationMetrics::mean(&[a, b]).unwrap();
        assert!((mean.accuracy - 0.75).abs() < 1e-12);
        assert_eq!(mean.roc_auc, Some(1.0));
        assert_eq!(mean.samples, 4);
        assert!(EvaluationMetrics::mean(&[]).is_none());
    }
}
