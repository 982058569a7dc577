//! Held-out splits and binary classification metrics.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Split row indices into (kept, held out), preserving the label ratio.
///
/// Each class contributes `round(fraction * class_size)` rows to the held-out
/// side. Both index lists are returned in ascending order.
pub fn stratified_split(labels: &[u8], fraction: f64, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut kept = Vec::with_capacity(labels.len());
    let mut held_out = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(rng);

        let take = ((members.len() as f64) * fraction).round() as usize;
        held_out.extend_from_slice(&members[..take]);
        kept.extend_from_slice(&members[take..]);
    }

    kept.sort_unstable();
    held_out.sort_unstable();
    (kept, held_out)
}

/// Confusion counts at a fixed decision threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

/// Held-out performance of the risk classifier against the proxy label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Area under the ROC curve; absent when only one class is present.
    pub auc_roc: Option<f64>,
    /// Accuracy at a 0.5 threshold.
    pub accuracy: f64,
    /// FN / (FN + TP); 0 when there are no positives.
    pub false_negative_rate: f64,
    pub confusion: ConfusionMatrix,
    pub support: usize,
}

pub const DECISION_THRESHOLD: f64 = 0.5;

pub fn evaluate(probabilities: &[f64], labels: &[u8]) -> EvaluationMetrics {
    let mut confusion = ConfusionMatrix::default();
    for (p, label) in probabilities.iter().zip(labels) {
        let predicted = *p >= DECISION_THRESHOLD;
        match (*label == 1, predicted) {
            (false, false) => confusion.true_negative += 1,
            (false, true) => confusion.false_positive += 1,
            (true, false) => confusion.false_negative += 1,
            (true, true) => confusion.true_positive += 1,
        }
    }

    let support = labels.len();
    let correct = confusion.true_positive + confusion.true_negative;
    let accuracy = if support == 0 {
        0.0
    } else {
        correct as f64 / support as f64
    };
    let positives = confusion.false_negative + confusion.true_positive;
    let false_negative_rate = if positives == 0 {
        0.0
    } else {
        confusion.false_negative as f64 / positives as f64
    };

    EvaluationMetrics {
        auc_roc: auc_roc(probabilities, labels),
        accuracy,
        false_negative_rate,
        confusion,
        support,
    }
}

/// Mann-Whitney AUC with average ranks for tied scores.
pub fn auc_roc(scores: &[f64], labels: &[u8]) -> Option<f64> {
    let positives = labels.iter().filter(|l| **l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| {
        scores[*a]
            .partial_cmp(&scores[*b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        // 1-based ranks; a tied group shares the mean of its positions.
        let average = (start + end) as f64 / 2.0 + 1.0;
        for &index in &order[start..=end] {
            ranks[index] = average;
        }
        start = end + 1;
    }

    let positive_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, label)| **label == 1)
        .map(|(rank, _)| rank)
        .sum();
    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Some(u / (p * negatives as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let labels = [0, 0, 1, 1];
        assert_eq!(auc_roc(&[0.1, 0.2, 0.8, 0.9], &labels), Some(1.0));
        assert_eq!(auc_roc(&[0.9, 0.8, 0.2, 0.1], &labels), Some(0.0));
    }

    #[test]
    fn test_auc_ties_count_half() {
        let labels = [0, 1];
        assert_eq!(auc_roc(&[0.5, 0.5], &labels), Some(0.5));
    }

    #[test]
    fn test_auc_undefined_for_single_class() {
        assert_eq!(auc_roc(&[0.1, 0.7], &[0, 0]), None);
    }

    #[test]
    fn test_confusion_and_rates() {
        let metrics = evaluate(&[0.9, 0.2, 0.6, 0.1], &[1, 1, 0, 0]);
        assert_eq!(metrics.confusion.true_positive, 1);
        assert_eq!(metrics.confusion.false_negative, 1);
        assert_eq!(metrics.confusion.false_positive, 1);
        assert_eq!(metrics.confusion.true_negative, 1);
        assert_eq!(metrics.accuracy, 0.5);
        assert_eq!(metrics.false_negative_rate, 0.5);
    }

    #[test]
    fn test_false_negative_rate_without_positives() {
        let metrics = evaluate(&[0.1, 0.2], &[0, 0]);
        assert_eq!(metrics.false_negative_rate, 0.0);
        assert_eq!(metrics.auc_roc, None);
    }

    #[test]
    fn test_stratified_split_preserves_ratio() {
        let labels: Vec<u8> = (0..100).map(|i| if i < 30 { 1 } else { 0 }).collect();
        let mut rng = StdRng::seed_from_u64(42);
        let (kept, held_out) = stratified_split(&labels, 0.2, &mut rng);

        assert_eq!(kept.len() + held_out.len(), 100);
        assert_eq!(held_out.len(), 20);
        assert_eq!(held_out.iter().filter(|i| labels[**i] == 1).count(), 6);
        assert!(held_out.windows(2).all(|w| w[0] < w[1]));
    }
}
