//! Model quality metrics: confusion matrix, rates and ROC AUC.

use crate::error::Result;
use crate::models::inference::FraudClassifier;
use crate::types::transaction::{Label, LabeledDataset};
use serde::Serialize;
use tracing::info;

/// Counts of predicted vs actual labels, fraud being the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    /// Build from paired actual/predicted labels
    pub fn from_labels(actual: &[Label], predicted: &[Label]) -> Self {
        let mut matrix = Self::default();
        for (a, p) in actual.iter().zip(predicted) {
            matrix.record(*a, *p);
        }
        matrix
    }

    /// Record one prediction
    pub fn record(&mut self, actual: Label, predicted: Label) {
        match (actual, predicted) {
            (Label::Fraud, Label::Fraud) => self.true_positive += 1,
            (Label::Legitimate, Label::Legitimate) => self.true_negative += 1,
            (Label::Legitimate, Label::Fraud) => self.false_positive += 1,
            (Label::Fraud, Label::Legitimate) => self.false_negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.true_negative + self.false_positive + self.false_negative
    }

    /// Share of correct predictions
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    /// True positive rate (recall on fraud)
    pub fn sensitivity(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    /// True negative rate
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negative, self.true_negative + self.false_positive)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.sensitivity());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Area under the ROC curve from fraud scores.
///
/// Uses the rank-sum form, averaging ranks over tied scores. `None` when
/// only one class is present.
pub fn roc_auc(actual: &[Label], scores: &[f64]) -> Option<f64> {
    let n = actual.len().min(scores.len());
    let positives = actual[..n].iter().filter(|l| **l == Label::Fraud).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; ties share the mean of their positions
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if actual[idx] == Label::Fraud {
                rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

/// Quality of a model on one labelled dataset
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub sensitivity: f64,
    pub specificity: f64,
    pub precision: f64,
    pub f1: f64,
    pub roc_auc: Option<f64>,
}

impl EvaluationReport {
    /// Log a framed summary
    pub fn log_summary(&self) {
        let m = &self.confusion;
        info!("╔══════════════════════════════════════════════════════╗");
        info!("║              FRAUD MODEL - EVALUATION                ║");
        info!("╠══════════════════════════════════════════════════════╣");
        info!("║ Samples: {:>8}                                    ║", self.samples);
        info!(
            "║ TP={:>6}  TN={:>6}  FP={:>6}  FN={:>6}          ║",
            m.true_positive, m.true_negative, m.false_positive, m.false_negative
        );
        info!("╠══════════════════════════════════════════════════════╣");
        info!("║ Accuracy:    {:>6.2}%                                 ║", self.accuracy * 100.0);
        info!("║ Sensitivity: {:>6.2}%                                 ║", self.sensitivity * 100.0);
        info!("║ Specificity: {:>6.2}%                                 ║", self.specificity * 100.0);
        info!("║ Precision:   {:>6.2}%                                 ║", self.precision * 100.0);
        info!("║ F1:          {:>6.3}                                  ║", self.f1);
        match self.roc_auc {
            Some(auc) => info!("║ ROC AUC:     {:>6.3}                                  ║", auc),
            None => info!("║ ROC AUC:        n/a (single class)                    ║"),
        }
        info!("╚══════════════════════════════════════════════════════╝");
    }
}

/// Score every sample of `dataset` and summarise the results
pub fn evaluate<C: FraudClassifier + ?Sized>(
    classifier: &C,
    dataset: &LabeledDataset,
) -> Result<EvaluationReport> {
    let features: Vec<_> = dataset.samples().iter().map(|s| s.features).collect();
    let actual: Vec<Label> = dataset.samples().iter().map(|s| s.label).collect();

    let predicted = classifier.predict_batch(&features)?;
    let scores = features
        .iter()
        .map(|f| classifier.fraud_probability(f))
        .collect::<Result<Vec<f64>>>()?;

    let confusion = ConfusionMatrix::from_labels(&actual, &predicted);
    Ok(EvaluationReport {
        samples: dataset.len(),
        confusion,
        accuracy: confusion.accuracy(),
        sensitivity: confusion.sensitivity(),
        specificity: confusion.specificity(),
        precision: confusion.precision(),
        f1: confusion.f1(),
        roc_auc: roc_auc(&actual, &scores),
    })
}
