//! Prediction service: validated manual and batch scoring against a loaded model

use crate::config::VerdictConfig;
use crate::error::{PredictionError, Result};
use crate::feature_extractor::FeatureExtractor;
use crate::models::forest::{Classifier, TrainedModel};
use crate::table::Table;
use crate::types::transaction::{FeatureVector, Label, AMOUNT_COLUMN, TIME_GAP_COLUMN};
use crate::types::verdict::Verdict;
use std::sync::Arc;
use tracing::{debug, info};

/// Anything that can score a feature vector.
///
/// Implemented by fitted models and the classifier wrapper, so the service
/// can be handed either one.
pub trait FraudClassifier: Send + Sync {
    /// Predicted label of one vector
    fn predict(&self, features: &FeatureVector) -> Result<Label>;

    /// Share of ensemble members voting fraud
    fn fraud_probability(&self, features: &FeatureVector) -> Result<f64>;

    /// Order-preserving batch prediction
    fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<Label>> {
        batch.iter().map(|f| self.predict(f)).collect()
    }
}

impl FraudClassifier for TrainedModel {
    fn predict(&self, features: &FeatureVector) -> Result<Label> {
        TrainedModel::predict(self, features)
    }

    fn fraud_probability(&self, features: &FeatureVector) -> Result<f64> {
        TrainedModel::fraud_probability(self, features)
    }

    fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<Label>> {
        TrainedModel::predict_batch(self, batch)
    }
}

impl FraudClassifier for Classifier {
    fn predict(&self, features: &FeatureVector) -> Result<Label> {
        Classifier::predict(self, features)
    }

    fn fraud_probability(&self, features: &FeatureVector) -> Result<f64> {
        self.model()?.fraud_probability(features)
    }

    fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<Label>> {
        Classifier::predict_batch(self, batch)
    }
}

/// Result of scoring an uploaded table
#[derive(Debug, Clone)]
pub struct BatchPrediction {
    /// Input table with the verdict column appended
    pub table: Table,
    /// Predicted label per input row
    pub labels: Vec<Label>,
}

impl BatchPrediction {
    pub fn fraud_count(&self) -> usize {
        self.labels.iter().filter(|l| **l == Label::Fraud).count()
    }

    pub fn legitimate_count(&self) -> usize {
        self.labels.len() - self.fraud_count()
    }
}

/// Scores manual entries and uploaded tables with one injected model
pub struct PredictionService<C: FraudClassifier = TrainedModel> {
    classifier: Arc<C>,
    verdicts: VerdictConfig,
    extractor: FeatureExtractor,
}

impl<C: FraudClassifier> PredictionService<C> {
    /// Create a service around an already loaded model
    pub fn new(classifier: Arc<C>, verdicts: VerdictConfig) -> Self {
        Self {
            classifier,
            verdicts,
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn classifier(&self) -> &Arc<C> {
        &self.classifier
    }

    /// Score two free-text inputs.
    ///
    /// Both inputs are validated before the classifier sees anything.
    pub fn predict_manual(&self, amount: &str, time_gap_seconds: &str) -> Result<Verdict> {
        let amount = parse_manual_field(AMOUNT_COLUMN, amount)?;
        let time_gap_seconds = parse_manual_field(TIME_GAP_COLUMN, time_gap_seconds)?;
        self.predict_features(&FeatureVector::new(amount, time_gap_seconds))
    }

    /// Score one already parsed vector
    pub fn predict_features(&self, features: &FeatureVector) -> Result<Verdict> {
        let label = self.classifier.predict(features)?;
        let fraud_score = self.classifier.fraud_probability(features)?;

        debug!(
            amount = features.amount,
            time_gap_seconds = features.time_gap_seconds,
            label = %label,
            fraud_score = fraud_score,
            "Manual prediction"
        );

        Ok(Verdict::new(
            label,
            fraud_score,
            self.verdicts.manual_message(label).to_string(),
        ))
    }

    /// Score every row of an uploaded table.
    ///
    /// Either all rows are scored or none: schema problems are reported
    /// before any prediction is made.
    pub fn predict_table(&self, table: &Table) -> Result<BatchPrediction> {
        let features = self.extractor.extract_batch(table)?;
        let labels = self.classifier.predict_batch(&features)?;

        let verdicts: Vec<String> = labels
            .iter()
            .map(|l| self.verdicts.batch_message(*l).to_string())
            .collect();
        let annotated = table.with_column(&self.verdicts.column, verdicts)?;

        let result = BatchPrediction {
            table: annotated,
            labels,
        };
        info!(
            rows = result.labels.len(),
            fraud = result.fraud_count(),
            legitimate = result.legitimate_count(),
            "Batch prediction complete"
        );
        Ok(result)
    }
}

/// Parse a user-typed number; must be finite and non-negative.
fn parse_manual_field(field: &str, raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PredictionError::validation(field, "a numeric value is required"));
    }
    let value: f64 = trimmed.parse().map_err(|_| {
        PredictionError::validation(field, format!("'{}' is not a valid number", trimmed))
    })?;
    if !value.is_finite() {
        return Err(PredictionError::validation(
            field,
            format!("'{}' is not a finite number", trimmed),
        ));
    }
    if value < 0.0 {
        return Err(PredictionError::validation(
            field,
            format!("{} must not be negative", value),
        ));
    }
    Ok(value)
}
