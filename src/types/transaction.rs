//! Transaction records, feature vectors and labelled datasets

use crate::error::{PredictionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column holding the transaction amount
pub const AMOUNT_COLUMN: &str = "TX_AMOUNT";
/// Column holding the gap to the previous transaction, in seconds
pub const TIME_GAP_COLUMN: &str = "TX_TIME_SECONDS";
/// Column holding the 0/1 fraud label in training tables
pub const LABEL_COLUMN: &str = "TX_FRAUD";
/// Optional identifier column carried through to records
pub const ID_COLUMN: &str = "TRANSACTION_ID";

/// Feature names in the exact order the model consumes them
pub const FEATURE_NAMES: [&str; 2] = [AMOUNT_COLUMN, TIME_GAP_COLUMN];

/// Number of features per vector
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Outcome class of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Legitimate,
    Fraud,
}

impl Label {
    /// Numeric class value (0 = legitimate, 1 = fraud)
    pub fn as_u8(self) -> u8 {
        match self {
            Label::Legitimate => 0,
            Label::Fraud => 1,
        }
    }

    /// Map a numeric class value back to a label
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Label::Legitimate),
            1 => Some(Label::Fraud),
            _ => None,
        }
    }

    /// Index into `[legitimate, fraud]` count arrays
    pub(crate) fn index(self) -> usize {
        self.as_u8() as usize
    }

    /// The other class
    pub fn opposite(self) -> Self {
        match self {
            Label::Legitimate => Label::Fraud,
            Label::Fraud => Label::Legitimate,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Legitimate => write!(f, "legitimate"),
            Label::Fraud => write!(f, "fraud"),
        }
    }
}

/// The two predictive inputs of a transaction, by name.
///
/// Training and inference both go through this type, so the column order
/// `(amount, time_gap_seconds)` cannot drift between them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub amount: f64,
    pub time_gap_seconds: f64,
}

impl FeatureVector {
    /// Create a feature vector
    pub fn new(amount: f64, time_gap_seconds: f64) -> Self {
        Self {
            amount,
            time_gap_seconds,
        }
    }

    /// Build from a positional slice, rejecting anything that is not exactly two finite values
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.len() != FEATURE_COUNT {
            return Err(PredictionError::DimensionMismatch {
                expected: FEATURE_COUNT,
                actual: values.len(),
            });
        }
        let vector = Self::new(values[0], values[1]);
        vector.validate()?;
        Ok(vector)
    }

    /// Positional view in model order
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [self.amount, self.time_gap_seconds]
    }

    /// Value of the feature at `index` (model order)
    pub fn get(&self, index: usize) -> f64 {
        self.as_array()[index]
    }

    /// Ensure both components are finite
    pub fn validate(&self) -> Result<()> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.as_array()) {
            if !value.is_finite() {
                return Err(PredictionError::InvalidValue {
                    feature: name.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }

    /// Euclidean distance to another vector
    pub fn distance(&self, other: &FeatureVector) -> f64 {
        let da = self.amount - other.amount;
        let dt = self.time_gap_seconds - other.time_gap_seconds;
        (da * da + dt * dt).sqrt()
    }
}

/// One row of transaction input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Identifier, when the source table carries one
    #[serde(default)]
    pub transaction_id: Option<String>,

    /// Transaction amount
    pub amount: f64,

    /// Seconds since the previous transaction
    pub time_gap_seconds: f64,

    /// Ground-truth label (training data only)
    #[serde(default)]
    pub is_fraud: Option<Label>,
}

impl TransactionRecord {
    /// Create an unlabelled record
    pub fn new(amount: f64, time_gap_seconds: f64) -> Self {
        Self {
            transaction_id: None,
            amount,
            time_gap_seconds,
            is_fraud: None,
        }
    }

    /// Attach a label
    pub fn with_label(mut self, label: Label) -> Self {
        self.is_fraud = Some(label);
        self
    }

    /// Attach an identifier
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.transaction_id = Some(id.into());
        self
    }
}

/// A feature vector with its ground-truth label
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub features: FeatureVector,
    pub label: Label,
}

/// Ordered collection of labelled samples used for fitting and evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledDataset {
    samples: Vec<LabeledSample>,
}

impl LabeledDataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dataset from samples
    pub fn from_samples(samples: Vec<LabeledSample>) -> Self {
        Self { samples }
    }

    /// Append a sample
    pub fn push(&mut self, features: FeatureVector, label: Label) {
        self.samples.push(LabeledSample { features, label });
    }

    /// All samples in insertion order
    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample counts as `[legitimate, fraud]`
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for sample in &self.samples {
            counts[sample.label.index()] += 1;
        }
        counts
    }

    /// Number of samples carrying `label`
    pub fn count(&self, label: Label) -> usize {
        self.class_counts()[label.index()]
    }

    /// The less frequent class; legitimate wins a tie
    pub fn minority_label(&self) -> Label {
        let [legit, fraud] = self.class_counts();
        if fraud < legit {
            Label::Fraud
        } else {
            Label::Legitimate
        }
    }

    /// Whether both classes have the same count
    pub fn is_balanced(&self) -> bool {
        let [legit, fraud] = self.class_counts();
        legit == fraud
    }

    /// Feature vectors of every sample carrying `label`
    pub fn features_for(&self, label: Label) -> Vec<FeatureVector> {
        self.samples
            .iter()
            .filter(|s| s.label == label)
            .map(|s| s.features)
            .collect()
    }

    /// Check every feature vector is finite
    pub fn validate(&self) -> Result<()> {
        self.samples.iter().try_for_each(|s| s.features.validate())
    }
}

impl FromIterator<LabeledSample> for LabeledDataset {
    fn from_iter<I: IntoIterator<Item = LabeledSample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}
