//! Human-readable verdicts returned by the prediction service

use crate::types::transaction::Label;
use serde::{Deserialize, Serialize};

/// Outcome of scoring a single transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Predicted class
    pub label: Label,

    /// Share of trees that voted fraud (0.0 - 1.0)
    pub fraud_score: f64,

    /// Message shown to the user
    pub message: String,
}

impl Verdict {
    /// Create a verdict
    pub fn new(label: Label, fraud_score: f64, message: String) -> Self {
        Self {
            label,
            fraud_score,
            message,
        }
    }

    pub fn is_fraud(&self) -> bool {
        self.label == Label::Fraud
    }
}
