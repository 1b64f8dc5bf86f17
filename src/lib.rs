//! Fraud Prediction Library
//!
//! Trains a random-forest classifier on transaction amount and time gap,
//! balances the classes with SMOTE, persists the model as compressed JSON
//! and serves manual and batch predictions from the loaded model.

pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod resampler;
pub mod table;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{PredictionError, Result};
pub use feature_extractor::FeatureExtractor;
pub use metrics::{evaluate, ConfusionMatrix, EvaluationReport};
pub use models::{Classifier, FraudClassifier, ModelStore, PredictionService, TrainedModel};
pub use resampler::SmoteResampler;
pub use table::Table;
pub use training::{TrainingOutcome, TrainingPipeline};
pub use types::{FeatureVector, Label, LabeledDataset, TransactionRecord, Verdict};
