//! Type definitions for the fraud prediction pipeline

pub mod transaction;
pub mod verdict;

pub use transaction::{FeatureVector, Label, LabeledDataset, LabeledSample, TransactionRecord};
pub use verdict::Verdict;
