//! Random forest model: trees, vote aggregation, persistence and serving

pub mod aggregator;
pub mod forest;
pub mod inference;
pub mod store;
pub mod tree;

pub use aggregator::VoteTally;
pub use forest::{Classifier, ForestParams, ModelMetadata, RandomForest, TrainedModel};
pub use inference::{BatchPrediction, FraudClassifier, PredictionService};
pub use store::ModelStore;
pub use tree::{DecisionTree, TreeParams};
