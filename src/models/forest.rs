//! Random forest classifier: fit, predict, and the fitted model

use crate::error::{PredictionError, Result};
use crate::models::aggregator::VoteTally;
use crate::models::tree::{DecisionTree, TreeParams};
use crate::types::transaction::{FeatureVector, Label, LabeledDataset, FEATURE_NAMES};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Ensemble hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees
    pub n_trees: usize,
    /// Per-tree growth limits
    pub tree: TreeParams,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            tree: TreeParams::default(),
        }
    }
}

/// Bagged ensemble of decision trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit `params.n_trees` trees, each on its own bootstrap sample.
    ///
    /// Every tree gets a seed drawn in order from a generator seeded with
    /// `seed`, so the same inputs always produce the same forest.
    pub fn fit(dataset: &LabeledDataset, params: &ForestParams, seed: u64) -> Result<Self> {
        if dataset.is_empty() {
            return Err(PredictionError::EmptyDataset);
        }
        dataset.validate()?;

        let samples = dataset.samples();
        let n = samples.len();
        let n_trees = params.n_trees.max(1);
        let tree_params = TreeParams {
            max_features: params.tree.max_features.clamp(1, FEATURE_NAMES.len()),
            ..params.tree
        };
        let mut seeder = StdRng::seed_from_u64(seed);

        let trees: Vec<DecisionTree> = (0..n_trees)
            .map(|_| {
                let mut rng = StdRng::seed_from_u64(seeder.gen());
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(samples, bootstrap, &tree_params, &mut rng)
            })
            .collect();

        debug!(
            trees = trees.len(),
            avg_nodes = trees.iter().map(|t| t.node_count()).sum::<usize>() / trees.len(),
            "Random forest grown"
        );

        Ok(Self { trees })
    }

    /// Collect one vote per tree
    pub fn tally(&self, features: &FeatureVector) -> VoteTally {
        VoteTally::from_votes(self.trees.iter().map(|t| t.predict(features)))
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Structural check of every tree
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        self.trees
            .iter()
            .enumerate()
            .try_for_each(|(i, t)| t.validate().map_err(|e| format!("tree {}: {}", i, e)))
    }
}

/// Provenance recorded alongside a fitted forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: Uuid,
    pub trained_at: DateTime<Utc>,
    /// Feature names in the order the forest reads them
    pub feature_names: Vec<String>,
    pub params: ForestParams,
    pub seed: u64,
    /// Class counts of the dataset the forest was fit on, `[legitimate, fraud]`
    pub class_counts: [usize; 2],
}

/// A fitted, immutable fraud classifier.
///
/// Deserializing goes through [`ModelParts`], so a model read from any
/// source has passed the same structural checks as one loaded from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelParts")]
pub struct TrainedModel {
    metadata: ModelMetadata,
    forest: RandomForest,
}

/// Unchecked serialized form of a [`TrainedModel`]
#[derive(Debug, Deserialize)]
pub struct ModelParts {
    pub(crate) metadata: ModelMetadata,
    pub(crate) forest: RandomForest,
}

impl TryFrom<ModelParts> for TrainedModel {
    type Error = String;

    fn try_from(parts: ModelParts) -> std::result::Result<Self, String> {
        if parts.metadata.feature_names != FEATURE_NAMES {
            return Err(format!(
                "model was trained on features [{}], expected [{}]",
                parts.metadata.feature_names.join(", "),
                FEATURE_NAMES.join(", ")
            ));
        }
        parts.forest.validate()?;
        Ok(Self {
            metadata: parts.metadata,
            forest: parts.forest,
        })
    }
}

impl TrainedModel {
    /// Fit a new model
    pub fn fit(dataset: &LabeledDataset, params: &ForestParams, seed: u64) -> Result<Self> {
        let forest = RandomForest::fit(dataset, params, seed)?;
        let metadata = ModelMetadata {
            model_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            params: params.clone(),
            seed,
            class_counts: dataset.class_counts(),
        };

        info!(
            model_id = %metadata.model_id,
            trees = forest.len(),
            samples = dataset.len(),
            seed = seed,
            "Classifier fitted"
        );

        Ok(Self { metadata, forest })
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Predict the label of one vector
    pub fn predict(&self, features: &FeatureVector) -> Result<Label> {
        features.validate()?;
        Ok(self.forest.tally(features).majority())
    }

    /// Predict from a positional slice; anything but two values is rejected
    pub fn predict_slice(&self, values: &[f64]) -> Result<Label> {
        let features = FeatureVector::from_slice(values)?;
        self.predict(&features)
    }

    /// Predict a batch; output `i` belongs to input `i`.
    ///
    /// The whole batch is validated before any vector is scored.
    pub fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<Label>> {
        batch.iter().try_for_each(|f| f.validate())?;
        Ok(batch
            .iter()
            .map(|f| self.forest.tally(f).majority())
            .collect())
    }

    /// Share of trees voting fraud
    pub fn fraud_probability(&self, features: &FeatureVector) -> Result<f64> {
        features.validate()?;
        Ok(self.forest.tally(features).fraud_share())
    }
}

/// Fit-then-predict wrapper that rejects predictions before `fit`
#[derive(Debug, Clone)]
pub struct Classifier {
    params: ForestParams,
    seed: u64,
    model: Option<TrainedModel>,
}

impl Classifier {
    /// Create an untrained classifier
    pub fn new(params: ForestParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            model: None,
        }
    }

    /// Wrap an already fitted (e.g. loaded) model
    pub fn from_model(model: TrainedModel) -> Self {
        Self {
            params: model.metadata.params.clone(),
            seed: model.metadata.seed,
            model: Some(model),
        }
    }

    /// Fit on `dataset`, replacing any previous model
    pub fn fit(&mut self, dataset: &LabeledDataset) -> Result<&TrainedModel> {
        let model = TrainedModel::fit(dataset, &self.params, self.seed)?;
        Ok(self.model.insert(model))
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// The fitted model
    pub fn model(&self) -> Result<&TrainedModel> {
        self.model.as_ref().ok_or(PredictionError::NotFitted)
    }

    /// Consume the classifier, yielding the fitted model
    pub fn into_model(self) -> Result<TrainedModel> {
        self.model.ok_or(PredictionError::NotFitted)
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Label> {
        self.model()?.predict(features)
    }

    pub fn predict_slice(&self, values: &[f64]) -> Result<Label> {
        self.model()?.predict_slice(values)
    }

    pub fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<Label>> {
        self.model()?.predict_batch(batch)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ForestParams::default(), 42)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> LabeledDataset {
        let mut ds = LabeledDataset::new();
        for i in 0..30 {
            ds.push(
                FeatureVector::new(20.0 + (i * 7 % 40) as f64, 20_000.0 + (i * 331 % 5000) as f64),
                Label::Legitimate,
            );
            ds.push(
                FeatureVector::new(600.0 + (i * 13 % 90) as f64, 30.0 + (i * 17 % 200) as f64),
                Label::Fraud,
            );
        }
        ds
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 15,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_fit_and_predict() {
        let model = TrainedModel::fit(&dataset(), &small_params(), 42).unwrap();

        assert_eq!(model.forest().len(), 15);
        assert_eq!(model.metadata().class_counts, [30, 30]);
        assert_eq!(
            model.predict(&FeatureVector::new(25.0, 21_000.0)).unwrap(),
            Label::Legitimate
        );
        assert_eq!(model.predict(&FeatureVector::new(650.0, 60.0)).unwrap(), Label::Fraud);
        assert!(model.fraud_probability(&FeatureVector::new(650.0, 60.0)).unwrap() > 0.5);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let a = RandomForest::fit(&dataset(), &small_params(), 7).unwrap();
        let b = RandomForest::fit(&dataset(), &small_params(), 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_deserialize_rejects_invalid_structure() {
        let model = TrainedModel::fit(&dataset(), &small_params(), 42).unwrap();
        let mut value = serde_json::to_value(&model).unwrap();
        let nodes = value["forest"]["trees"][0]["nodes"].as_array_mut().unwrap();
        let split = nodes.iter_mut().find(|n| n["kind"] == "split").unwrap();
        split["feature"] = serde_json::json!(9);

        let err = serde_json::from_value::<TrainedModel>(value).unwrap_err();
        assert!(err.to_string().contains("unknown feature 9"));

        let mut renamed = serde_json::to_value(&model).unwrap();
        renamed["metadata"]["feature_names"] = serde_json::json!(["TX_AMOUNT", "TX_DAY"]);
        assert!(serde_json::from_value::<TrainedModel>(renamed).is_err());

        let intact: TrainedModel = serde_json::from_value(serde_json::to_value(&model).unwrap()).unwrap();
        assert_eq!(intact, model);
    }

    #[test]
    fn test_empty_dataset() {
        assert!(matches!(
            TrainedModel::fit(&LabeledDataset::new(), &small_params(), 1),
            Err(PredictionError::EmptyDataset)
        ));
    }

    #[test]
    fn test_non_finite_training_value() {
        let mut ds = dataset();
        ds.push(FeatureVector::new(f64::INFINITY, 1.0), Label::Fraud);
        assert!(matches!(
            TrainedModel::fit(&ds, &small_params(), 1),
            Err(PredictionError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_predict_guards() {
        let model = TrainedModel::fit(&dataset(), &small_params(), 42).unwrap();

        assert!(matches!(
            model.predict_slice(&[1.0, 2.0, 3.0]),
            Err(PredictionError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            model.predict_slice(&[1.0]),
            Err(PredictionError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            model.predict(&FeatureVector::new(f64::NAN, 1.0)),
            Err(PredictionError::InvalidValue { .. })
        ));
        assert!(model
            .predict_batch(&[FeatureVector::new(1.0, 1.0), FeatureVector::new(1.0, f64::NAN)])
            .is_err());
    }

    #[test]
    fn test_batch_preserves_order() {
        let model = TrainedModel::fit(&dataset(), &small_params(), 42).unwrap();
        let batch = vec![
            FeatureVector::new(650.0, 60.0),
            FeatureVector::new(25.0, 21_000.0),
            FeatureVector::new(640.0, 100.0),
            FeatureVector::new(30.0, 22_000.0),
        ];

        let labels = model.predict_batch(&batch).unwrap();
        let singles: Vec<Label> = batch.iter().map(|f| model.predict(f).unwrap()).collect();

        assert_eq!(labels, singles);
        assert_eq!(
            labels,
            vec![Label::Fraud, Label::Legitimate, Label::Fraud, Label::Legitimate]
        );
    }

    #[test]
    fn test_untrained_classifier_rejects_predict() {
        let mut classifier = Classifier::new(small_params(), 3);
        assert!(!classifier.is_fitted());
        assert!(matches!(
            classifier.predict(&FeatureVector::new(1.0, 1.0)),
            Err(PredictionError::NotFitted)
        ));
        assert!(matches!(
            classifier.predict_batch(&[]),
            Err(PredictionError::NotFitted)
        ));

        classifier.fit(&dataset()).unwrap();
        assert!(classifier.is_fitted());
        assert!(classifier.predict(&FeatureVector::new(650.0, 60.0)).is_ok());
        assert!(classifier.into_model().is_ok());
    }
}
