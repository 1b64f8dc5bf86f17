//! Training pipeline: labelled table → SMOTE → random forest → model file

use crate::config::TrainingConfig;
use crate::error::{PredictionError, Result};
use crate::feature_extractor::FeatureExtractor;
use crate::models::forest::TrainedModel;
use crate::models::store::ModelStore;
use crate::resampler::SmoteResampler;
use crate::table::Table;
use crate::types::transaction::LabeledDataset;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// What a training run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    /// Class counts before resampling, `[legitimate, fraud]`
    pub original_counts: [usize; 2],
    /// Class counts the forest was fit on
    pub resampled_counts: [usize; 2],
}

/// Runs extraction, resampling and fitting with one configuration
pub struct TrainingPipeline {
    config: TrainingConfig,
    extractor: FeatureExtractor,
    resampler: SmoteResampler,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig) -> Self {
        let resampler = SmoteResampler::new(config.smote_k_neighbors, config.seed);
        Self {
            config,
            extractor: FeatureExtractor::new(),
            resampler,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train on a table with `TX_AMOUNT`, `TX_TIME_SECONDS` and `TX_FRAUD` columns
    pub fn run(&self, table: &Table) -> Result<TrainingOutcome> {
        let dataset = self.extractor.labeled_dataset(table)?;
        info!(
            rows = table.len(),
            columns = table.headers().len(),
            "Training table parsed"
        );
        self.run_dataset(&dataset)
    }

    /// Train on an already extracted dataset
    pub fn run_dataset(&self, dataset: &LabeledDataset) -> Result<TrainingOutcome> {
        if dataset.is_empty() {
            return Err(PredictionError::EmptyDataset);
        }
        let started = Instant::now();
        let original_counts = dataset.class_counts();

        let balanced = self.resampler.resample(dataset)?;
        let resampled_counts = balanced.class_counts();
        info!(
            legitimate = original_counts[0],
            fraud = original_counts[1],
            balanced_per_class = resampled_counts[0],
            "Classes balanced"
        );

        let model = TrainedModel::fit(&balanced, &self.config.forest_params(), self.config.seed)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            trees = model.forest().len(),
            "Training complete"
        );

        Ok(TrainingOutcome {
            model,
            original_counts,
            resampled_counts,
        })
    }

    /// Train and persist the model to `destination`
    pub fn run_and_save<P: AsRef<Path>>(
        &self,
        table: &Table,
        store: &ModelStore,
        destination: P,
    ) -> Result<TrainingOutcome> {
        let outcome = self.run(table)?;
        store.save(&outcome.model, destination)?;
        Ok(outcome)
    }
}

impl Default for TrainingPipeline {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transaction::{FeatureVector, Label};
    use tempfile::tempdir;

    fn table(legit: usize, fraud: usize) -> Table {
        let mut rows = Vec::new();
        for i in 0..legit {
            rows.push(vec![
                format!("{}", i),
                format!("{:.2}", 15.0 + (i * 37 % 200) as f64),
                format!("{}", 3000 + i * 97 % 40_000),
                "0".to_string(),
            ]);
        }
        for i in 0..fraud {
            rows.push(vec![
                format!("{}", legit + i),
                format!("{:.2}", 800.0 + (i * 11 % 150) as f64),
                format!("{}", 5 + i * 13 % 300),
                "1".to_string(),
            ]);
        }
        Table::new(
            vec![
                "TRANSACTION_ID".to_string(),
                "TX_AMOUNT".to_string(),
                "TX_TIME_SECONDS".to_string(),
                "TX_FRAUD".to_string(),
            ],
            rows,
        )
        .unwrap()
    }

    fn quick_config() -> TrainingConfig {
        TrainingConfig {
            n_trees: 11,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_run_balances_and_fits() {
        let outcome = TrainingPipeline::new(quick_config()).run(&table(80, 10)).unwrap();

        assert_eq!(outcome.original_counts, [80, 10]);
        assert_eq!(outcome.resampled_counts, [80, 80]);
        assert_eq!(outcome.model.metadata().class_counts, [80, 80]);
        assert_eq!(
            outcome.model.predict(&FeatureVector::new(850.0, 40.0)).unwrap(),
            Label::Fraud
        );
    }

    #[test]
    fn test_too_few_fraud_rows() {
        let err = TrainingPipeline::new(quick_config()).run(&table(50, 3)).unwrap_err();
        assert!(matches!(err, PredictionError::InsufficientData { available: 3, required: 6 }));
    }

    #[test]
    fn test_negative_training_cell() {
        let table = Table::from_reader(
            "TX_AMOUNT,TX_TIME_SECONDS,TX_FRAUD\n10,500,0\n900,-20,1\n".as_bytes(),
        )
        .unwrap();

        let err = TrainingPipeline::new(quick_config()).run(&table).unwrap_err();
        assert!(matches!(
            err,
            PredictionError::InvalidCell { row: 2, ref column, .. } if column == "TX_TIME_SECONDS"
        ));
    }

    #[test]
    fn test_empty_table() {
        let err = TrainingPipeline::new(quick_config()).run(&table(0, 0)).unwrap_err();
        assert!(matches!(err, PredictionError::EmptyDataset));
    }

    #[test]
    fn test_run_and_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json.gz");
        let store = ModelStore::new();

        let outcome = TrainingPipeline::new(quick_config())
            .run_and_save(&table(40, 8), &store, &path)
            .unwrap();

        assert!(path.exists());
        assert_eq!(store.load(&path).unwrap(), outcome.model);
    }
}
