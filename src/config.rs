//! Configuration management for the fraud prediction pipeline

use crate::models::forest::ForestParams;
use crate::models::tree::{default_max_features, TreeParams};
use crate::types::transaction::Label;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub verdicts: VerdictConfig,
    pub logging: LoggingConfig,
}

/// Model persistence configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Location of the compressed model file
    pub path: PathBuf,
    /// gzip level used when saving (0-9)
    pub compression_level: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/trans_model.json.gz"),
            compression_level: 6,
        }
    }
}

/// Training hyper-parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Seed for resampling, bootstrapping and feature draws
    pub seed: u64,
    /// Neighbours considered when synthesizing minority samples
    pub smote_k_neighbors: usize,
    /// Maximum tree depth (unbounded when absent)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples required in each leaf
    pub min_samples_leaf: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 42,
            smote_k_neighbors: 5,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl TrainingConfig {
    /// Forest parameters derived from this configuration
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.n_trees,
            tree: TreeParams {
                max_depth: self.max_depth,
                min_samples_split: self.min_samples_split.max(2),
                min_samples_leaf: self.min_samples_leaf.max(1),
                max_features: default_max_features(),
            },
        }
    }
}

/// User-facing verdict strings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerdictConfig {
    /// Name of the column appended to batch output
    pub column: String,
    pub manual_fraud: String,
    pub manual_legitimate: String,
    pub batch_fraud: String,
    pub batch_legitimate: String,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            column: "Prediction".to_string(),
            manual_fraud: "Your transaction is not safe: there are indications of fraud"
                .to_string(),
            manual_legitimate: "Your transaction is safe: it was carried out legitimately"
                .to_string(),
            batch_fraud: "Unsafe transaction (fraud indication)".to_string(),
            batch_legitimate: "Safe transaction".to_string(),
        }
    }
}

impl VerdictConfig {
    /// Message for a single manual entry
    pub fn manual_message(&self, label: Label) -> &str {
        match label {
            Label::Fraud => &self.manual_fraud,
            Label::Legitimate => &self.manual_legitimate,
        }
    }

    /// Message written into the batch verdict column
    pub fn batch_message(&self, label: Label) -> &str {
        match label {
            Label::Fraud => &self.batch_fraud,
            Label::Legitimate => &self.batch_legitimate,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file, if present, plus environment overrides
    pub fn load() -> Result<Self> {
        Self::build(Path::new(DEFAULT_CONFIG_PATH), false)
    }

    /// Load configuration from a specific path (which must exist) plus environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(path.as_ref(), true)
    }

    fn build(path: &Path, required: bool) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(
                Environment::with_prefix("FRAUD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
