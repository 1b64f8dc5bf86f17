//! Fraud Prediction - Main Entry Point
//!
//! Trains the random forest, scores manual entries and CSV batches, and
//! evaluates a saved model against labelled data.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fraud_prediction::{
    config::AppConfig, evaluate, models::store::ModelStore, FeatureExtractor, PredictionService,
    Table, TrainingPipeline,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "fraud-predict",
    about = "Train and serve a transaction fraud classifier",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model on a labelled CSV and save it
    Train {
        /// CSV with TX_AMOUNT, TX_TIME_SECONDS and TX_FRAUD columns
        #[arg(short, long)]
        data: PathBuf,

        /// Where to write the model (defaults to model.path from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the training seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the number of trees
        #[arg(long)]
        trees: Option<usize>,
    },

    /// Score a single manually entered transaction
    Predict {
        /// Transaction amount
        #[arg(short, long, allow_hyphen_values = true)]
        amount: String,

        /// Seconds since the previous transaction
        #[arg(short, long, allow_hyphen_values = true)]
        time_gap: String,

        /// Model file (defaults to model.path from config)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Score every row of a CSV and write it back with a verdict column
    PredictBatch {
        /// CSV with TX_AMOUNT and TX_TIME_SECONDS columns
        #[arg(short, long)]
        input: PathBuf,

        /// Annotated CSV destination
        #[arg(short, long)]
        output: PathBuf,

        /// Model file (defaults to model.path from config)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Report accuracy, sensitivity, specificity and AUC on labelled data
    Evaluate {
        /// Labelled CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Model file (defaults to model.path from config)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::load()?,
    };

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Train {
            data,
            output,
            seed,
            trees,
        } => train(config, &data, output, seed, trees),
        Commands::Predict {
            amount,
            time_gap,
            model,
        } => predict(&config, &amount, &time_gap, model),
        Commands::PredictBatch {
            input,
            output,
            model,
        } => predict_batch(&config, &input, &output, model),
        Commands::Evaluate { data, model } => run_evaluation(&config, &data, model),
    }
}

fn init_logging(config: &AppConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::from_default_env().add_directive(
        format!("fraud_prediction={}", level)
            .parse()
            .with_context(|| format!("Invalid log level '{}'", level))?,
    );

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn model_store(config: &AppConfig) -> ModelStore {
    ModelStore::with_compression_level(config.model.compression_level)
}

fn load_service(config: &AppConfig, model: Option<PathBuf>) -> Result<PredictionService> {
    let path = model.unwrap_or_else(|| config.model.path.clone());
    let model = model_store(config)
        .load(&path)
        .with_context(|| format!("Failed to load model from {}", path.display()))?;
    Ok(PredictionService::new(Arc::new(model), config.verdicts.clone()))
}

fn train(
    mut config: AppConfig,
    data: &Path,
    output: Option<PathBuf>,
    seed: Option<u64>,
    trees: Option<usize>,
) -> Result<()> {
    if let Some(seed) = seed {
        config.training.seed = seed;
    }
    if let Some(trees) = trees {
        config.training.n_trees = trees;
    }
    let destination = output.unwrap_or_else(|| config.model.path.clone());

    info!(
        data = %data.display(),
        trees = config.training.n_trees,
        seed = config.training.seed,
        "Starting training"
    );

    let table = Table::from_path(data)
        .with_context(|| format!("Failed to read training data from {}", data.display()))?;
    let pipeline = TrainingPipeline::new(config.training.clone());
    let outcome = pipeline
        .run_and_save(&table, &model_store(&config), &destination)
        .context("Training failed")?;

    info!(
        model_id = %outcome.model.metadata().model_id,
        path = %destination.display(),
        legitimate = outcome.original_counts[0],
        fraud = outcome.original_counts[1],
        "Model ready"
    );
    Ok(())
}

fn predict(config: &AppConfig, amount: &str, time_gap: &str, model: Option<PathBuf>) -> Result<()> {
    let service = load_service(config, model)?;
    let verdict = service.predict_manual(amount, time_gap)?;

    info!(label = %verdict.label, fraud_score = verdict.fraud_score, "Prediction made");
    println!("{}", verdict.message);
    Ok(())
}

fn predict_batch(config: &AppConfig, input: &Path, output: &Path, model: Option<PathBuf>) -> Result<()> {
    let service = load_service(config, model)?;

    let table = Table::from_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    if table.is_empty() {
        warn!(input = %input.display(), "Input has no rows");
    }

    let result = service.predict_table(&table)?;
    result
        .table
        .write_path(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        output = %output.display(),
        rows = result.labels.len(),
        fraud = result.fraud_count(),
        "Batch written"
    );
    Ok(())
}

fn run_evaluation(config: &AppConfig, data: &Path, model: Option<PathBuf>) -> Result<()> {
    let service = load_service(config, model)?;

    let table = Table::from_path(data)
        .with_context(|| format!("Failed to read {}", data.display()))?;
    let dataset = FeatureExtractor::new().labeled_dataset(&table)?;

    let report = evaluate(service.classifier().as_ref(), &dataset)?;
    report.log_summary();
    Ok(())
}
