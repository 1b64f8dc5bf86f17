//! Synthetic Transaction Dataset Generator
//!
//! Writes a labelled CSV in the simulated-transactions layout used for
//! training: mostly legitimate rows plus a small share of fraud.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "generate-dataset", about = "Generate a labelled transaction CSV")]
struct Args {
    /// Number of legitimate transactions
    #[arg(long, default_value_t = 950)]
    legitimate: usize,

    /// Number of fraudulent transactions
    #[arg(long, default_value_t = 50)]
    fraud: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output CSV path
    #[arg(short, long, default_value = "data/transactions.csv")]
    output: PathBuf,
}

/// One row of the generated table
#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct Row {
    id: usize,
    transaction_id: usize,
    tx_datetime: String,
    customer_id: u32,
    terminal_id: u32,
    tx_amount: f64,
    tx_time_seconds: u64,
    tx_time_days: u64,
    tx_fraud: u8,
    tx_fraud_scenario: u8,
}

/// Per-transaction draw before timestamps are assigned
struct Draw {
    amount: f64,
    time_gap: u64,
    fraud_scenario: Option<u8>,
}

struct TransactionGenerator {
    rng: StdRng,
}

impl TransactionGenerator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Everyday purchase: modest amount, hours between transactions
    fn legitimate(&mut self) -> Draw {
        Draw {
            amount: round_cents(self.rng.gen_range(1.0..500.0)),
            time_gap: self.rng.gen_range(600..100_000),
            fraud_scenario: None,
        }
    }

    /// Fraud: large amounts in quick bursts, or card testing with many tiny charges
    fn fraud(&mut self) -> Draw {
        if self.rng.gen_bool(0.7) {
            Draw {
                amount: round_cents(self.rng.gen_range(220.0..2000.0)),
                time_gap: self.rng.gen_range(0..900),
                fraud_scenario: Some(1),
            }
        } else {
            Draw {
                amount: round_cents(self.rng.gen_range(1.0..20.0)),
                time_gap: self.rng.gen_range(0..120),
                fraud_scenario: Some(2),
            }
        }
    }

    fn generate(&mut self, legitimate: usize, fraud: usize) -> Vec<Row> {
        let mut draws: Vec<Draw> = Vec::with_capacity(legitimate + fraud);
        for _ in 0..legitimate {
            draws.push(self.legitimate());
        }
        for _ in 0..fraud {
            draws.push(self.fraud());
        }
        draws.shuffle(&mut self.rng);

        let start = NaiveDate::from_ymd_opt(2018, 4, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        let mut elapsed: u64 = 0;

        draws
            .into_iter()
            .enumerate()
            .map(|(i, draw)| {
                elapsed += draw.time_gap;
                let at = start + Duration::seconds(elapsed as i64);
                Row {
                    id: i,
                    transaction_id: i,
                    tx_datetime: at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    customer_id: self.rng.gen_range(0..5000),
                    terminal_id: self.rng.gen_range(0..10_000),
                    tx_amount: draw.amount,
                    tx_time_seconds: draw.time_gap,
                    tx_time_days: elapsed / 86_400,
                    tx_fraud: u8::from(draw.fraud_scenario.is_some()),
                    tx_fraud_scenario: draw.fraud_scenario.unwrap_or(0),
                }
            })
            .collect()
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_dataset=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!(
        legitimate = args.legitimate,
        fraud = args.fraud,
        seed = args.seed,
        "Generating dataset"
    );

    let rows = TransactionGenerator::new(args.seed).generate(args.legitimate, args.fraud);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(rows = rows.len(), output = %args.output.display(), "Dataset written");
    Ok(())
}
