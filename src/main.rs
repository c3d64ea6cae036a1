//! GridGuard - Operator CLI
//!
//! `train` → artifacts directory, `score` / `evaluate` against labelled CSV,
//! `info` prints the manifest of a bundle.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use gridguard_core::constants;
use gridguard_core::logic::config::DetectorConfig;
use gridguard_core::logic::dataset::export::{self, ScoredRow};
use gridguard_core::logic::dataset::Dataset;
use gridguard_core::logic::evaluation::EvaluationReport;
use gridguard_core::logic::features::CategoryPolicy;
use gridguard_core::logic::model::artifacts::{read_manifest, save_bundle};
use gridguard_core::logic::model::{DecisionEngine, ModelBundle, RuleOverridePolicy, Scorer, Trainer};

#[derive(Parser)]
#[command(name = "gridguard")]
#[command(about = "Reconstruction-based anomaly detection for industrial sensor telemetry")]
#[command(version)]
struct Cli {
    /// JSON config file (defaults + GRIDGUARD_* env when absent)
    #[arg(short, long, global = true, env = "GRIDGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Model bundle directory
    #[arg(short, long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train on normal data and write a model bundle
    Train {
        /// Labelled CSV files; anomalous rows are filtered out
        #[arg(required = true, value_name = "CSV")]
        data: Vec<PathBuf>,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,
    },
    /// Score every row of a CSV and write the verdicts
    Score {
        #[arg(value_name = "CSV")]
        input: PathBuf,

        /// Output file (.csv or .jsonl)
        #[arg(short, long)]
        output: PathBuf,

        /// Force CRITICAL for devices labelled critical (demo only)
        #[arg(long)]
        rule_override: bool,
    },
    /// Metrics against labelled normal + attack data
    Evaluate {
        #[arg(required = true, value_name = "CSV")]
        data: Vec<PathBuf>,

        /// Write the report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the manifest of a model bundle
    Info,
}

fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = DetectorConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let model_dir = cli.model_dir.clone().unwrap_or_else(|| config.artifact_dir());

    log::info!("{} v{}", constants::APP_NAME, constants::APP_VERSION);

    match cli.command {
        Command::Train { data, epochs, seed } => train(config, &model_dir, &data, epochs, seed),
        Command::Score { input, output, rule_override } => {
            score(&config, &model_dir, &input, &output, rule_override)
        }
        Command::Evaluate { data, report } => evaluate(&config, &model_dir, &data, report.as_deref()),
        Command::Info => info(&model_dir),
    }
}

fn load_datasets(paths: &[PathBuf]) -> Result<Dataset> {
    let refs: Vec<&Path> = paths.iter().map(|p| p.as_path()).collect();
    let dataset = Dataset::load_many(&refs).context("Failed to read dataset")?;
    if dataset.is_empty() {
        bail!("dataset is empty");
    }
    Ok(dataset)
}

fn load_engine(config: &DetectorConfig, model_dir: &Path) -> Result<DecisionEngine> {
    let engine = DecisionEngine::new(config.engine.clone());
    engine
        .load_from_dir(model_dir)
        .with_context(|| format!("Failed to load model bundle from {}", model_dir.display()))?;
    Ok(engine)
}

fn train(
    mut config: DetectorConfig,
    model_dir: &Path,
    data: &[PathBuf],
    epochs: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    if let Some(epochs) = epochs {
        config.training.epochs = epochs;
    }
    if let Some(seed) = seed {
        config.training.seed = seed;
    }

    let dataset = load_datasets(data)?;
    let summary = dataset.summary();
    log::info!(
        "Training set: {} rows, {} labelled anomalies, {} streams",
        summary.rows, summary.anomalies, summary.streams
    );

    // vocabularies only see rows the model trains on
    let normal = Dataset::from_records(dataset.records.into_iter().filter(|r| !r.is_anomaly).collect());
    let tables = normal.fit_tables();
    let encoded = normal
        .encode(&tables, CategoryPolicy::Strict)
        .context("Failed to encode training data")?;

    let outcome = Trainer::new(config.training.clone())
        .train(&encoded.vectors, Some(&encoded.labels))
        .context("Training failed")?;
    let report = outcome.report.clone();
    let bundle = ModelBundle::from_training(outcome, tables)?;

    std::fs::create_dir_all(model_dir)
        .with_context(|| format!("Failed to create {}", model_dir.display()))?;
    let manifest = save_bundle(&bundle, model_dir)
        .with_context(|| format!("Failed to write model bundle to {}", model_dir.display()))?;

    println!("Run:             {}", manifest.run_id);
    println!("Epochs:          {}", report.epochs_run);
    println!("Train samples:   {}", report.train_samples);
    println!("Val samples:     {}", report.validation_samples);
    println!("Final val loss:  {:.6}", report.final_val_loss);
    println!("Base threshold:  {:.6}", bundle.base_threshold());
    println!("Bundle:          {}", model_dir.display());
    Ok(())
}

fn score(
    config: &DetectorConfig,
    model_dir: &Path,
    input: &Path,
    output: &Path,
    rule_override: bool,
) -> Result<()> {
    let engine = load_engine(config, model_dir)?;
    let dataset = Dataset::load_csv(input).context("Failed to read input")?;
    let (contexts, _) = dataset.contexts();

    let scorer: Box<dyn Scorer> = if rule_override {
        Box::new(RuleOverridePolicy::new(engine))
    } else {
        Box::new(engine)
    };

    let mut rows = Vec::with_capacity(dataset.len());
    let mut failures = 0usize;
    for (record, context) in dataset.records.iter().zip(contexts.iter()) {
        let result = scorer.score_reading(&record.to_reading(), Some(context));
        if result.is_error() {
            failures += 1;
        }
        let attack = record.attack_label().unwrap_or("");
        rows.push(ScoredRow::new(record, attack, &result));
    }
    if failures > 0 {
        log::warn!("{} of {} rows could not be scored", failures, rows.len());
    }

    export::export(output, &rows).with_context(|| format!("Failed to write {}", output.display()))?;

    let stats = scorer.statistics();
    println!("Scored:          {}", stats.total_samples);
    println!("Anomalies:       {} ({:.2}%)", stats.anomalies_detected, stats.anomaly_rate);
    println!("Avg latency:     {:.1} us", stats.avg_latency_us);
    Ok(())
}

fn evaluate(config: &DetectorConfig, model_dir: &Path, data: &[PathBuf], report_path: Option<&Path>) -> Result<()> {
    let engine = load_engine(config, model_dir)?;
    let model = engine.loaded().context("model not loaded")?;
    let dataset = load_datasets(data)?;
    let encoded = dataset
        .encode(model.tables(), config.engine.category_policy)
        .context("Failed to encode evaluation data")?;

    let mut errors = Vec::with_capacity(encoded.len());
    let mut predicted = Vec::with_capacity(encoded.len());
    for (vector, tier) in encoded.vectors.iter().zip(encoded.tiers.iter()) {
        let result = engine.score_vector(vector, *tier)?;
        errors.push(result.reconstruction_error);
        predicted.push(result.is_anomaly);
    }

    let report = EvaluationReport::compute(&errors, &predicted, &encoded.labels, &encoded.attack_types)?;
    print!("{}", report.render());

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Report written to {}", path.display());
    }
    Ok(())
}

fn info(model_dir: &Path) -> Result<()> {
    let manifest = read_manifest(model_dir)
        .with_context(|| format!("No model bundle in {}", model_dir.display()))?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}
