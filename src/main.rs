//! Sepsiguard command-line interface.
//!
//! Subcommands:
//! - `generate`: write a synthetic labelled cohort to CSV
//! - `train`: fit a model bundle from a labelled CSV
//! - `predict`: score patients with a saved bundle
//! - `scores`: show clinical scores and engineered features, no model needed

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sepsiguard::adapters::cohort::{generate, CohortConfig};
use sepsiguard::adapters::dataset::{labeled_records, read_csv, write_csv};
use sepsiguard::adapters::sanitize::SanitizingMakeWriter;
use sepsiguard::domain::{
    compute_clinical_scores_with, engineer_features_with, BaseMeasurement, Demographics, Gender,
    PatientRecord, PredictionResult, ScoringPolicy, FEATURE_NAMES,
};
use sepsiguard::{InferenceService, JsonModelStore, ModelStore, TrainingConfig, TrainingService};

#[derive(Parser)]
#[command(name = "sepsiguard")]
#[command(version)]
#[command(about = "Sepsis risk scoring from vital signs and laboratory values", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic labelled cohort
    Generate {
        /// Output CSV file
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        /// Number of patients
        #[arg(short = 'n', long, default_value = "2000")]
        patients: usize,

        /// Fraction of patients who develop sepsis
        #[arg(long, default_value = "0.35")]
        sepsis_rate: f64,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Train a model bundle from a labelled CSV
    Train {
        /// Training CSV (must include SepsisLabel)
        #[arg(value_name = "DATA")]
        data: PathBuf,

        /// Bundle directory to write
        #[arg(short, long, value_name = "MODEL_DIR", default_value = "model")]
        model_dir: PathBuf,

        /// Number of trees (overrides SEPSIGUARD_N_TREES)
        #[arg(long)]
        trees: Option<usize>,

        /// Maximum tree depth (overrides SEPSIGUARD_MAX_DEPTH)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Random seed (overrides SEPSIGUARD_SEED)
        #[arg(long)]
        seed: Option<u64>,

        /// Held-out fraction (overrides SEPSIGUARD_TEST_FRACTION)
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Scoring policy JSON file (defaults to the built-in table)
        #[arg(long, value_name = "POLICY")]
        policy: Option<PathBuf>,

        /// Also run stratified k-fold cross-validation
        #[arg(long)]
        cross_validate: bool,

        /// Write the training report as JSON
        #[arg(long, value_name = "REPORT")]
        report: Option<PathBuf>,
    },

    /// Score patients with a saved bundle
    Predict {
        /// Bundle directory
        #[arg(short, long, value_name = "MODEL_DIR", default_value = "model")]
        model_dir: PathBuf,

        /// CSV of patients to score (labels ignored)
        #[arg(short, long, value_name = "INPUT", conflicts_with = "field")]
        input: Option<PathBuf>,

        /// Single patient measurement as NAME=VALUE (repeat for all eleven)
        #[arg(short, long, value_name = "NAME=VALUE")]
        field: Vec<String>,

        /// Patient age in years
        #[arg(long)]
        age: Option<f64>,

        /// Patient gender (1 = male, 0 = female)
        #[arg(long)]
        gender: Option<u8>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show clinical scores and the engineered feature vector
    Scores {
        /// Measurement as NAME=VALUE (repeat for all eleven)
        #[arg(short, long, value_name = "NAME=VALUE", required = true)]
        field: Vec<String>,

        /// Scoring policy JSON file
        #[arg(long, value_name = "POLICY")]
        policy: Option<PathBuf>,
    },
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Results go to stdout; logs default to stderr so they don't mix.
    let log_mode = std::env::var("SEPSIGUARD_LOG_MODE").unwrap_or_else(|_| "stderr".to_string());

    let (writer, guard) = match log_mode.as_str() {
        "file" => {
            let log_file = std::env::var("SEPSIGUARD_LOG_FILE")
                .unwrap_or_else(|_| "sepsiguard.log".to_string());
            if let Some(parent) = Path::new(&log_file).parent() {
                // Best-effort: the open below reports the real failure.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .with_context(|| format!("opening log file {log_file}"))?;
            tracing_appender::non_blocking(file)
        }
        "stdout" => tracing_appender::non_blocking(std::io::stdout()),
        _ => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    Ok(guard)
}

fn parse_fields(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .with_context(|| format!("expected NAME=VALUE, got '{pair}'"))
        })
        .collect()
}

fn load_policy(path: Option<&Path>) -> Result<ScoringPolicy> {
    match path {
        Some(p) => ScoringPolicy::from_json_file(p)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading scoring policy {p:?}")),
        None => Ok(ScoringPolicy::default()),
    }
}

fn print_result(label: &str, result: &PredictionResult) {
    println!("{label}");
    println!(
        "  Risk: {} ({:.1}%) - {}",
        result.tier,
        result.probability * 100.0,
        result.tier.description()
    );
    println!(
        "  SOFA {}  SIRS {}/4  qSOFA {}/2",
        result.scores.sofa_total(),
        result.scores.sirs_count(),
        result.scores.qsofa_total()
    );
    for alert in &result.alerts {
        println!("  ! {alert}");
    }
}

fn run_generate(output: &Path, patients: usize, sepsis_rate: f64, seed: u64) -> Result<()> {
    let records = generate(&CohortConfig {
        patients,
        sepsis_rate,
        seed,
    })?;
    write_csv(output, &records)?;
    let septic = records.iter().filter(|r| r.label == Some(true)).count();
    println!(
        "Generated {} patients ({} septic) -> {}",
        records.len(),
        septic,
        output.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_train(
    data: &Path,
    model_dir: &Path,
    trees: Option<usize>,
    max_depth: Option<usize>,
    seed: Option<u64>,
    test_fraction: Option<f64>,
    policy: Option<&Path>,
    cross_validate: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let mut config = TrainingConfig::from_env_or_default();
    if let Some(n) = trees {
        config.forest.n_trees = n;
    }
    if let Some(d) = max_depth {
        config.forest.max_depth = d;
    }
    if let Some(s) = seed {
        config.seed = s;
        config.forest.seed = s;
    }
    if let Some(f) = test_fraction {
        if !(0.0..1.0).contains(&f) {
            bail!("--test-fraction must be within 0..1");
        }
        config.test_fraction = f;
    }
    config.policy = load_policy(policy)?;

    let records = labeled_records(&read_csv(data)?)?;
    let service = TrainingService::new(config);

    if cross_validate {
        let folds = service.config().cv_folds;
        let cv = service.cross_validate(&records, folds)?;
        println!("Cross-validation ({folds} folds)");
        for (i, m) in cv.folds.iter().enumerate() {
            println!("  fold {}: accuracy {:.3}  f1 {:.3}", i + 1, m.accuracy, m.f1);
        }
        println!("  mean:   accuracy {:.3}  f1 {:.3}", cv.mean.accuracy, cv.mean.f1);
    }

    let outcome = service.train(&records)?;
    let report = &outcome.report;
    let m = &report.metrics;
    println!(
        "Trained on {} records ({} held out)",
        report.total_samples, report.test_samples
    );
    println!("  Accuracy  {:.3}", m.accuracy);
    println!("  Precision {:.3}", m.precision);
    println!("  Recall    {:.3}", m.recall);
    println!("  F1        {:.3}", m.f1);
    match m.roc_auc {
        Some(auc) => println!("  ROC-AUC   {auc:.3}"),
        None => println!("  ROC-AUC   n/a"),
    }
    println!(
        "  Confusion [[{} {}] [{} {}]]",
        m.confusion.true_negatives,
        m.confusion.false_positives,
        m.confusion.false_negatives,
        m.confusion.true_positives
    );
    println!("Top features:");
    for (name, importance) in report.top_features(15) {
        println!("  {name:<26} {importance:.4}");
    }

    if let Some(path) = report_path {
        std::fs::write(path, serde_json::to_vec_pretty(report)?)
            .with_context(|| format!("writing report {path:?}"))?;
    }

    JsonModelStore::new(model_dir).save(&outcome.model)?;
    println!("Saved model bundle to {}", model_dir.display());
    Ok(())
}

fn run_predict(
    model_dir: &Path,
    input: Option<&Path>,
    fields: &[String],
    demographics: Demographics,
    json: bool,
) -> Result<()> {
    let model = JsonModelStore::new(model_dir)
        .load()
        .with_context(|| format!("loading model bundle {}", model_dir.display()))?;
    let service = InferenceService::new(model);

    let patients: Vec<PatientRecord> = match input {
        Some(path) => read_csv(path)?.into_iter().map(|r| r.patient).collect(),
        None if fields.is_empty() => bail!("provide --input or --field NAME=VALUE"),
        None => {
            let base = BaseMeasurement::from_fields(&parse_fields(fields)?)?;
            vec![PatientRecord::new(base).with_demographics(demographics)]
        }
    };

    let mut results = Vec::with_capacity(patients.len());
    for (i, patient) in patients.iter().enumerate() {
        let label = patient
            .id
            .clone()
            .unwrap_or_else(|| format!("patient #{}", i + 1));
        match service.assess(patient) {
            Ok(result) => {
                if !json {
                    print_result(&label, &result);
                }
                results.push(result);
            }
            Err(e) => {
                if input.is_none() {
                    return Err(e.into());
                }
                eprintln!("{label}: {e}");
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

fn run_scores(fields: &[String], policy: Option<&Path>) -> Result<()> {
    let policy = load_policy(policy)?;
    let base = BaseMeasurement::from_fields(&parse_fields(fields)?)?;
    let scores = compute_clinical_scores_with(&base, &policy);
    let features = engineer_features_with(&base, &scores, &policy);

    let sofa = &scores.sofa;
    println!("Scoring policy {}", policy.version);
    println!(
        "SOFA {} (respiratory {}, cardiovascular {}, coagulation {}, renal {})",
        scores.sofa_total(),
        sofa.respiratory,
        sofa.cardiovascular,
        sofa.coagulation,
        sofa.renal
    );
    println!("SIRS {}/4  qSOFA {}/2", scores.sirs_count(), scores.qsofa_total());
    if scores.organ_dysfunction() {
        println!("Organ dysfunction: SOFA >= 2");
    }
    if scores.needs_escalation() {
        println!("qSOFA >= 2: escalation criteria met");
    }
    println!("Engineered features:");
    for (name, value) in FEATURE_NAMES.iter().zip(features.as_slice()) {
        println!("  {name:<26} {value}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging()?;

    match cli.command {
        Commands::Generate {
            output,
            patients,
            sepsis_rate,
            seed,
        } => run_generate(&output, patients, sepsis_rate, seed),
        Commands::Train {
            data,
            model_dir,
            trees,
            max_depth,
            seed,
            test_fraction,
            policy,
            cross_validate,
            report,
        } => run_train(
            &data,
            &model_dir,
            trees,
            max_depth,
            seed,
            test_fraction,
            policy.as_deref(),
            cross_validate,
            report.as_deref(),
        ),
        Commands::Predict {
            model_dir,
            input,
            field,
            age,
            gender,
            json,
        } => {
            let gender = match gender {
                None => None,
                Some(code) => Some(
                    Gender::from_code(code)
                        .with_context(|| format!("--gender must be 0 or 1, got {code}"))?,
                ),
            };
            run_predict(
                &model_dir,
                input.as_deref(),
                &field,
                Demographics { age, gender },
                json,
            )
        }
        Commands::Scores { field, policy } => run_scores(&field, policy.as_deref()),
    }
}
