use std::collections::BTreeMap;
use std::fs;
use std::io::BufRead;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use serde::Deserialize;

use faultline::model::LinearModel;
use faultline::predict::{predict, PredictError};
use faultline::suppress::{Severity, DEFAULT_PROXIMITY_THRESHOLD, DEFAULT_UNKNOWN_THRESHOLD};

#[derive(Parser)]
#[command(
    name = "faultline",
    about = "Automotive fault diagnosis from natural-language complaints."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP diagnosis service
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: String,

        /// Rate limit in requests per minute per IP (0 = no limit)
        #[arg(long, default_value_t = 60)]
        rate_limit: u32,

        /// Path for JSONL access log
        #[arg(long, default_value = "faultline-access.jsonl")]
        access_log: String,

        /// Path to the exported model artifact
        #[arg(long, default_value = "artifacts/model.json")]
        model: PathBuf,

        /// Confidence floor for trusting a top-ranked catch-all prediction
        #[arg(long, default_value_t = DEFAULT_UNKNOWN_THRESHOLD)]
        unknown_threshold: f64,

        /// Margin for the catch-all's lead over the runner-up
        #[arg(long, default_value_t = DEFAULT_PROXIMITY_THRESHOLD)]
        proximity_threshold: f64,
    },

    /// Diagnose a single complaint from the command line
    Diagnose {
        /// Complaint text (reads --file when omitted)
        complaint: Option<String>,

        /// Read the complaint from a text file instead
        #[arg(long, conflicts_with = "complaint")]
        file: Option<PathBuf>,

        /// Path to the exported model artifact
        #[arg(long, default_value = "artifacts/model.json")]
        model: PathBuf,

        #[arg(long, default_value_t = DEFAULT_UNKNOWN_THRESHOLD)]
        unknown_threshold: f64,

        #[arg(long, default_value_t = DEFAULT_PROXIMITY_THRESHOLD)]
        proximity_threshold: f64,

        /// Output format: json or summary
        #[arg(long, default_value = "summary")]
        format: String,
    },

    /// Evaluate the model against a labeled JSONL dataset
    Eval {
        /// Dataset path; one {"summary": ..., "label": ...} object per line
        dataset: PathBuf,

        /// Path to the exported model artifact
        #[arg(long, default_value = "artifacts/model.json")]
        model: PathBuf,
    },
}

fn cmd_serve(
    bind: String,
    rate_limit: u32,
    access_log: String,
    model: PathBuf,
    unknown_threshold: f64,
    proximity_threshold: f64,
) -> Result<()> {
    use faultline::server::{run_server, ServerConfig};

    let bind_addr = bind
        .parse()
        .wrap_err_with(|| format!("Invalid bind address: {bind}"))?;

    let config = ServerConfig {
        bind_addr,
        rate_limit_rpm: rate_limit,
        access_log_path: access_log,
        model_path: model,
        unknown_threshold,
        proximity_threshold,
        ..Default::default()
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_server(config))?;

    Ok(())
}

fn cmd_diagnose(
    complaint: Option<String>,
    file: Option<PathBuf>,
    model_path: PathBuf,
    unknown_threshold: f64,
    proximity_threshold: f64,
    format: String,
) -> Result<()> {
    let complaint = match (complaint, file) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(&path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?,
        (None, None) => eyre::bail!("provide a complaint string or --file"),
    };

    let model = LinearModel::load(&model_path)
        .wrap_err_with(|| format!("failed to load model from {}", model_path.display()))?;

    let outcome = faultline::diagnose(&complaint, &model, unknown_threshold, proximity_threshold)?;

    match format.as_str() {
        "json" => {
            let issues: Vec<serde_json::Value> = outcome
                .predictions
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.label,
                        "confidence": p.confidence,
                        "severity": Severity::from_confidence(p.confidence).as_str(),
                    })
                })
                .collect();
            let result = serde_json::json!({
                "issues": issues,
                "suppression_applied": {
                    "unknown_suppressed": outcome.unknown_suppressed,
                    "other_suppressed": outcome.other_suppressed,
                },
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Diagnosis");
            println!("=========");
            for p in &outcome.predictions {
                println!(
                    "  {:<40} {:>5.1}%  [{}]",
                    p.label,
                    p.confidence * 100.0,
                    Severity::from_confidence(p.confidence).as_str()
                );
            }
            if outcome.unknown_suppressed {
                println!();
                println!("(catch-all prediction suppressed)");
            }
        }
    }

    Ok(())
}

/// One labeled complaint in the evaluation dataset.
#[derive(Deserialize)]
struct EvalRecord {
    summary: String,
    label: String,
}

fn cmd_eval(dataset: PathBuf, model_path: PathBuf) -> Result<()> {
    let model = LinearModel::load(&model_path)
        .wrap_err_with(|| format!("failed to load model from {}", model_path.display()))?;

    let file = fs::File::open(&dataset)
        .wrap_err_with(|| format!("failed to open {}", dataset.display()))?;
    let reader = std::io::BufReader::new(file);

    let mut total = 0u64;
    let mut skipped = 0u64;
    let mut top1_hits = 0u64;
    let mut top3_hits = 0u64;
    let mut per_class: BTreeMap<String, (u64, u64)> = BTreeMap::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EvalRecord = serde_json::from_str(&line)
            .wrap_err_with(|| format!("invalid record on line {}", line_no + 1))?;

        // Same validation and normalization path as the live service; no
        // suppression, matching how the model was scored at training time.
        let ranked = match predict(&record.summary, &model) {
            Ok(ranked) => ranked,
            Err(PredictError::Validation(_)) => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        total += 1;
        let entry = per_class.entry(record.label.clone()).or_insert((0, 0));
        entry.1 += 1;

        if ranked.first().map(|p| p.label.as_str()) == Some(record.label.as_str()) {
            top1_hits += 1;
            entry.0 += 1;
        }
        if ranked
            .iter()
            .take(3)
            .any(|p| p.label == record.label)
        {
            top3_hits += 1;
        }
    }

    if total == 0 {
        eyre::bail!("no scorable records in {}", dataset.display());
    }

    println!("Evaluation Results");
    println!("==================");
    println!("Records scored:  {total}");
    println!("Records skipped: {skipped}");
    println!(
        "Top-1 accuracy:  {:.2}%",
        top1_hits as f64 / total as f64 * 100.0
    );
    println!(
        "Top-3 accuracy:  {:.2}%",
        top3_hits as f64 / total as f64 * 100.0
    );
    println!();
    println!("Per-class top-1:");
    for (label, (hits, count)) in &per_class {
        println!(
            "  {:<40} {:>4}/{:<4} ({:.1}%)",
            label,
            hits,
            count,
            *hits as f64 / *count as f64 * 100.0
        );
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("faultline=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            bind,
            rate_limit,
            access_log,
            model,
            unknown_threshold,
            proximity_threshold,
        } => cmd_serve(
            bind,
            rate_limit,
            access_log,
            model,
            unknown_threshold,
            proximity_threshold,
        ),
        Commands::Diagnose {
            complaint,
            file,
            model,
            unknown_threshold,
            proximity_threshold,
            format,
        } => cmd_diagnose(
            complaint,
            file,
            model,
            unknown_threshold,
            proximity_threshold,
            format,
        ),
        Commands::Eval { dataset, model } => cmd_eval(dataset, model),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}
