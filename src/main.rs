use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};

use healthtrend::export::{json, text, DateRange, ExportFormat};
use healthtrend::import::{ImportBatch, ImportManager};
use healthtrend::logging::{init_logging, LogConfig, LogFormat};
use healthtrend::{AnalysisConfig, AnalysisOrchestrator, Metric, RiskLevel};

/// HealthTrend - Health Log Trend Analysis CLI
///
/// Fits trend models to a daily symptom log, forecasts each metric and
/// flags flare-up risk and anomalies.
#[derive(Parser)]
#[command(name = "healthtrend")]
#[command(author = "HealthTrend Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Health Log Trend Analysis CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format (pretty, json, compact)
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Also write JSON logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Append to the log file instead of rolling it daily
    #[arg(long, global = true, requires = "log_file")]
    log_no_rotate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a reporting window of a health log
    Analyze {
        /// Input file path (CSV, JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Window start (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Window end (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Output format (table, json)
        #[arg(short = 'F', long, default_value = "table")]
        format: String,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Forecast one metric from its full history
    Forecast {
        /// Input file path (CSV, JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Metric to forecast (e.g. fatigue, backPain, "Joint Pain")
        #[arg(short, long)]
        metric: Metric,

        /// Number of days to predict
        #[arg(short, long, default_value = "7")]
        days: usize,

        /// Confidence level for the prediction interval
        #[arg(short = 'C', long)]
        confidence: Option<f64>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check a log file and list values that could not be imported
    Validate {
        /// Input file path (CSV, JSON)
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogConfig::for_cli(
        cli.verbose,
        cli.log_format,
        cli.log_file.clone(),
        !cli.log_no_rotate,
    ))?;

    let config = match &cli.config {
        Some(path) => AnalysisConfig::load_from_file(path)?,
        None => AnalysisConfig::load_or_default(),
    };

    match cli.command {
        Commands::Analyze {
            file,
            from,
            to,
            format,
            output,
        } => {
            let format: ExportFormat = format.parse()?;
            let batch = import(&file)?;
            let orchestrator = AnalysisOrchestrator::new(config)?;

            let window = DateRange::new(from, to).filter_entries(&batch.entries);
            let training = DateRange::new(None, to).filter_entries(&batch.entries);
            let result = orchestrator.analyze(&window, &training);

            match (format, output) {
                (ExportFormat::Json, Some(path)) => {
                    json::export_json(&result, &path)?;
                    println!("{} {}", "✓ Analysis written to".green(), path.display());
                }
                (ExportFormat::Json, None) => println!("{}", json::to_json_string(&result)?),
                (ExportFormat::Text, Some(path)) => {
                    text::export_text(&result, &path)?;
                    println!("{} {}", "✓ Report written to".green(), path.display());
                }
                (ExportFormat::Text, None) => {
                    print!("{}", text::render_analysis_report(&result)?);
                    if let Some(risk) = &result.flare_up_risk {
                        let headline = format!("Flare-up risk: {}", risk.level);
                        let headline = match risk.level {
                            RiskLevel::High => headline.red().bold(),
                            RiskLevel::Moderate => headline.yellow().bold(),
                            RiskLevel::Low => headline.green().bold(),
                        };
                        println!("\n{}", headline);
                    }
                }
            }
        }

        Commands::Forecast {
            file,
            metric,
            days,
            confidence,
            json: as_json,
        } => {
            let batch = import(&file)?;
            let orchestrator = AnalysisOrchestrator::new(config)?;

            match orchestrator.forecast(&batch.entries, metric, days, confidence)? {
                Some(forecast) if as_json => println!("{}", json::to_json_string(&forecast)?),
                Some(forecast) => println!("{}", text::render_forecast(&forecast)),
                None => println!(
                    "{}",
                    format!("No valid {} readings to forecast from", metric.label()).yellow()
                ),
            }
        }

        Commands::Validate { file } => {
            let batch = import(&file)?;
            let report = &batch.report;

            println!(
                "{} {} of {} records imported, {} skipped",
                "Validated".cyan().bold(),
                report.imported,
                report.records,
                report.skipped
            );
            if report.is_clean() {
                println!("{}", "✓ No problems found".green());
            } else {
                for issue in &report.issues {
                    println!(
                        "  {} row {}: {} = {:?} ({})",
                        "!".yellow(),
                        issue.row + 1,
                        issue.field,
                        issue.value,
                        issue.reason
                    );
                }
            }
        }
    }

    Ok(())
}

fn import(file: &Path) -> Result<ImportBatch> {
    ImportManager::new()
        .import_file(file)
        .map_err(|e| anyhow::anyhow!(e.user_message()))
        .with_context(|| format!("Failed to import {}", file.display()))
}
