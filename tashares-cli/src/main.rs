//! Tashares CLI: forecast, evaluate and dataset dump commands.
//!
//! Commands:
//! - `forecast`: rank a task's symbols of interest with its model ensemble
//! - `evaluate`: score a dumped dataset with the first model, report precision
//! - `dump`: build every dataset over the task's symbol list and save it
//! - `config`: print the built-in configuration as TOML

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tashares_core::data::{FragmentDirJob, SyntheticJob};
use tashares_core::JobUnit;
use tashares_runner::{save_precision_csv, EnsembleOutcome, Tashares, TasharesConfig};

/// Business days of history generated per symbol by `--synthetic`.
const SYNTHETIC_HISTORY_DAYS: usize = 260;

#[derive(Parser)]
#[command(
    name = "tashares",
    about = "Tashares: per-symbol feature fan-out and ensemble stock ranking"
)]
struct Cli {
    /// TOML config file. Defaults to the built-in ashares/stocks tasks.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the symbols of interest with the task's model ensemble.
    Forecast {
        /// Task name (e.g. ashares, stocks).
        #[arg(long)]
        task: String,

        /// Symbol list file. Defaults to the task's symbols_of_interest.
        #[arg(long)]
        symbols: Option<PathBuf>,

        /// Where to save the ranked result (TSV).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also save the merged forecasting table here (TSV).
        #[arg(long)]
        dump_data: Option<PathBuf>,

        /// Generate synthetic fragments instead of reading fragment files.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Evaluate the task's first model against a dumped dataset with known
    /// outcomes.
    Evaluate {
        #[arg(long)]
        task: String,

        /// Ground-truth dataset (TSV written by `dump` or `forecast --dump-data`).
        #[arg(long)]
        data: PathBuf,

        /// Where to save the precision report (CSV).
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Build training, test and forecasting datasets and save them as
    /// `{data_dir}/{name}_{task}.csv`.
    Dump {
        #[arg(long)]
        task: String,

        /// Symbol list file. Defaults to the task's symbol_list.
        #[arg(long)]
        symbols: Option<PathBuf>,

        /// Output directory. Defaults to the task's data_dir.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// First date of history (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last date allowed in the training split (YYYY-MM-DD).
        #[arg(long)]
        max_training_date: Option<NaiveDate>,

        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Print the built-in configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Forecast {
            task,
            symbols,
            output,
            dump_data,
            synthetic,
        } => run_forecast(&config, &task, symbols, output, dump_data, synthetic),
        Commands::Evaluate { task, data, report } => {
            run_evaluate(&config, &task, &data, report.as_deref())
        }
        Commands::Dump {
            task,
            symbols,
            data_dir,
            start,
            max_training_date,
            synthetic,
        } => {
            let mut config = config;
            if let Some(start) = start {
                config.defaults.start_from_date = start;
            }
            if let Some(max_training_date) = max_training_date {
                config.defaults.max_training_date = max_training_date;
            }
            config.validate()?;
            run_dump(&config, &task, symbols, data_dir.as_deref(), synthetic)
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&TasharesConfig::default())?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<TasharesConfig> {
    match path {
        Some(path) => TasharesConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(TasharesConfig::default()),
    }
}

fn job_unit(synthetic: bool) -> Arc<dyn JobUnit> {
    if synthetic {
        Arc::new(SyntheticJob::new(SYNTHETIC_HISTORY_DAYS))
    } else {
        Arc::new(FragmentDirJob::new())
    }
}

fn run_forecast(
    config: &TasharesConfig,
    task: &str,
    symbols: Option<PathBuf>,
    output: Option<PathBuf>,
    dump_data: Option<PathBuf>,
    synthetic: bool,
) -> Result<()> {
    let mut pipeline = Tashares::new(task, config)?.with_job(job_unit(synthetic));
    if let Some(symbols) = symbols {
        pipeline = pipeline.with_symbol_list(symbols);
    }
    if let Some(output) = output {
        pipeline = pipeline.with_results_path(output);
    }
    if let Some(dump) = dump_data {
        pipeline = pipeline.with_forecast_dump(dump);
    }

    let outcome = pipeline
        .forecast()
        .with_context(|| format!("forecast for task '{task}' failed"))?;
    pipeline.dump_forecast_data()?;

    if let EnsembleOutcome::Ranked(ranked) = outcome {
        println!("{}", ranked.head(Some(20)));
    }
    Ok(())
}

fn run_evaluate(
    config: &TasharesConfig,
    task: &str,
    data: &Path,
    report_path: Option<&Path>,
) -> Result<()> {
    let mut pipeline = Tashares::new(task, config)?.with_ground_truth(data)?;
    let outcome = pipeline
        .forecast()
        .with_context(|| format!("evaluating {} failed", data.display()))?;

    if let EnsembleOutcome::Evaluated(report) = outcome {
        for (k, value) in report.iter() {
            println!("PrecisionAt:top={k:<3} {value:.4}");
        }
        println!("sum                {:.4}", report.sum());
        if let Some(path) = report_path {
            save_precision_csv(&report, path)?;
        }
    }
    Ok(())
}

fn run_dump(
    config: &TasharesConfig,
    task: &str,
    symbols: Option<PathBuf>,
    data_dir: Option<&Path>,
    synthetic: bool,
) -> Result<()> {
    let task_config = config.task(task)?;
    let symbols = symbols.unwrap_or_else(|| task_config.symbol_list_path());
    let pipeline = Tashares::new(task, config)?
        .with_symbol_list(symbols)
        .with_job(job_unit(synthetic));

    let written = pipeline.dump_datafiles(data_dir)?;
    info!("{} dataset files written", written.len());
    Ok(())
}
