//! Artifact export: ranked results, forecast dumps, dataset dumps and
//! precision reports.
//!
//! Tables are written as tab-separated UTF-8 with a header row and no index
//! column. Float precision depends on the artifact:
//! - ranked result: 5 decimals
//! - forecasting dump: 6 decimals
//! - dataset dump: 4 decimals

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use tracing::{info, warn};

use tashares_core::dataset::to_tsv;
use tashares_core::metrics::PRECISION_TOPS;
use tashares_core::{DatasetMap, PrecisionReport};

pub const RESULT_PRECISION: usize = 5;
pub const FORECAST_PRECISION: usize = 6;
pub const DATASET_PRECISION: usize = 4;

/// Write a table as TSV with the given float precision.
pub fn write_tsv(df: &DataFrame, path: &Path, precision: usize) -> Result<()> {
    let bytes = to_tsv(df, Some(precision))
        .with_context(|| format!("failed to serialize table for {}", path.display()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

/// Save a ranked result table.
pub fn save_rank_result(ranked: &DataFrame, path: &Path) -> Result<()> {
    write_tsv(ranked, path, RESULT_PRECISION)?;
    info!("ranked result saved to {}", path.display());
    Ok(())
}

/// Save the merged forecasting table, e.g. for later validation.
pub fn save_forecast_data(forecasting: &DataFrame, path: &Path) -> Result<()> {
    write_tsv(forecasting, path, FORECAST_PRECISION)?;
    info!("forecasting data saved to {}", path.display());
    Ok(())
}

/// Path of one dataset dump: `{data_dir}/{name}_{task}.csv`.
pub fn dataset_dump_path(data_dir: &Path, name: &str, task: &str) -> PathBuf {
    data_dir.join(format!("{name}_{task}.csv"))
}

/// Dump every dataset table into `data_dir`.
///
/// Existing files are never overwritten, and a missing `data_dir` only
/// produces a warning. Returns the paths actually written.
pub fn dump_stockjobs(
    tables: &DatasetMap<DataFrame>,
    task: &str,
    data_dir: &Path,
) -> Result<Vec<PathBuf>> {
    if !data_dir.is_dir() {
        warn!("{} does not exist, nothing dumped", data_dir.display());
        return Ok(Vec::new());
    }

    let mut written = Vec::new();
    for (name, table) in tables {
        let path = dataset_dump_path(data_dir, name.as_str(), task);
        if path.exists() {
            warn!("{} already exists, skipped", path.display());
            continue;
        }
        write_tsv(table, &path, DATASET_PRECISION)?;
        info!("{} rows saved to {}", table.height(), path.display());
        written.push(path);
    }
    Ok(written)
}

/// Render a precision report as CSV with columns `metric,value`.
pub fn export_precision_csv(report: &PrecisionReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["metric", "value"])?;
    for (k, value) in report.iter() {
        wtr.write_record([format!("PrecisionAt:top={k}"), format!("{value:.6}")])?;
    }
    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Parse a precision report written by [`export_precision_csv`].
pub fn import_precision_csv(text: &str) -> Result<PrecisionReport> {
    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    let mut values = [f64::NAN; PRECISION_TOPS.len()];
    for record in rdr.records() {
        let record = record?;
        let metric = record.get(0).context("missing metric column")?;
        let value: f64 = record
            .get(1)
            .context("missing value column")?
            .parse()
            .with_context(|| format!("invalid value for {metric}"))?;
        let k: usize = metric
            .strip_prefix("PrecisionAt:top=")
            .and_then(|k| k.parse().ok())
            .with_context(|| format!("unexpected metric '{metric}'"))?;
        let slot = PRECISION_TOPS
            .iter()
            .position(|&top| top == k)
            .with_context(|| format!("unexpected cut-off {k}"))?;
        values[slot] = value;
    }
    anyhow::ensure!(values.iter().all(|v| !v.is_nan()), "precision report is incomplete");
    Ok(PrecisionReport { values })
}

/// Save a precision report as CSV.
pub fn save_precision_csv(report: &PrecisionReport, path: &Path) -> Result<()> {
    let text = export_precision_csv(report)?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!("precision report saved to {}", path.display());
    Ok(())
}
