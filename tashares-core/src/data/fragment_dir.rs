//! Job unit backed by pre-built per-symbol fragment files.
//!
//! Layout: `{data_dir}/{dataset}/{symbol}.tsv`
//!
//! An external feature pipeline (or [`SyntheticJob`](super::SyntheticJob)
//! with `dump_files`) writes one tab-separated file per symbol and dataset.
//! A missing file simply means the symbol has no fragment for that dataset.

use std::path::{Path, PathBuf};

use polars::prelude::*;

use super::load::read_tsv;
use crate::dataset::{to_tsv, DatasetName};
use crate::job::{JobError, JobOutput, JobParams, JobUnit};

/// Path of one fragment file.
pub fn fragment_path(data_dir: &Path, dataset: &DatasetName, symbol: &str) -> PathBuf {
    data_dir.join(dataset.as_str()).join(format!("{symbol}.tsv"))
}

/// Write a fragment atomically: write to `.tmp`, then rename into place.
pub fn write_fragment(
    data_dir: &Path,
    dataset: &DatasetName,
    symbol: &str,
    fragment: &DataFrame,
) -> Result<PathBuf, JobError> {
    let path = fragment_path(data_dir, dataset, symbol);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tsv.tmp");
    std::fs::write(&tmp_path, to_tsv(fragment, Some(6))?)?;
    std::fs::rename(&tmp_path, &path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp_path);
    })?;
    Ok(path)
}

/// Reads fragments from `{data_dir}/{dataset}/{symbol}.tsv`.
#[derive(Debug, Clone)]
pub struct FragmentDirJob {
    datasets: Vec<DatasetName>,
}

impl FragmentDirJob {
    /// Reader for the standard `training`, `test` and `forecasting` datasets.
    pub fn new() -> Self {
        Self::with_datasets(vec![
            DatasetName::training(),
            DatasetName::test(),
            DatasetName::forecasting(),
        ])
    }

    /// Reader for an arbitrary set of dataset names.
    pub fn with_datasets(datasets: Vec<DatasetName>) -> Self {
        Self { datasets }
    }
}

impl Default for FragmentDirJob {
    fn default() -> Self {
        Self::new()
    }
}

impl JobUnit for FragmentDirJob {
    fn name(&self) -> &str {
        "fragment-dir"
    }

    fn run(&self, symbol: &str, params: &JobParams) -> Result<JobOutput, JobError> {
        let mut output = JobOutput::new();
        for dataset in &self.datasets {
            if params.forecast_only && dataset.as_str() != DatasetName::FORECASTING {
                continue;
            }
            let path = fragment_path(&params.data_dir, dataset, symbol);
            if !path.exists() {
                continue;
            }
            output.insert(dataset.clone(), read_tsv(&path)?);
        }
        Ok(output)
    }
}
