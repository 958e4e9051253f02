//! The per-symbol job contract.
//!
//! A job unit turns one symbol into zero or more named fragments (typically
//! `training`, `test` and `forecasting`). Feature engineering and the
//! train/test/forecast split live behind this trait; the scheduler only sees
//! the fragments that come back.

use std::path::PathBuf;

use chrono::NaiveDate;
use polars::prelude::PolarsError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{DatasetMap, Fragment};

/// Fragments returned by one job unit, keyed by dataset name.
pub type JobOutput = DatasetMap<Fragment>;

/// Immutable parameter set handed to every job unit of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    /// Directory holding per-symbol history and fragment files.
    pub data_dir: PathBuf,
    /// Refresh price history before building features.
    pub update_history: bool,
    /// First date of history to consider.
    pub start_from_date: NaiveDate,
    /// Last date that may land in the training segment.
    pub max_training_date: NaiveDate,
    /// Only produce the `forecasting` fragment.
    pub forecast_only: bool,
    /// Persist the produced fragments under `data_dir`.
    pub dump_files: bool,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            update_history: false,
            start_from_date: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            max_training_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            forecast_only: false,
            dump_files: false,
        }
    }
}

/// Errors a job unit may raise.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no history available for '{symbol}'")]
    NoHistory { symbol: String },

    #[error("invalid fragment data: {0}")]
    InvalidData(String),

    #[error("job panicked: {0}")]
    Panicked(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// One independent unit of per-symbol work.
///
/// Implementations must not rely on shared mutable state: the scheduler runs
/// many of them at once and in no particular order.
pub trait JobUnit: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Produce the named fragments for `symbol`.
    fn run(&self, symbol: &str, params: &JobParams) -> Result<JobOutput, JobError>;
}
