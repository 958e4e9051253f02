//! Tashares Runner: job fan-out, dataset aggregation, ensemble ranking and
//! artifact export.
//!
//! This crate builds on `tashares-core` to provide:
//! - A bounded worker pool running one job unit per symbol
//! - Canonical merging of per-symbol fragments into dataset tables
//! - The multi-model ranking ensemble and its evaluation mode
//! - TOML task configuration
//! - TSV/CSV export of ranked results, forecasts and dataset dumps
//! - The `Tashares` pipeline object tying these together

pub mod aggregate;
pub mod config;
pub mod ensemble;
pub mod export;
pub mod pipeline;
pub mod scheduler;

pub use aggregate::{aggregate_datasets, merge_fragments, AggregateError};
pub use config::{ConfigError, Defaults, TaskConfig, TasharesConfig};
pub use ensemble::{EnsembleError, EnsembleMode, EnsembleOutcome, RankingEnsemble};
pub use export::{
    dump_stockjobs, export_precision_csv, save_forecast_data, save_precision_csv,
    save_rank_result,
};
pub use pipeline::{wrap_stockjobs, PipelineError, Tashares};
pub use scheduler::{
    default_workers, FailurePolicy, JobFailure, JobProgress, JobScheduler, LogProgress,
    ScheduleError, ScheduleReport,
};
