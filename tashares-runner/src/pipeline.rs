//! The end-to-end pipeline for one task: fan out per-symbol jobs, aggregate
//! the forecasting table, rank it with the task's ensemble and persist the
//! result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use polars::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use tashares_core::data::{load_data, read_symbol_list, upgrade_targets, FragmentDirJob, LoadError};
use tashares_core::dataset::{columns, has_column};
use tashares_core::pool::string_values;
use tashares_core::{DatasetMap, DatasetName, JobParams, JobUnit, ModelLoader};

use crate::aggregate::{aggregate_datasets, AggregateError};
use crate::config::{ConfigError, Defaults, TaskConfig, TasharesConfig};
use crate::ensemble::{EnsembleError, EnsembleMode, EnsembleOutcome, RankingEnsemble};
use crate::export::{dump_stockjobs, save_forecast_data, save_rank_result};
use crate::scheduler::{JobScheduler, LogProgress, ScheduleError};

/// Errors from the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read symbol list '{path}': {source}")]
    SymbolList {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Ensemble(#[from] EnsembleError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("ground truth '{0}' is empty or unreadable")]
    EmptyGroundTruth(String),

    #[error("no forecasting data")]
    NoForecastData,

    #[error(transparent)]
    Export(#[from] anyhow::Error),
}

/// Run `job` for every symbol and merge the fragments into one table per
/// dataset name.
pub fn wrap_stockjobs(
    job: Arc<dyn JobUnit>,
    symbols: &[String],
    params: JobParams,
    scheduler: &JobScheduler,
) -> Result<DatasetMap<DataFrame>, PipelineError> {
    info!(
        "{} jobs for {} symbols on {} workers",
        job.name(),
        symbols.len(),
        scheduler.workers()
    );
    let report = scheduler.run(job, symbols, Arc::new(params), Some(&LogProgress))?;
    for failure in &report.failures {
        warn!("{} skipped: {}", failure.symbol, failure.error);
    }
    let tables = aggregate_datasets(report.fragments)?;
    for (name, table) in &tables {
        info!("{name}: {} rows", table.height());
    }
    Ok(tables)
}

/// One task's forecasting pipeline.
pub struct Tashares {
    task_name: String,
    task: TaskConfig,
    defaults: Defaults,
    symbol_list: Option<PathBuf>,
    results_to: Option<PathBuf>,
    forecast_dump: Option<PathBuf>,
    mode: EnsembleMode,
    job: Arc<dyn JobUnit>,
    loader: Option<Arc<dyn ModelLoader>>,
    forecast_data: DataFrame,
}

impl Tashares {
    /// Pipeline for `task_name`. `forecast` scores the task's symbols of
    /// interest and `dump_datafiles` covers its full symbol list.
    pub fn new(task_name: &str, config: &TasharesConfig) -> Result<Self, PipelineError> {
        let task = config.task(task_name)?.clone();
        Ok(Self {
            task_name: task_name.to_string(),
            symbol_list: None,
            task,
            defaults: config.defaults.clone(),
            results_to: None,
            forecast_dump: None,
            mode: EnsembleMode::Rank,
            job: Arc::new(FragmentDirJob::new()),
            loader: None,
            forecast_data: DataFrame::empty(),
        })
    }

    /// Symbol list used by both `forecast` and `dump_datafiles`.
    pub fn with_symbol_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.symbol_list = Some(path.into());
        self
    }

    /// Where `forecast` writes the ranked table.
    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_to = Some(path.into());
        self
    }

    /// Where `dump_forecast_data` writes the forecasting table.
    pub fn with_forecast_dump(mut self, path: impl Into<PathBuf>) -> Self {
        self.forecast_dump = Some(path.into());
        self
    }

    pub fn with_job(mut self, job: Arc<dyn JobUnit>) -> Self {
        self.job = job;
        self
    }

    pub fn with_model_loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Validate against a previously dumped table with known outcomes.
    ///
    /// The table replaces the fan-out and `forecast` switches to evaluating
    /// the first model.
    pub fn with_ground_truth(mut self, path: &Path) -> Result<Self, PipelineError> {
        let table = load_data(path, columns::DATE);
        if table.is_empty() {
            return Err(PipelineError::EmptyGroundTruth(path.display().to_string()));
        }
        self.forecast_data = upgrade_targets(table, &self.defaults.forecast_job)?;
        self.mode = EnsembleMode::EvaluateFirstModel;
        Ok(self)
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn mode(&self) -> EnsembleMode {
        self.mode
    }

    /// The current forecasting table (empty until fetched or preloaded).
    pub fn forecast_data(&self) -> &DataFrame {
        &self.forecast_data
    }

    fn scheduler(&self) -> JobScheduler {
        JobScheduler::new()
            .with_workers(self.defaults.workers)
            .with_policy(self.defaults.failure_policy)
    }

    fn params(&self, forecast_only: bool) -> JobParams {
        self.defaults.job_params(&self.task, forecast_only)
    }

    fn symbols(&self, default_list: PathBuf) -> Result<Vec<String>, PipelineError> {
        let path = self.symbol_list.clone().unwrap_or(default_list);
        read_symbol_list(&path).map_err(|source| PipelineError::SymbolList {
            path: path.display().to_string(),
            source,
        })
    }

    fn ensemble(&self) -> RankingEnsemble {
        let ensemble = RankingEnsemble::from_task(&self.task);
        match &self.loader {
            Some(loader) => ensemble.with_loader(Arc::clone(loader)),
            None => ensemble,
        }
    }

    /// Fan out forecast-only jobs and keep the merged `forecasting` table.
    fn fetch_forecast_data(&self) -> Result<DataFrame, PipelineError> {
        let symbols = self.symbols(self.task.symbols_of_interest_path())?;
        let mut tables = wrap_stockjobs(
            Arc::clone(&self.job),
            &symbols,
            self.params(true),
            &self.scheduler(),
        )?;
        Ok(tables
            .remove(DatasetName::FORECASTING)
            .unwrap_or_else(DataFrame::empty))
    }

    /// Rank (or, with ground truth, evaluate) the forecasting table.
    pub fn forecast(&mut self) -> Result<EnsembleOutcome, PipelineError> {
        if self.forecast_data.is_empty() {
            self.forecast_data = self.fetch_forecast_data()?;
        }
        if self.forecast_data.is_empty() {
            return Err(PipelineError::NoForecastData);
        }

        let outcome = self.ensemble().run(&self.forecast_data, self.mode)?;
        if let EnsembleOutcome::Ranked(ranked) = &outcome {
            if let Some(path) = &self.results_to {
                save_rank_result(ranked, path)?;
            }
            log_ranked(ranked);
        }
        Ok(outcome)
    }

    /// Persist the forecasting table, if there is one and a path was given.
    pub fn dump_forecast_data(&self) -> Result<Option<PathBuf>, PipelineError> {
        match &self.forecast_dump {
            Some(path) if !self.forecast_data.is_empty() => {
                save_forecast_data(&self.forecast_data, path)?;
                Ok(Some(path.clone()))
            }
            _ => Ok(None),
        }
    }

    /// Build every dataset over the task's full symbol list and dump them as
    /// `{data_dir}/{name}_{task}.csv`.
    pub fn dump_datafiles(&self, data_dir: Option<&Path>) -> Result<Vec<PathBuf>, PipelineError> {
        let symbols = self.symbols(self.task.symbol_list_path())?;
        let tables = wrap_stockjobs(
            Arc::clone(&self.job),
            &symbols,
            self.params(false),
            &self.scheduler(),
        )?;
        let dir = data_dir.unwrap_or(&self.task.data_dir);
        Ok(dump_stockjobs(&tables, &self.task_name, dir)?)
    }
}

fn log_ranked(ranked: &DataFrame) {
    if ranked.is_empty() || !has_column(ranked, columns::DATE) {
        return;
    }
    if let Ok(date) = ranked.column(columns::DATE).and_then(|c| c.get(0)) {
        info!("forecast for {date}: {} symbols ranked", ranked.height());
    }
    if let Ok(symbols) = string_values(ranked, columns::SYMBOL) {
        debug!("ranking: {}", symbols.join(", "));
    }
}
