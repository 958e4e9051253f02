//! Multi-model ranking ensemble.
//!
//! Every configured model scores the same pool; the ensemble score is the
//! arithmetic mean of the per-model predictions. The ranked table keeps the
//! identity columns, one column per model (named after the model file's
//! stem) and the score, ordered newest date first and best score first, with
//! a `rank` column giving each row's position in that ordering.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polars::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use tashares_core::dataset::{columns, has_column};
use tashares_core::model::model_stem;
use tashares_core::{
    build_pool, compute_metrics, FileModelLoader, MetricError, ModelError, ModelFormat,
    ModelLoader, Pool, PoolError, PrecisionReport,
};

use crate::config::TaskConfig;

/// Errors from the ensemble.
#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("the ensemble has no models")]
    EmptyModelList,

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("model '{model}': {source}")]
    Model {
        model: String,
        #[source]
        source: ModelError,
    },

    #[error("model '{model}' returned {actual} predictions for {expected} rows")]
    PredictionCount {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("two models share the column name '{0}'")]
    DuplicateModel(String),

    #[error("forecasting table has no '{0}' column")]
    MissingColumn(String),

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// What a run of the ensemble produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnsembleMode {
    /// Score with every model and rank.
    #[default]
    Rank,
    /// Score with the first model only and evaluate it against
    /// `binary_label`, grouped by `date`.
    EvaluateFirstModel,
}

#[derive(Debug, Clone)]
pub enum EnsembleOutcome {
    Ranked(DataFrame),
    Evaluated(PrecisionReport),
}

/// An ordered list of models plus the pool settings they share.
pub struct RankingEnsemble {
    model_paths: Vec<PathBuf>,
    format: ModelFormat,
    loader: Arc<dyn ModelLoader>,
    extra_drop: Vec<String>,
}

impl RankingEnsemble {
    pub fn new(model_paths: Vec<PathBuf>, format: ModelFormat) -> Self {
        Self {
            model_paths,
            format,
            loader: Arc::new(FileModelLoader),
            extra_drop: Vec::new(),
        }
    }

    /// The ensemble configured for one task.
    pub fn from_task(task: &TaskConfig) -> Self {
        Self::new(task.model_paths(), task.model_format)
            .with_extra_drop(task.extra_drop_columns.clone())
    }

    pub fn with_loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Additional non-feature columns to strip from the pool.
    pub fn with_extra_drop(mut self, columns: Vec<String>) -> Self {
        self.extra_drop = columns;
        self
    }

    pub fn model_paths(&self) -> &[PathBuf] {
        &self.model_paths
    }

    pub fn run(&self, table: &DataFrame, mode: EnsembleMode) -> Result<EnsembleOutcome, EnsembleError> {
        match mode {
            EnsembleMode::Rank => self.rank(table).map(EnsembleOutcome::Ranked),
            EnsembleMode::EvaluateFirstModel => {
                self.evaluate_first_model(table).map(EnsembleOutcome::Evaluated)
            }
        }
    }

    /// Score `table` with every model and rank the rows.
    pub fn rank(&self, table: &DataFrame) -> Result<DataFrame, EnsembleError> {
        if self.model_paths.is_empty() {
            return Err(EnsembleError::EmptyModelList);
        }
        let pool = build_pool(table, &self.extra_drop)?;
        let mut seen = HashSet::new();
        let mut model_columns = Vec::with_capacity(self.model_paths.len());
        let mut sum = vec![0.0; pool.len()];

        for path in &self.model_paths {
            let name = model_stem(path);
            if !seen.insert(name.clone()) {
                return Err(EnsembleError::DuplicateModel(name));
            }
            let predictions = self.predict(path, &pool)?;
            for (acc, p) in sum.iter_mut().zip(&predictions) {
                *acc += p;
            }
            model_columns.push(Column::new(name.into(), predictions));
        }

        let n = self.model_paths.len() as f64;
        let score: Vec<f64> = sum.into_iter().map(|s| s / n).collect();
        let ranked = assemble(table, model_columns, score)?;
        info!(
            "{} rows ranked by an ensemble of {} models",
            ranked.height(),
            self.model_paths.len()
        );
        Ok(ranked)
    }

    /// Score `table` with the first model and report its precision-at-k
    /// against the table's `binary_label`, grouped by `date`.
    pub fn evaluate_first_model(&self, table: &DataFrame) -> Result<PrecisionReport, EnsembleError> {
        let path = self.model_paths.first().ok_or(EnsembleError::EmptyModelList)?;
        let pool = build_pool(table, &self.extra_drop)?;
        let predictions = self.predict(path, &pool)?;
        let report = compute_metrics(table, &predictions, columns::DATE)?;
        for (k, value) in report.iter() {
            info!("{}: PrecisionAt:top={k} = {value:.4}", model_stem(path));
        }
        Ok(report)
    }

    fn predict(&self, path: &Path, pool: &Pool) -> Result<Vec<f64>, EnsembleError> {
        let model_error = |source: ModelError| EnsembleError::Model {
            model: path.display().to_string(),
            source,
        };
        let model = self.loader.load(path, self.format).map_err(model_error)?;
        let predictions = model.predict(pool).map_err(model_error)?;
        if predictions.len() != pool.len() {
            return Err(EnsembleError::PredictionCount {
                model: path.display().to_string(),
                expected: pool.len(),
                actual: predictions.len(),
            });
        }
        debug!("{} scored {} rows", path.display(), predictions.len());
        Ok(predictions)
    }
}

/// Build the ranked table: `rank`, `symbol`, `date`, per-model columns,
/// `score`, `shortname`, `sector`.
fn assemble(
    table: &DataFrame,
    model_columns: Vec<Column>,
    score: Vec<f64>,
) -> Result<DataFrame, EnsembleError> {
    let identity = |name: &str| -> Result<Column, EnsembleError> {
        if !has_column(table, name) {
            return Err(EnsembleError::MissingColumn(name.to_string()));
        }
        Ok(table.column(name)?.clone())
    };

    let mut cols = vec![identity(columns::SYMBOL)?, identity(columns::DATE)?];
    cols.extend(model_columns);
    cols.push(Column::new(columns::SCORE.into(), score));
    cols.push(identity(columns::SHORTNAME)?);
    cols.push(identity(columns::SECTOR)?);

    let ranked = DataFrame::new(cols)?
        .sort(
            [columns::DATE, columns::SCORE],
            SortMultipleOptions::default()
                .with_order_descending_multi([true, true])
                .with_maintain_order(true),
        )?
        .with_row_index(columns::RANK.into(), None)?;
    Ok(ranked)
}
