//! Ground-truth table loading and target upgrading.
//!
//! Validation runs score a previously dumped forecasting table whose
//! forward returns are already known. The table is read back, put into
//! canonical order, its identifying text columns are replaced by 1-based
//! category codes, and a binary relevance label is derived from the chosen
//! forward-return horizon.

use std::path::Path;

use polars::prelude::*;
use thiserror::Error;
use tracing::{error, info};

use crate::dataset::{columns, has_column};

/// Text columns replaced by category codes on load.
pub const CATEGORICAL_COLUMNS: [&str; 6] = [
    columns::DATE,
    columns::SYMBOL,
    columns::QUERYID,
    columns::SECTOR,
    columns::INDUSTRY,
    columns::SHORTNAME,
];

/// Errors from the loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("required column '{0}' is missing")]
    MissingColumn(String),

    #[error("table has no target columns")]
    NoTargets,

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// Read a tab-separated file with a header row.
pub fn read_tsv(path: &Path) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .map_parse_options(|opts| opts.with_separator(b'\t'))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
}

/// Load a dumped dataset for validation.
///
/// Rows are sorted by (`queryid` argument, `queryid` column). A file that
/// cannot be read or lacks the categorical columns yields an empty table
/// after logging the failure; callers decide whether that is fatal.
pub fn load_data(path: &Path, queryid: &str) -> DataFrame {
    match try_load_data(path, queryid) {
        Ok(df) => {
            info!("{} loaded ({} rows)", path.display(), df.height());
            df
        }
        Err(e) => {
            error!("loading {} failed: {e}", path.display());
            DataFrame::empty()
        }
    }
}

/// Fallible core of [`load_data`].
pub fn try_load_data(path: &Path, queryid: &str) -> Result<DataFrame, LoadError> {
    let df = read_tsv(path)?;

    let mut keys = vec![queryid];
    if queryid != columns::QUERYID {
        keys.push(columns::QUERYID);
    }
    for key in &keys {
        if !has_column(&df, key) {
            return Err(LoadError::MissingColumn(key.to_string()));
        }
    }
    let mut df = df.sort(
        keys.clone(),
        SortMultipleOptions::default()
            .with_order_descending_multi(vec![false; keys.len()])
            .with_maintain_order(true),
    )?;

    for name in CATEGORICAL_COLUMNS {
        if !has_column(&df, name) {
            return Err(LoadError::MissingColumn(name.to_string()));
        }
        encode_categories(&mut df, name)?;
    }
    Ok(df)
}

/// Replace a column by 1-based codes of its distinct values in lexicographic
/// order. Nulls get code 0.
pub fn encode_categories(df: &mut DataFrame, name: &str) -> PolarsResult<()> {
    let text = df.column(name)?.cast(&DataType::String)?;
    let values = text.str()?;

    let mut distinct: Vec<&str> = values.into_iter().flatten().collect();
    distinct.sort_unstable();
    distinct.dedup();

    let codes: Vec<i64> = values
        .into_iter()
        .map(|v| {
            v.and_then(|s| distinct.binary_search(&s).ok())
                .map_or(0, |i| i as i64 + 1)
        })
        .collect();

    df.with_column(Column::new(name.into(), codes))?;
    Ok(())
}

/// Derive `target` and `binary_label` from the `target_{forecast_job}`
/// horizon. A forward return of zero or more is a positive label.
pub fn upgrade_targets(df: DataFrame, forecast_job: &str) -> Result<DataFrame, LoadError> {
    if df.is_empty() {
        return Ok(df);
    }

    let has_targets = df
        .get_column_names()
        .iter()
        .any(|c| c.to_lowercase().starts_with(columns::TARGET));
    if !has_targets {
        return Err(LoadError::NoTargets);
    }

    let source = format!("{}_{forecast_job}", columns::TARGET);
    if !has_column(&df, &source) {
        return Err(LoadError::MissingColumn(source));
    }

    let target = df.column(&source)?.cast(&DataType::Float64)?;
    let binary: Vec<i32> = target
        .f64()?
        .into_iter()
        .map(|v| v.map_or(0, |x| i32::from(x >= 0.0)))
        .collect();

    let mut df = df;
    df.with_column(target.with_name(columns::TARGET.into()))?;
    df.with_column(Column::new(columns::BINARY_LABEL.into(), binary))?;
    Ok(df)
}
