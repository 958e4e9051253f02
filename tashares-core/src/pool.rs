//! Scoring pools: feature matrix, label vector and group-id vector.

use polars::prelude::*;
use thiserror::Error;

use crate::dataset::{columns, has_column};

/// Identifying and label columns that never reach a model.
pub const IDENTITY_COLUMNS: [&str; 7] = [
    columns::SYMBOL,
    columns::DATE,
    columns::QUERYID,
    columns::SECTOR,
    columns::INDUSTRY,
    columns::SHORTNAME,
    columns::TAG,
];

/// Errors from pool construction.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("required column '{0}' is missing from the forecasting table")]
    MissingColumn(String),

    #[error("no feature columns left after dropping identity and label columns")]
    NoFeatures,

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// The unit a ranking model scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    /// Feature names, in matrix column order.
    pub feature_names: Vec<String>,
    /// Row-major feature values. Nulls and non-numeric cells are NaN.
    pub features: Vec<Vec<f64>>,
    /// Relevance label per row (`tag`).
    pub labels: Vec<f64>,
    /// Ranking group per row (`queryid`).
    pub group_ids: Vec<String>,
}

impl Pool {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }
}

/// True for target and label columns (`target*`, `*_label`), case-insensitive.
pub fn is_label_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with(columns::TARGET) || lower.ends_with("_label")
}

/// Names of the columns that feed the model, in table order.
pub fn feature_columns(df: &DataFrame, extra_drop: &[String]) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|c| c.as_str())
        .filter(|name| !IDENTITY_COLUMNS.contains(name))
        .filter(|name| !is_label_column(name))
        .filter(|name| !extra_drop.iter().any(|d| d == name))
        .map(str::to_string)
        .collect()
}

/// Build a pool from a forecasting table.
///
/// `tag` and `queryid` are part of the feature-set contract: their absence is
/// an error, never silently defaulted.
pub fn build_pool(df: &DataFrame, extra_drop: &[String]) -> Result<Pool, PoolError> {
    for required in [columns::TAG, columns::QUERYID] {
        if !has_column(df, required) {
            return Err(PoolError::MissingColumn(required.to_string()));
        }
    }

    let feature_names = feature_columns(df, extra_drop);
    if feature_names.is_empty() {
        return Err(PoolError::NoFeatures);
    }

    let height = df.height();
    let mut features = vec![Vec::with_capacity(feature_names.len()); height];
    for name in &feature_names {
        let values = float_values(df, name)?;
        for (row, value) in features.iter_mut().zip(values) {
            row.push(value);
        }
    }

    Ok(Pool {
        feature_names,
        features,
        labels: float_values(df, columns::TAG)?,
        group_ids: string_values(df, columns::QUERYID)?,
    })
}

/// A column as `f64`, with nulls mapped to NaN.
pub fn float_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// A column rendered as strings, with nulls mapped to the empty string.
pub fn string_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<String>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecasting_table() -> DataFrame {
        df!(
            "date" => &["2021-06-01", "2021-06-01"],
            "symbol" => &["000001.SZ", "600000.SS"],
            "queryid" => &[1i64, 1],
            "sector" => &["Financial", "Financial"],
            "industry" => &["Banks", "Banks"],
            "shortname" => &["PAB", "SPDB"],
            "tag" => &[2i64, 0],
            "target_1" => &[0.01, -0.02],
            "target_5" => &[0.03, -0.01],
            "binary_label" => &[1i64, 0],
            "rsi_14" => &[55.0, 40.0],
            "adj close" => &[12.3, 9.8],
            "obv" => &[Some(1.0), None],
        )
        .unwrap()
    }

    #[test]
    fn drops_identity_and_label_columns() {
        let pool = build_pool(&forecasting_table(), &[]).unwrap();
        assert_eq!(pool.feature_names, vec!["rsi_14", "adj close", "obv"]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.labels, vec![2.0, 0.0]);
        assert_eq!(pool.group_ids, vec!["1", "1"]);
    }

    #[test]
    fn extra_drop_columns_are_honoured() {
        let pool = build_pool(&forecasting_table(), &["adj close".to_string()]).unwrap();
        assert_eq!(pool.feature_names, vec!["rsi_14", "obv"]);
        assert_eq!(pool.features[0], vec![55.0, 1.0]);
    }

    #[test]
    fn nulls_become_nan() {
        let pool = build_pool(&forecasting_table(), &[]).unwrap();
        assert!(pool.features[1][2].is_nan());
    }

    #[test]
    fn missing_tag_is_fatal() {
        let df = forecasting_table().drop("tag").unwrap();
        let err = build_pool(&df, &[]).unwrap_err();
        assert!(matches!(err, PoolError::MissingColumn(ref c) if c == "tag"));
    }

    #[test]
    fn missing_queryid_is_fatal() {
        let df = forecasting_table().drop("queryid").unwrap();
        let err = build_pool(&df, &[]).unwrap_err();
        assert!(matches!(err, PoolError::MissingColumn(ref c) if c == "queryid"));
    }

    #[test]
    fn label_column_detection_is_case_insensitive() {
        assert!(is_label_column("Target_2"));
        assert!(is_label_column("binary_label"));
        assert!(!is_label_column("label_smooth"));
        assert!(!is_label_column("rsi_14"));
    }
}
