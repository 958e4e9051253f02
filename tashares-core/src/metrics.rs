//! Grouped Precision-at-k.
//!
//! Within each group records are ordered by prediction (highest first, ties
//! keep input order), the top `min(k, group size)` are taken, and the share of
//! positively labelled records among them is that group's precision. The
//! metric value is the unweighted mean over groups.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::{float_values, string_values};

/// The cut-offs reported by [`compute_metrics`], ascending.
pub const PRECISION_TOPS: [usize; 4] = [5, 10, 20, 50];

/// Labels above this value count as positive.
const POSITIVE_BORDER: f64 = 0.5;

/// Errors from metric evaluation.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("unrecognized metric '{0}'")]
    UnknownMetric(String),

    #[error("length mismatch: {labels} labels, {predictions} predictions, {groups} group ids")]
    LengthMismatch {
        labels: usize,
        predictions: usize,
        groups: usize,
    },

    #[error("cannot evaluate an empty prediction set")]
    Empty,

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// A ranking metric, parsed from its name string (e.g. `PrecisionAt:top=5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// `top = None` means the whole group.
    PrecisionAt { top: Option<usize> },
}

impl FromStr for Metric {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || MetricError::UnknownMetric(s.to_string());
        let (name, params) = match s.split_once(':') {
            Some((name, params)) => (name, Some(params)),
            None => (s, None),
        };
        if name != "PrecisionAt" {
            return Err(unknown());
        }

        let mut top = None;
        for param in params.into_iter().flat_map(|p| p.split(';')) {
            match param.split_once('=') {
                Some(("top", value)) => {
                    let k: usize = value.trim().parse().map_err(|_| unknown())?;
                    if k == 0 {
                        return Err(unknown());
                    }
                    top = Some(k);
                }
                _ => return Err(unknown()),
            }
        }
        Ok(Metric::PrecisionAt { top })
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::PrecisionAt { top: Some(k) } => write!(f, "PrecisionAt:top={k}"),
            Metric::PrecisionAt { top: None } => f.write_str("PrecisionAt"),
        }
    }
}

impl Metric {
    /// Evaluate over grouped predictions.
    ///
    /// Within a group, rows are taken by descending prediction; ties keep
    /// input order and NaN predictions rank last.
    pub fn evaluate(
        &self,
        labels: &[f64],
        predictions: &[f64],
        group_ids: &[String],
    ) -> Result<f64, MetricError> {
        if labels.len() != predictions.len() || labels.len() != group_ids.len() {
            return Err(MetricError::LengthMismatch {
                labels: labels.len(),
                predictions: predictions.len(),
                groups: group_ids.len(),
            });
        }
        if labels.is_empty() {
            return Err(MetricError::Empty);
        }

        let Metric::PrecisionAt { top } = *self;

        // Groups in order of first appearance
        let mut order: Vec<&str> = Vec::new();
        let mut members: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, gid) in group_ids.iter().enumerate() {
            members
                .entry(gid.as_str())
                .or_insert_with(|| {
                    order.push(gid.as_str());
                    Vec::new()
                })
                .push(i);
        }

        let total: f64 = order
            .iter()
            .map(|gid| {
                let mut idx = members[gid].clone();
                idx.sort_by(|&a, &b| descending_nan_last(predictions[a], predictions[b]));
                let k = top.map_or(idx.len(), |k| k.min(idx.len()));
                let hits = idx[..k]
                    .iter()
                    .filter(|&&i| labels[i] > POSITIVE_BORDER)
                    .count();
                hits as f64 / k as f64
            })
            .sum();

        Ok(total / order.len() as f64)
    }
}

/// Evaluate a metric given by name. Unknown names are errors.
pub fn eval_metric(
    labels: &[f64],
    predictions: &[f64],
    metric_name: &str,
    group_ids: &[String],
) -> Result<f64, MetricError> {
    metric_name
        .parse::<Metric>()?
        .evaluate(labels, predictions, group_ids)
}

/// Precision at k = 5, 10, 20, 50.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionReport {
    pub values: [f64; 4],
}

impl PrecisionReport {
    /// `(k, precision)` pairs in ascending k order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        PRECISION_TOPS.iter().copied().zip(self.values.iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// Compare predictions against the `binary_label` column, grouped by `queryid`
/// (conventionally `date`).
pub fn compute_metrics(
    labels: &DataFrame,
    predictions: &[f64],
    queryid: &str,
) -> Result<PrecisionReport, MetricError> {
    let binary = float_values(labels, crate::dataset::columns::BINARY_LABEL)?;
    let groups = string_values(labels, queryid)?;

    let mut values = [0.0; 4];
    for (slot, k) in values.iter_mut().zip(PRECISION_TOPS) {
        *slot = eval_metric(
            &binary,
            predictions,
            &format!("PrecisionAt:top={k}"),
            &groups,
        )?;
    }
    Ok(PrecisionReport { values })
}

fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
