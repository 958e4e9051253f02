//! Fragment aggregation.
//!
//! Per dataset name, the non-empty fragments from the fan-out are
//! concatenated diagonally (a column absent from a fragment becomes null) and
//! put into canonical row order: `date`, then `queryid`, then `symbol` when
//! the table has one. Column order is fixed by where each column first
//! appears across fragments, so the result does not depend on which job
//! finished first.

use std::collections::BTreeMap;

use polars::prelude::*;
use thiserror::Error;
use tracing::debug;

use tashares_core::dataset::{columns, fingerprint, has_column};
use tashares_core::{DatasetMap, DatasetName, Fragment};

/// Errors from aggregation.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("dataset '{dataset}' has no '{column}' column")]
    MissingColumn { dataset: String, column: String },

    #[error("failed to merge dataset '{dataset}': {source}")]
    Polars {
        dataset: String,
        #[source]
        source: PolarsError,
    },
}

/// Merge every dataset's fragments into one table.
///
/// Every name in the input appears in the output; a name without non-empty
/// fragments maps to an empty table.
pub fn aggregate_datasets(
    fragments: DatasetMap<Vec<Fragment>>,
) -> Result<DatasetMap<DataFrame>, AggregateError> {
    let mut tables = DatasetMap::new();
    for (name, parts) in fragments {
        let table = merge_fragments(&name, &parts)?;
        if tracing::enabled!(tracing::Level::DEBUG) && !table.is_empty() {
            let digest = fingerprint(&table).map_err(|source| AggregateError::Polars {
                dataset: name.to_string(),
                source,
            })?;
            debug!(
                "{name}: {} fragments -> {} rows, blake3 {}",
                parts.len(),
                table.height(),
                &digest[..16]
            );
        }
        tables.insert(name, table);
    }
    Ok(tables)
}

/// Concatenate and canonically order one dataset's fragments.
pub fn merge_fragments(
    dataset: &DatasetName,
    fragments: &[Fragment],
) -> Result<DataFrame, AggregateError> {
    let parts: Vec<&DataFrame> = fragments.iter().filter(|f| !f.is_empty()).collect();
    if parts.is_empty() {
        return Ok(DataFrame::empty());
    }

    for column in [columns::DATE, columns::QUERYID] {
        if !parts.iter().any(|f| has_column(f, column)) {
            return Err(AggregateError::MissingColumn {
                dataset: dataset.to_string(),
                column: column.to_string(),
            });
        }
    }

    let mut keys = vec![columns::DATE, columns::QUERYID];
    if parts.iter().any(|f| has_column(f, columns::SYMBOL)) {
        keys.push(columns::SYMBOL);
    }
    let order = canonical_column_order(&parts);

    // Each fragment infers its own types; a column with no values in one
    // fragment must not pin the merged type.
    let frames: Vec<LazyFrame> = parts.iter().map(|f| untype_null_columns(f).lazy()).collect();
    let args = UnionArgs {
        to_supertypes: true,
        ..Default::default()
    };
    concat_lf_diagonal(frames, args)
        .and_then(|lf| {
            lf.select(order.iter().map(|c| col(c.as_str())).collect::<Vec<_>>())
                .sort(
                    keys.clone(),
                    SortMultipleOptions::default()
                        .with_order_descending_multi(vec![false; keys.len()])
                        .with_maintain_order(true),
                )
                .collect()
        })
        .map_err(|source| AggregateError::Polars {
            dataset: dataset.to_string(),
            source,
        })
}

/// Retype all-null columns as `Null` so they take the type of the fragments
/// that do carry values.
fn untype_null_columns(frame: &DataFrame) -> DataFrame {
    let height = frame.height();
    if height == 0 {
        return frame.clone();
    }
    let retyped: Vec<Column> = frame
        .get_columns()
        .iter()
        .map(|c| {
            if c.null_count() == height && c.dtype() != &DataType::Null {
                Column::full_null(c.name().clone(), height, &DataType::Null)
            } else {
                c.clone()
            }
        })
        .collect();
    DataFrame::new(retyped).unwrap_or_else(|_| frame.clone())
}

/// Union of column names, ordered by earliest position in any fragment and
/// then by name.
fn canonical_column_order(parts: &[&DataFrame]) -> Vec<String> {
    let mut first_seen: BTreeMap<String, usize> = BTreeMap::new();
    for part in parts {
        for (pos, name) in part.get_column_names().iter().enumerate() {
            first_seen
                .entry(name.to_string())
                .and_modify(|p| *p = (*p).min(pos))
                .or_insert(pos);
        }
    }
    let mut order: Vec<(usize, String)> = first_seen.into_iter().map(|(n, p)| (p, n)).collect();
    order.sort();
    order.into_iter().map(|(_, name)| name).collect()
}
