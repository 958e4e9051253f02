//! Dataset names and table helpers.
//!
//! A job unit reports fragments keyed by an open-ended dataset name. The three
//! names the pipeline itself relies on are `training`, `test` and
//! `forecasting`, but any other name a job emits is carried through untouched.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// One job unit's output for one dataset name.
pub type Fragment = DataFrame;

/// Merged tables (or fragment lists) keyed by dataset name.
pub type DatasetMap<T> = BTreeMap<DatasetName, T>;

/// Name of a logical table. Open-ended: discovered from job results at runtime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetName(String);

impl DatasetName {
    pub const TRAINING: &'static str = "training";
    pub const TEST: &'static str = "test";
    pub const FORECASTING: &'static str = "forecasting";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn training() -> Self {
        Self::new(Self::TRAINING)
    }

    pub fn test() -> Self {
        Self::new(Self::TEST)
    }

    pub fn forecasting() -> Self {
        Self::new(Self::FORECASTING)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatasetName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl Borrow<str> for DatasetName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Column names shared by every component downstream of the job units.
pub mod columns {
    pub const DATE: &str = "date";
    pub const SYMBOL: &str = "symbol";
    pub const QUERYID: &str = "queryid";
    pub const SECTOR: &str = "sector";
    pub const INDUSTRY: &str = "industry";
    pub const SHORTNAME: &str = "shortname";
    pub const TAG: &str = "tag";
    pub const TARGET: &str = "target";
    pub const BINARY_LABEL: &str = "binary_label";
    pub const SCORE: &str = "score";
    pub const RANK: &str = "rank";
}

/// True if the frame carries a column with this exact name.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Serialize a table as tab-separated text with a header row.
///
/// `precision` fixes the number of decimals for float columns; `None` keeps
/// polars' shortest round-trip formatting.
pub fn to_tsv(df: &DataFrame, precision: Option<usize>) -> PolarsResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut df = df.clone();
    CsvWriter::new(&mut buf)
        .include_header(true)
        .with_separator(b'\t')
        .with_float_precision(precision)
        .finish(&mut df)?;
    Ok(buf)
}

/// Deterministic BLAKE3 fingerprint over a table's TSV serialization.
///
/// Two tables with the same columns, dtypes and row order hash identically,
/// which is what merge idempotence is checked against.
pub fn fingerprint(df: &DataFrame) -> PolarsResult<String> {
    let bytes = to_tsv(df, None)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_name_borrows_as_str() {
        let mut map: DatasetMap<usize> = BTreeMap::new();
        map.insert(DatasetName::forecasting(), 3);
        assert_eq!(map.get("forecasting"), Some(&3));
        assert_eq!(map.get("training"), None);
    }

    #[test]
    fn dataset_name_serializes_as_plain_string() {
        let json = serde_json::to_string(&DatasetName::test()).unwrap();
        assert_eq!(json, "\"test\"");
    }

    #[test]
    fn fingerprint_depends_on_row_order() {
        let a = df!("date" => &["2021-01-04", "2021-01-05"], "x" => &[1.0, 2.0]).unwrap();
        let b = df!("date" => &["2021-01-05", "2021-01-04"], "x" => &[2.0, 1.0]).unwrap();
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&a.clone()).unwrap());
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn tsv_uses_fixed_precision() {
        let df = df!("score" => &[0.123456789]).unwrap();
        let text = String::from_utf8(to_tsv(&df, Some(5)).unwrap()).unwrap();
        assert_eq!(text, "score\n0.12346\n");
    }
}
