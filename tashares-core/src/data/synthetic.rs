//! Deterministic synthetic job unit.
//!
//! Produces a random-walk price history per symbol (seeded from the symbol
//! name, so reruns are identical), derives a handful of momentum features and
//! forward-return targets, and splits the rows into `training`, `test` and
//! `forecasting` fragments around `max_training_date`. Used for dry runs and
//! tests when no real feature pipeline is available; fragments it produces
//! are clearly not market data.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::fragment_dir::write_fragment;
use crate::dataset::{columns, DatasetName};
use crate::job::{JobError, JobOutput, JobParams, JobUnit};

const SECTORS: [(&str, &str); 4] = [
    ("Financial Services", "Banks - Regional"),
    ("Technology", "Semiconductors"),
    ("Consumer Defensive", "Beverages - Wineries & Distilleries"),
    ("Industrials", "Specialty Industrial Machinery"),
];

/// Look-back windows (in rows) of the `roc_{w}` momentum features.
const ROC_WINDOWS: [usize; 5] = [1, 2, 5, 10, 20];

/// Forward-return horizons of the `target_{h}` columns.
const TARGET_HORIZONS: [usize; 3] = [1, 2, 5];

/// Generates synthetic per-symbol fragments.
#[derive(Debug, Clone)]
pub struct SyntheticJob {
    history_days: usize,
}

impl SyntheticJob {
    /// `history_days` business days of history starting at `start_from_date`.
    pub fn new(history_days: usize) -> Self {
        Self { history_days }
    }
}

impl Default for SyntheticJob {
    fn default() -> Self {
        Self::new(260)
    }
}

impl JobUnit for SyntheticJob {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn run(&self, symbol: &str, params: &JobParams) -> Result<JobOutput, JobError> {
        if self.history_days == 0 {
            return Err(JobError::NoHistory {
                symbol: symbol.to_string(),
            });
        }

        let history = generate_history(symbol, params.start_from_date, self.history_days)?;
        let n = history.height();
        let cutoff = params.max_training_date.to_string();
        let n_train = history
            .column(columns::DATE)?
            .str()?
            .into_iter()
            .take(n - 1)
            .filter(|d| d.is_some_and(|d| d <= cutoff.as_str()))
            .count();

        let mut output = JobOutput::new();
        if !params.forecast_only {
            output.insert(DatasetName::training(), history.slice(0, n_train));
            output.insert(
                DatasetName::test(),
                history.slice(n_train as i64, n - 1 - n_train),
            );
        }
        output.insert(DatasetName::forecasting(), history.slice((n - 1) as i64, 1));

        if params.dump_files {
            for (name, fragment) in &output {
                write_fragment(&params.data_dir, name, symbol, fragment)?;
            }
        }
        Ok(output)
    }
}

/// Consecutive weekdays starting at (or after) `start`.
fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut current = start;
    while days.len() < count {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(current);
        }
        current += Duration::days(1);
    }
    days
}

fn generate_history(symbol: &str, start: NaiveDate, days: usize) -> PolarsResult<DataFrame> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let dates: Vec<String> = business_days(start, days)
        .iter()
        .map(|d| d.to_string())
        .collect();

    let mut close = Vec::with_capacity(days);
    let mut price = rng.gen_range(5.0..200.0_f64);
    for _ in 0..days {
        price *= 1.0 + rng.gen_range(-0.03..0.03);
        close.push(price);
    }

    let (sector, industry) = SECTORS[usize::from(seed[0]) % SECTORS.len()];
    let shortname = format!("{} Holdings", symbol.split('.').next().unwrap_or(symbol));

    let forward = |h: usize| -> Vec<Option<f64>> {
        (0..days)
            .map(|i| close.get(i + h).map(|future| future / close[i] - 1.0))
            .collect()
    };
    let tag: Vec<i64> = forward(1)
        .iter()
        .map(|r| r.map_or(0, |r| ((r + 0.03) / 0.015).floor().clamp(0.0, 3.0) as i64))
        .collect();

    let mut cols = vec![
        Column::new(columns::DATE.into(), &dates),
        Column::new(columns::SYMBOL.into(), vec![symbol; days]),
        Column::new(columns::QUERYID.into(), &dates),
        Column::new(columns::SECTOR.into(), vec![sector; days]),
        Column::new(columns::INDUSTRY.into(), vec![industry; days]),
        Column::new(columns::SHORTNAME.into(), vec![shortname.as_str(); days]),
        Column::new(columns::TAG.into(), tag),
    ];
    for h in TARGET_HORIZONS {
        cols.push(Column::new(format!("target_{h}").into(), forward(h)));
    }
    for w in ROC_WINDOWS {
        let roc: Vec<Option<f64>> = (0..days)
            .map(|i| i.checked_sub(w).map(|past| close[i] / close[past] - 1.0))
            .collect();
        cols.push(Column::new(format!("roc_{w}").into(), roc));
    }
    cols.push(Column::new("close".into(), close));

    DataFrame::new(cols)
}
