//! Property tests for metric and pool invariants.
//!
//! Uses proptest to verify:
//! 1. Precision bounds: every precision-at-k lies in [0, 1]
//! 2. Perfect labels: all-positive groups score exactly 1
//! 3. Ranking only: rescaling predictions never changes precision
//! 4. Pool contract: no identity, target or label column reaches a model

use polars::prelude::*;
use proptest::prelude::*;
use tashares_core::metrics::PRECISION_TOPS;
use tashares_core::pool::IDENTITY_COLUMNS;
use tashares_core::{build_pool, eval_metric};

// ── Strategies (proptest) ────────────────────────────────────────────

/// (label, prediction, group) triples over a handful of groups.
fn arb_scored_rows() -> impl Strategy<Value = Vec<(f64, f64, u8)>> {
    prop::collection::vec(
        (prop::bool::ANY.prop_map(f64::from), -5.0..5.0_f64, 0u8..4),
        1..80,
    )
}

fn split(rows: &[(f64, f64, u8)]) -> (Vec<f64>, Vec<f64>, Vec<String>) {
    (
        rows.iter().map(|r| r.0).collect(),
        rows.iter().map(|r| r.1).collect(),
        rows.iter().map(|r| format!("2021-06-0{}", r.2 + 1)).collect(),
    )
}

// ── 1. Precision bounds ──────────────────────────────────────────────

proptest! {
    #[test]
    fn precision_is_a_fraction(rows in arb_scored_rows()) {
        let (labels, preds, groups) = split(&rows);
        for k in PRECISION_TOPS {
            let p = eval_metric(&labels, &preds, &format!("PrecisionAt:top={k}"), &groups).unwrap();
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}

// ── 2. Perfect labels ────────────────────────────────────────────────

proptest! {
    #[test]
    fn all_positive_labels_score_one(rows in arb_scored_rows()) {
        let (_, preds, groups) = split(&rows);
        let labels = vec![1.0; preds.len()];
        let p = eval_metric(&labels, &preds, "PrecisionAt:top=5", &groups).unwrap();
        prop_assert_eq!(p, 1.0);
    }
}

// ── 3. Ranking only ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn monotone_rescaling_keeps_precision(rows in arb_scored_rows(), scale in 0.1..10.0_f64, shift in -3.0..3.0_f64) {
        let (labels, preds, groups) = split(&rows);
        let rescaled: Vec<f64> = preds.iter().map(|p| p * scale + shift).collect();
        // Rescaling may merge near-ties; skip those draws.
        let order = |v: &[f64]| {
            let mut idx: Vec<usize> = (0..v.len()).collect();
            idx.sort_by(|&a, &b| v[b].partial_cmp(&v[a]).unwrap());
            idx
        };
        prop_assume!(order(&preds) == order(&rescaled));

        let a = eval_metric(&labels, &preds, "PrecisionAt:top=10", &groups).unwrap();
        let b = eval_metric(&labels, &rescaled, "PrecisionAt:top=10", &groups).unwrap();
        prop_assert!((a - b).abs() < 1e-12);
    }
}

// ── 4. Pool contract ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn pool_never_sees_identity_or_labels(
        extra in prop::collection::vec("[a-z]{1,6}_[0-9]{1,2}", 1..6),
        rows in 1usize..10,
    ) {
        let mut df = df!(
            "date" => vec!["2021-06-01"; rows],
            "symbol" => vec!["000001.SZ"; rows],
            "queryid" => vec![1i64; rows],
            "sector" => vec!["Financial"; rows],
            "industry" => vec!["Banks"; rows],
            "shortname" => vec!["PAB"; rows],
            "tag" => vec![1i64; rows],
            "Target_1" => vec![0.01; rows],
            "binary_label" => vec![1i32; rows],
        )
        .unwrap();
        let mut expected = Vec::new();
        for name in &extra {
            if name.starts_with("target") || df.get_column_names().iter().any(|c| c.as_str() == name.as_str()) {
                continue;
            }
            df.with_column(Column::new(name.as_str().into(), vec![0.5; rows])).unwrap();
            expected.push(name.clone());
        }

        let pool = build_pool(&df, &[]).unwrap();
        prop_assert_eq!(&pool.feature_names, &expected);
        prop_assert_eq!(pool.len(), rows);
        for name in &pool.feature_names {
            prop_assert!(!IDENTITY_COLUMNS.contains(&name.as_str()));
            prop_assert!(!name.to_lowercase().starts_with("target"));
            prop_assert!(!name.ends_with("_label"));
        }
    }
}
