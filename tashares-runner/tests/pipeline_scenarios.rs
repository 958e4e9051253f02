//! End-to-end scenarios: fan-out, aggregation, ensemble ranking, evaluation.
//!
//! Job units are either small closures over fixed fragments or the
//! deterministic synthetic generator; models are either constant test models
//! or real CatBoost JSON files written to a temp directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use polars::prelude::*;
use tashares_core::data::{FragmentDirJob, SyntheticJob};
use tashares_core::{
    DatasetName, JobError, JobOutput, JobParams, JobUnit, ModelError, ModelFormat, ModelLoader,
    Pool, RankingModel,
};
use tashares_runner::{
    aggregate_datasets, EnsembleOutcome, JobScheduler, RankingEnsemble, Tashares, TasharesConfig,
};

// ── Helpers ──────────────────────────────────────────────────────────

/// Returns a fixed set of fragments per symbol.
struct FixedJob(fn(&str) -> JobOutput);

impl JobUnit for FixedJob {
    fn name(&self) -> &str {
        "fixed"
    }

    fn run(&self, symbol: &str, _params: &JobParams) -> Result<JobOutput, JobError> {
        Ok((self.0)(symbol))
    }
}

fn fragment(symbol: &str, dates: &[&str]) -> DataFrame {
    df!(
        "date" => dates,
        "queryid" => dates,
        "symbol" => vec![symbol; dates.len()],
        "rsi_14" => vec![50.0; dates.len()],
    )
    .unwrap()
}

fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

struct ConstantModel(f64);

impl RankingModel for ConstantModel {
    fn predict(&self, pool: &Pool) -> Result<Vec<f64>, ModelError> {
        Ok(vec![self.0; pool.len()])
    }
}

/// `const_0.9.json` scores every row 0.9.
struct ConstantLoader;

impl ModelLoader for ConstantLoader {
    fn load(&self, path: &Path, _: ModelFormat) -> Result<Box<dyn RankingModel>, ModelError> {
        let stem = path.file_stem().unwrap().to_string_lossy().to_string();
        let value = stem.trim_start_matches("const_").parse().unwrap();
        Ok(Box::new(ConstantModel(value)))
    }
}

/// Depth-1 CatBoost JSON model: `low` when feature 0 <= 0, `high` otherwise.
fn write_stump(dir: &Path, name: &str, low: f64, high: f64) {
    let json = format!(
        r#"{{
  "features_info": {{"float_features": [{{"feature_index": 0, "flat_feature_index": 0}}]}},
  "oblivious_trees": [
    {{"leaf_values": [{low}, {high}],
      "splits": [{{"split_type": "FloatFeature", "float_feature_index": 0, "border": 0.0}}]}}
  ],
  "scale_and_bias": [1.0, [0.0]]
}}"#
    );
    std::fs::write(dir.join(name), json).unwrap();
}

fn task_config(dir: &Path, models: &[&str]) -> TasharesConfig {
    let mut config = TasharesConfig::default();
    let task = config.tasks.get_mut("ashares").unwrap();
    task.data_dir = dir.to_path_buf();
    task.model_list = models.iter().map(|m| m.to_string()).collect();
    config.defaults.workers = 2;
    config.defaults.start_from_date = NaiveDate::from_ymd_opt(2019, 10, 1).unwrap();
    config
}

// ── Fan-out and aggregation ─────────────────────────────────────────

#[test]
fn scenario_a_training_only_from_second_symbol() {
    let job = FixedJob(|symbol| {
        let mut out = JobOutput::new();
        out.insert(DatasetName::forecasting(), fragment(symbol, &["2021-06-02"]));
        if symbol == "600000.SS" {
            out.insert(
                DatasetName::training(),
                fragment(symbol, &["2021-05-31", "2021-06-01"]),
            );
        }
        out
    });
    let report = JobScheduler::new()
        .with_workers(2)
        .run(
            Arc::new(job),
            &symbols(&["000001.SZ", "600000.SS"]),
            Arc::new(JobParams::default()),
            None,
        )
        .unwrap();
    let tables = aggregate_datasets(report.fragments).unwrap();

    let training = &tables["training"];
    assert_eq!(training.height(), 2);
    let owners: Vec<&str> = training.column("symbol").unwrap().str().unwrap().into_no_null_iter().collect();
    assert_eq!(owners, vec!["600000.SS", "600000.SS"]);

    let forecasting = &tables["forecasting"];
    let owners: Vec<&str> = forecasting.column("symbol").unwrap().str().unwrap().into_no_null_iter().collect();
    assert_eq!(owners, vec!["000001.SZ", "600000.SS"]);
}

#[test]
fn scenario_d_empty_symbol_list() {
    let job = FixedJob(|_| JobOutput::new());
    let report = JobScheduler::new()
        .run(Arc::new(job), &[], Arc::new(JobParams::default()), None)
        .unwrap();
    assert!(report.fragments.is_empty());
    assert!(aggregate_datasets(report.fragments).unwrap().is_empty());
}

#[test]
fn single_worker_runs_everything() {
    let job = FixedJob(|symbol| {
        let mut out = JobOutput::new();
        out.insert(DatasetName::test(), fragment(symbol, &["2021-06-01"]));
        out
    });
    let names: Vec<String> = (0..20).map(|i| format!("{i:06}.SZ")).collect();
    let report = JobScheduler::new()
        .with_workers(1)
        .run(Arc::new(job), &names, Arc::new(JobParams::default()), None)
        .unwrap();
    let tables = aggregate_datasets(report.fragments).unwrap();
    assert_eq!(tables["test"].height(), 20);
}

#[test]
fn fragment_files_with_an_empty_feature_merge() {
    let dir = tempfile::tempdir().unwrap();
    let forecasting = dir.path().join("forecasting");
    std::fs::create_dir_all(&forecasting).unwrap();
    std::fs::write(
        forecasting.join("000001.SZ.tsv"),
        "date\tqueryid\tsymbol\tobv\n2021-06-01\t1\t000001.SZ\t1.5\n",
    )
    .unwrap();
    std::fs::write(
        forecasting.join("688981.SS.tsv"),
        "date\tqueryid\tsymbol\tobv\n2021-06-01\t1\t688981.SS\t\n",
    )
    .unwrap();

    let params = JobParams {
        data_dir: dir.path().to_path_buf(),
        forecast_only: true,
        ..JobParams::default()
    };
    let report = JobScheduler::new()
        .with_workers(2)
        .run(
            Arc::new(FragmentDirJob::new()),
            &symbols(&["000001.SZ", "688981.SS"]),
            Arc::new(params),
            None,
        )
        .unwrap();
    let tables = aggregate_datasets(report.fragments).unwrap();

    let obv = tables["forecasting"].column("obv").unwrap();
    let values: Vec<Option<f64>> = obv.f64().unwrap().into_iter().collect();
    assert_eq!(values, vec![Some(1.5), None]);
}

// ── Ensemble ────────────────────────────────────────────────────────

#[test]
fn scenario_c_constant_models_average() {
    let table = df!(
        "date" => &["2021-06-01", "2021-06-01"],
        "symbol" => &["A", "B"],
        "queryid" => &[1i64, 1],
        "sector" => &["Tech", "Energy"],
        "shortname" => &["Alpha", "Beta"],
        "tag" => &[0i64, 1],
        "roc_1" => &[0.1, -0.1],
    )
    .unwrap();
    let ranked = RankingEnsemble::new(
        vec![
            PathBuf::from("const_0.1.json"),
            PathBuf::from("const_0.5.json"),
            PathBuf::from("const_0.9.json"),
        ],
        ModelFormat::CatboostJson,
    )
    .with_loader(Arc::new(ConstantLoader))
    .rank(&table)
    .unwrap();

    let score = ranked.column("score").unwrap().f64().unwrap();
    assert!(score.into_no_null_iter().all(|s| (s - 0.5).abs() < 1e-9));
    // Equal scores keep input order.
    let order: Vec<&str> = ranked.column("symbol").unwrap().str().unwrap().into_no_null_iter().collect();
    assert_eq!(order, vec!["A", "B"]);
}

// ── Pipeline ────────────────────────────────────────────────────────

#[test]
fn forecast_ranks_synthetic_symbols_with_json_models() {
    let dir = tempfile::tempdir().unwrap();
    write_stump(dir.path(), "ashares_1.json", -1.0, 1.0);
    write_stump(dir.path(), "ashares_2.json", 0.0, 2.0);
    std::fs::write(
        dir.path().join("list_of_interest"),
        "000001.SZ\n600000.SS\n\n000858.SZ\n",
    )
    .unwrap();
    let results = dir.path().join("forecast_ashares.csv");
    let dump = dir.path().join("forecasting_dump.csv");

    let config = task_config(dir.path(), &["ashares_1.json", "ashares_2.json"]);
    let mut pipeline = Tashares::new("ashares", &config)
        .unwrap()
        .with_job(Arc::new(SyntheticJob::new(60)))
        .with_results_path(&results)
        .with_forecast_dump(&dump);

    let EnsembleOutcome::Ranked(ranked) = pipeline.forecast().unwrap() else {
        panic!("expected a ranked table");
    };
    assert_eq!(ranked.height(), 3);

    // roc_1 > 0 scores (1 + 2) / 2, otherwise (-1 + 0) / 2
    let score: Vec<f64> = ranked.column("score").unwrap().f64().unwrap().into_no_null_iter().collect();
    assert!(score.iter().all(|s| *s == 1.5 || *s == -0.5));
    assert!(score.windows(2).all(|w| w[0] >= w[1]));

    let text = std::fs::read_to_string(&results).unwrap();
    assert_eq!(
        text.lines().next().unwrap(),
        "rank\tsymbol\tdate\tashares_1\tashares_2\tscore\tshortname\tsector"
    );
    assert_eq!(text.lines().count(), 4);

    assert_eq!(pipeline.dump_forecast_data().unwrap(), Some(dump.clone()));
    assert!(dump.exists());
}

#[test]
fn ground_truth_switches_to_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    write_stump(dir.path(), "ashares_1.json", 0.0, 1.0);
    std::fs::write(dir.path().join("list_of_ashares"), "000001.SZ\n600000.SS\n").unwrap();
    let config = task_config(dir.path(), &["ashares_1.json", "missing_model.json"]);

    // Build the dataset dumps, then validate against the test split.
    let builder = Tashares::new("ashares", &config)
        .unwrap()
        .with_symbol_list(dir.path().join("list_of_ashares"))
        .with_job(Arc::new(SyntheticJob::new(120)));
    builder.dump_datafiles(None).unwrap();
    let ground_truth = dir.path().join("test_ashares.csv");
    assert!(ground_truth.exists());

    let mut pipeline = Tashares::new("ashares", &config)
        .unwrap()
        .with_ground_truth(&ground_truth)
        .unwrap();
    let EnsembleOutcome::Evaluated(report) = pipeline.forecast().unwrap() else {
        panic!("expected a precision report");
    };
    for (_, value) in report.iter() {
        assert!((0.0..=1.0).contains(&value));
    }
}

#[test]
fn existing_dumps_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("list_of_ashares"), "000001.SZ\n").unwrap();
    std::fs::write(dir.path().join("training_ashares.csv"), "old").unwrap();
    let config = task_config(dir.path(), &["ashares_1.json"]);

    let written = Tashares::new("ashares", &config)
        .unwrap()
        .with_symbol_list(dir.path().join("list_of_ashares"))
        .with_job(Arc::new(SyntheticJob::new(120)))
        .dump_datafiles(None)
        .unwrap();

    assert!(!written.contains(&dir.path().join("training_ashares.csv")));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("training_ashares.csv")).unwrap(),
        "old"
    );
}
