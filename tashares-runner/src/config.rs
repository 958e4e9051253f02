//! Task configuration.
//!
//! A TOML file with shared `[defaults]` and one `[tasks.<name>]` section per
//! market (e.g. `ashares`, `stocks`). Each task names its data directory, the
//! model files that make up its ensemble and its symbol lists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tashares_core::{JobParams, ModelFormat};

use crate::scheduler::FailurePolicy;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown task '{task}' (configured: {known})")]
    UnknownTask { task: String, known: String },

    #[error("task '{0}' has an empty model list")]
    EmptyModelList(String),

    #[error("start_from_date {start} is after max_training_date {max_training}")]
    InvalidDateRange {
        start: NaiveDate,
        max_training: NaiveDate,
    },
}

/// Settings shared by every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub start_from_date: NaiveDate,
    pub max_training_date: NaiveDate,
    /// Forward-return horizon used to derive `binary_label` (`target_{job}`).
    pub forecast_job: String,
    /// Concurrent job units. 0 means `max(cpu_count - 1, 1)`.
    pub workers: usize,
    pub failure_policy: FailurePolicy,
}

impl Defaults {
    /// Job parameters for a run over `task`'s data directory.
    pub fn job_params(&self, task: &TaskConfig, forecast_only: bool) -> JobParams {
        JobParams {
            data_dir: task.data_dir.clone(),
            update_history: true,
            start_from_date: self.start_from_date,
            max_training_date: self.max_training_date,
            forecast_only,
            dump_files: false,
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        let params = JobParams::default();
        Self {
            start_from_date: params.start_from_date,
            max_training_date: params.max_training_date,
            forecast_job: "1".into(),
            workers: 0,
            failure_policy: FailurePolicy::AbortOnFirst,
        }
    }
}

/// One market's models, symbol lists and data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub data_dir: PathBuf,
    /// Model files, relative to `data_dir`. Order fixes the output column order.
    pub model_list: Vec<String>,
    #[serde(default = "default_model_format")]
    pub model_format: ModelFormat,
    /// Symbol list scored by `forecast`, relative to `data_dir`.
    pub symbols_of_interest: String,
    /// Symbol list used to build training data, relative to `data_dir`.
    pub symbol_list: String,
    /// Non-feature columns specific to this market.
    #[serde(default)]
    pub extra_drop_columns: Vec<String>,
}

fn default_model_format() -> ModelFormat {
    ModelFormat::CatboostJson
}

impl TaskConfig {
    pub fn model_paths(&self) -> Vec<PathBuf> {
        self.model_list
            .iter()
            .map(|m| self.data_dir.join(m.trim()))
            .collect()
    }

    pub fn symbols_of_interest_path(&self) -> PathBuf {
        self.data_dir.join(&self.symbols_of_interest)
    }

    pub fn symbol_list_path(&self) -> PathBuf {
        self.data_dir.join(&self.symbol_list)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasharesConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,
}

impl TasharesConfig {
    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.start_from_date > self.defaults.max_training_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.defaults.start_from_date,
                max_training: self.defaults.max_training_date,
            });
        }
        for (name, task) in &self.tasks {
            if task.model_list.iter().all(|m| m.trim().is_empty()) {
                return Err(ConfigError::EmptyModelList(name.clone()));
            }
        }
        Ok(())
    }

    /// Look up a task section by name.
    pub fn task(&self, name: &str) -> Result<&TaskConfig, ConfigError> {
        self.tasks.get(name).ok_or_else(|| ConfigError::UnknownTask {
            task: name.to_string(),
            known: self.tasks.keys().cloned().collect::<Vec<_>>().join(", "),
        })
    }

    pub fn job_params(&self, task: &TaskConfig, forecast_only: bool) -> JobParams {
        self.defaults.job_params(task, forecast_only)
    }
}

impl Default for TasharesConfig {
    /// Built-in `ashares` and `stocks` tasks under `./data`.
    fn default() -> Self {
        let mut tasks = BTreeMap::new();
        tasks.insert(
            "ashares".to_string(),
            TaskConfig {
                data_dir: PathBuf::from("data/ashares"),
                model_list: vec![
                    "ashares_1.json".into(),
                    "ashares_2.json".into(),
                    "ashares_5.json".into(),
                ],
                model_format: ModelFormat::CatboostJson,
                symbols_of_interest: "list_of_interest".into(),
                symbol_list: "list_of_ashares".into(),
                extra_drop_columns: Vec::new(),
            },
        );
        tasks.insert(
            "stocks".to_string(),
            TaskConfig {
                data_dir: PathBuf::from("data/stocks"),
                model_list: vec![
                    "stocks_1.json".into(),
                    "stocks_2.json".into(),
                    "stocks_5.json".into(),
                ],
                model_format: ModelFormat::CatboostJson,
                symbols_of_interest: "list_of_interest".into(),
                symbol_list: "list_of_stocks".into(),
                extra_drop_columns: vec!["adj close".into()],
            },
        );
        Self {
            defaults: Defaults::default(),
            tasks,
        }
    }
}
