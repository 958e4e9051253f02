//! Ranking models.
//!
//! A model is opaque to the ensemble: it is loaded from a path in a given
//! format and turns a [`Pool`] into one score per row. The loader sits behind
//! a trait so tests and alternative backends can supply their own models.

mod oblivious;

pub use oblivious::ObliviousTreeModel;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::Pool;

/// Errors from loading or running a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("unsupported model format '{0}' (export CatBoost models with format=json)")]
    UnsupportedFormat(String),

    #[error("model expects {expected} features but pool has {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },
}

/// On-disk model encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// CatBoost JSON export: symmetric (oblivious) trees over float features.
    CatboostJson,
}

impl FromStr for ModelFormat {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" | "catboost_json" => Ok(ModelFormat::CatboostJson),
            other => Err(ModelError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFormat::CatboostJson => f.write_str("json"),
        }
    }
}

/// A pre-trained ranking function.
pub trait RankingModel: Send + Sync {
    /// One score per pool row, higher means ranked earlier.
    fn predict(&self, pool: &Pool) -> Result<Vec<f64>, ModelError>;
}

/// Loads models from storage.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path, format: ModelFormat) -> Result<Box<dyn RankingModel>, ModelError>;
}

/// Loads models from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileModelLoader;

impl ModelLoader for FileModelLoader {
    fn load(&self, path: &Path, format: ModelFormat) -> Result<Box<dyn RankingModel>, ModelError> {
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.display().to_string(),
            source,
        })?;
        match format {
            ModelFormat::CatboostJson => {
                let model = ObliviousTreeModel::from_json(&text).map_err(|reason| {
                    ModelError::Parse {
                        path: path.display().to_string(),
                        reason,
                    }
                })?;
                Ok(Box::new(model))
            }
        }
    }
}

/// Column name for a model's predictions: the file stem of its path.
pub fn model_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn stem_strips_directory_and_extension() {
        assert_eq!(model_stem(&PathBuf::from("data/ashares/ashares_1d.json")), "ashares_1d");
        assert_eq!(model_stem(&PathBuf::from("model")), "model");
    }

    #[test]
    fn format_parsing() {
        assert_eq!("json".parse::<ModelFormat>().unwrap(), ModelFormat::CatboostJson);
        assert_eq!("JSON".parse::<ModelFormat>().unwrap(), ModelFormat::CatboostJson);
        assert!(matches!(
            "cbm".parse::<ModelFormat>(),
            Err(ModelError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_model_file_is_a_read_error() {
        let err = FileModelLoader
            .load(Path::new("/nonexistent/model.json"), ModelFormat::CatboostJson)
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/model.json"));
    }
}
