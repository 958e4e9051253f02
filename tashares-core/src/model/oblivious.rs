//! CatBoost JSON model evaluation.
//!
//! CatBoost's JSON export stores symmetric ("oblivious") trees: every level
//! of a tree applies the same split, so a tree of depth `d` is a list of `d`
//! splits and `2^d` leaf values. Split `j` contributes bit `j` of the leaf
//! index when `feature > border`.

use serde::Deserialize;

use super::{ModelError, RankingModel};
use crate::pool::Pool;

#[derive(Debug, Deserialize)]
struct RawModel {
    #[serde(default)]
    features_info: Option<RawFeaturesInfo>,
    oblivious_trees: Vec<RawTree>,
    #[serde(default)]
    scale_and_bias: Option<(f64, RawBias)>,
}

#[derive(Debug, Deserialize)]
struct RawFeaturesInfo {
    #[serde(default)]
    float_features: Vec<RawFloatFeature>,
}

#[derive(Debug, Deserialize)]
struct RawFloatFeature {
    feature_index: usize,
    flat_feature_index: usize,
}

#[derive(Debug, Deserialize)]
struct RawTree {
    leaf_values: Vec<f64>,
    #[serde(default)]
    splits: Vec<RawSplit>,
}

#[derive(Debug, Deserialize)]
struct RawSplit {
    split_type: String,
    #[serde(default)]
    float_feature_index: Option<usize>,
    #[serde(default)]
    border: Option<f64>,
}

/// Older exports carry a scalar bias, newer ones one bias per dimension.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBias {
    Scalar(f64),
    PerDimension(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq)]
struct Split {
    /// Column in the pool's feature matrix.
    feature: usize,
    border: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Tree {
    splits: Vec<Split>,
    leaf_values: Vec<f64>,
}

impl Tree {
    fn leaf_index(&self, row: &[f64]) -> usize {
        self.splits
            .iter()
            .enumerate()
            .fold(0usize, |index, (bit, split)| {
                // NaN compares false and falls to the low side.
                if row[split.feature] > split.border {
                    index | (1 << bit)
                } else {
                    index
                }
            })
    }
}

/// A loaded oblivious-tree ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct ObliviousTreeModel {
    trees: Vec<Tree>,
    scale: f64,
    bias: f64,
    feature_count: usize,
}

impl ObliviousTreeModel {
    /// Parse a CatBoost JSON export.
    pub fn from_json(text: &str) -> Result<Self, String> {
        let raw: RawModel = serde_json::from_str(text).map_err(|e| e.to_string())?;
        if raw.oblivious_trees.is_empty() {
            return Err("model contains no trees".into());
        }

        // float_feature_index → column of the flat feature matrix
        let flat_index = |float_index: usize| -> usize {
            raw.features_info
                .as_ref()
                .and_then(|info| {
                    info.float_features
                        .iter()
                        .find(|f| f.feature_index == float_index)
                })
                .map_or(float_index, |f| f.flat_feature_index)
        };

        let mut trees = Vec::with_capacity(raw.oblivious_trees.len());
        for (t, raw_tree) in raw.oblivious_trees.iter().enumerate() {
            let mut splits = Vec::with_capacity(raw_tree.splits.len());
            for split in &raw_tree.splits {
                if split.split_type != "FloatFeature" {
                    return Err(format!(
                        "tree {t}: unsupported split type '{}'",
                        split.split_type
                    ));
                }
                let (Some(index), Some(border)) = (split.float_feature_index, split.border) else {
                    return Err(format!("tree {t}: float split without index or border"));
                };
                splits.push(Split {
                    feature: flat_index(index),
                    border,
                });
            }
            let expected = 1usize << splits.len();
            if raw_tree.leaf_values.len() != expected {
                return Err(format!(
                    "tree {t}: expected {expected} leaf values for depth {}, found {}",
                    splits.len(),
                    raw_tree.leaf_values.len()
                ));
            }
            trees.push(Tree {
                splits,
                leaf_values: raw_tree.leaf_values.clone(),
            });
        }

        let (scale, bias) = match raw.scale_and_bias {
            Some((scale, RawBias::Scalar(bias))) => (scale, bias),
            Some((scale, RawBias::PerDimension(biases))) => {
                (scale, biases.first().copied().unwrap_or(0.0))
            }
            None => (1.0, 0.0),
        };

        let feature_count = trees
            .iter()
            .flat_map(|t| t.splits.iter().map(|s| s.feature + 1))
            .max()
            .unwrap_or(0);

        Ok(Self {
            trees,
            scale,
            bias,
            feature_count,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Smallest feature width the model can score.
    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let raw: f64 = self
            .trees
            .iter()
            .map(|tree| tree.leaf_values[tree.leaf_index(row)])
            .sum();
        self.scale * raw + self.bias
    }
}

impl RankingModel for ObliviousTreeModel {
    fn predict(&self, pool: &Pool) -> Result<Vec<f64>, ModelError> {
        if pool.feature_count() < self.feature_count {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.feature_count,
                actual: pool.feature_count(),
            });
        }
        Ok(pool.features.iter().map(|row| self.predict_row(row)).collect())
    }
}
