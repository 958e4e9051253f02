//! Tashares Core: dataset tables, the per-symbol job contract, scoring pools,
//! ranking models and precision metrics.
//!
//! This crate holds everything the pipeline needs that is not orchestration:
//! - Dataset names and table helpers (canonical ordering, fingerprints)
//! - The `JobUnit` trait and its immutable parameter set
//! - Concrete job units (fragment directory reader, synthetic generator)
//! - Ground-truth loading and target upgrading
//! - Pool construction (feature matrix + labels + group ids)
//! - Ranking model trait and the CatBoost JSON oblivious-tree evaluator
//! - Grouped Precision-at-k

pub mod data;
pub mod dataset;
pub mod job;
pub mod metrics;
pub mod model;
pub mod pool;

pub use dataset::{DatasetMap, DatasetName, Fragment};
pub use job::{JobError, JobOutput, JobParams, JobUnit};
pub use metrics::{compute_metrics, eval_metric, Metric, MetricError, PrecisionReport};
pub use model::{FileModelLoader, ModelError, ModelFormat, ModelLoader, RankingModel};
pub use pool::{build_pool, Pool, PoolError};
