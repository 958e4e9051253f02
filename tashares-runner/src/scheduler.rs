//! Per-symbol job fan-out.
//!
//! One job unit per symbol runs on a private rayon pool of
//! `max(cpu_count - 1, 1)` threads. Results travel back over a channel and
//! are merged on the calling thread in completion order, so the accumulator
//! needs no locking. Fragments are only collected here; concatenation and
//! ordering happen afterwards in [`aggregate`](crate::aggregate).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use tashares_core::{DatasetMap, Fragment, JobError, JobOutput, JobParams, JobUnit};

/// What to do when a job unit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failure aborts the whole run. Jobs not yet started are
    /// skipped and no partial result is returned.
    #[default]
    AbortOnFirst,
    /// Failed symbols are recorded and skipped; every other symbol is merged.
    CollectAndContinue,
}

/// Errors from the scheduler.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("job for '{symbol}' failed: {source}")]
    JobFailed {
        symbol: String,
        #[source]
        source: JobError,
    },

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// A symbol whose job unit failed under [`FailurePolicy::CollectAndContinue`].
#[derive(Debug)]
pub struct JobFailure {
    pub symbol: String,
    pub error: JobError,
}

/// Unmerged fragments per dataset name, plus run bookkeeping.
#[derive(Debug, Default)]
pub struct ScheduleReport {
    /// Every dataset name any job reported, with its non-empty fragments.
    pub fragments: DatasetMap<Vec<Fragment>>,
    /// Jobs that returned successfully.
    pub completed: usize,
    pub failures: Vec<JobFailure>,
}

impl ScheduleReport {
    /// Fold one job's output into the accumulator.
    ///
    /// The name is registered even when its fragment is empty, so a dataset
    /// every job reported as empty still comes out as an (empty) table.
    fn merge(&mut self, output: JobOutput) {
        for (name, fragment) in output {
            let slot = self.fragments.entry(name).or_default();
            if !fragment.is_empty() {
                slot.push(fragment);
            }
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Progress callbacks, invoked on the coordinating thread.
pub trait JobProgress: Send {
    /// Called as each job completes, in completion order.
    fn on_complete(
        &self,
        symbol: &str,
        completed: usize,
        total: usize,
        result: Result<(), &JobError>,
    );

    /// Called once when every job has reported.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that writes to the `tracing` log.
pub struct LogProgress;

impl JobProgress for LogProgress {
    fn on_complete(
        &self,
        symbol: &str,
        completed: usize,
        total: usize,
        result: Result<(), &JobError>,
    ) {
        match result {
            Ok(()) => debug!("[{completed}/{total}] {symbol} done"),
            Err(e) => warn!("[{completed}/{total}] {symbol} failed: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        info!("{succeeded}/{total} jobs completed, {failed} failed");
    }
}

/// Default pool size: one core is left for the coordinating thread.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// Fans one job unit out over many symbols.
#[derive(Debug, Clone)]
pub struct JobScheduler {
    workers: usize,
    policy: FailurePolicy,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            workers: default_workers(),
            policy: FailurePolicy::default(),
        }
    }

    /// Override the pool size. 0 keeps the default.
    pub fn with_workers(mut self, workers: usize) -> Self {
        if workers > 0 {
            self.workers = workers;
        }
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run `job` once per symbol and collect the fragments.
    ///
    /// Under [`FailurePolicy::AbortOnFirst`] the first failure cancels every
    /// job not yet started. The error is returned once the jobs already
    /// running have finished; their results are discarded.
    pub fn run(
        &self,
        job: Arc<dyn JobUnit>,
        symbols: &[String],
        params: Arc<JobParams>,
        progress: Option<&dyn JobProgress>,
    ) -> Result<ScheduleReport, ScheduleError> {
        let mut report = ScheduleReport::default();
        let total = symbols.len();
        if total == 0 {
            return Ok(report);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("tashares-job-{i}"))
            .build()?;
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<(String, Result<JobOutput, JobError>)>();

        for symbol in symbols {
            let tx = tx.clone();
            let job = Arc::clone(&job);
            let params = Arc::clone(&params);
            let cancel = Arc::clone(&cancel);
            let symbol = symbol.clone();
            debug!("scheduled {} for {symbol}", job.name());

            pool.spawn(move || {
                if cancel.load(Ordering::Relaxed) {
                    return;
                }
                let result = panic::catch_unwind(AssertUnwindSafe(|| job.run(&symbol, &params)))
                    .unwrap_or_else(|payload| Err(JobError::Panicked(panic_message(&*payload))));
                // The receiver is gone only after an abort.
                let _ = tx.send((symbol, result));
            });
        }
        drop(tx);

        let mut finished = 0usize;
        let mut aborted: Option<ScheduleError> = None;
        for (symbol, result) in rx {
            if aborted.is_some() {
                debug!("discarding {symbol} after abort");
                continue;
            }
            finished += 1;
            match result {
                Ok(output) => {
                    if let Some(p) = progress {
                        p.on_complete(&symbol, finished, total, Ok(()));
                    }
                    report.merge(output);
                    report.completed += 1;
                }
                Err(error) => {
                    if let Some(p) = progress {
                        p.on_complete(&symbol, finished, total, Err(&error));
                    }
                    match self.policy {
                        FailurePolicy::AbortOnFirst => {
                            cancel.store(true, Ordering::Relaxed);
                            aborted = Some(ScheduleError::JobFailed {
                                symbol,
                                source: error,
                            });
                        }
                        FailurePolicy::CollectAndContinue => {
                            report.failures.push(JobFailure { symbol, error });
                        }
                    }
                }
            }
        }

        if let Some(error) = aborted {
            return Err(error);
        }

        debug!("{finished} jobs completed");
        if let Some(p) = progress {
            p.on_batch_complete(report.completed, report.failures.len(), total);
        }
        Ok(report)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
