//! Multi-file execution: independent [`Job`]s on a rayon thread pool.
//!
//! Each input file gets its own job (and therefore its own metadata provider state and writer);
//! within a job everything stays sequential. This module provides:
//!
//! - [`discover_inputs`]: find input files under a directory by glob
//! - [`ParallelRunner`]: run one job per file with a bounded number of worker threads
//! - real-time [`RunnerMetrics`] and [`RunnerObserver`] hooks

mod observer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::{IngestError, IngestResult};
use crate::ingestion::{InputResource, Job, JobStats};
use crate::writer::EventWriter;

pub use observer::{RunnerEvent, RunnerMetrics, RunnerMetricsSnapshot, RunnerObserver, TracingRunnerObserver};

/// Configuration for the [`ParallelRunner`].
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Worker threads; `None` uses the platform's available parallelism.
    pub num_threads: Option<usize>,
}

/// Result of one file.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: IngestResult<JobStats>,
}

/// Runs one job per input file in parallel.
pub struct ParallelRunner {
    pool: ThreadPool,
    observer: Option<Arc<dyn RunnerObserver>>,
    metrics: Arc<RunnerMetrics>,
}

impl ParallelRunner {
    pub fn new(opts: RunnerOptions) -> IngestResult<Self> {
        if opts.num_threads == Some(0) {
            return Err(IngestError::Config {
                message: "num_threads must be > 0 when set".to_string(),
            });
        }
        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("ingest-worker-{i}"))
            .build()
            .map_err(|e| IngestError::Config {
                message: format!("failed to build thread pool: {e}"),
            })?;
        Ok(Self {
            pool,
            observer: None,
            metrics: Arc::new(RunnerMetrics::new()),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunnerObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn metrics(&self) -> Arc<RunnerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Build a job with `make_job` for every input and run it. Outcomes keep the input order.
    pub fn run<F, W>(&self, inputs: &[PathBuf], make_job: F) -> Vec<FileOutcome>
    where
        F: Fn(&Path) -> IngestResult<Job<W>> + Send + Sync,
        W: EventWriter,
    {
        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(RunnerEvent::RunStarted { files: inputs.len() });

        let outcomes = self.pool.install(|| {
            inputs
                .par_iter()
                .map(|path| self.run_one(path, &make_job))
                .collect::<Vec<_>>()
        });

        self.metrics.end_run(start.elapsed());
        self.emit(RunnerEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });
        outcomes
    }

    fn run_one<F, W>(&self, path: &Path, make_job: &F) -> FileOutcome
    where
        F: Fn(&Path) -> IngestResult<Job<W>>,
        W: EventWriter,
    {
        self.metrics.on_file_start();
        self.emit(RunnerEvent::FileStarted {
            path: path.to_path_buf(),
        });

        let result = make_job(path).and_then(|mut job| job.run(InputResource::from_path(path)));
        match &result {
            Ok(stats) => {
                self.metrics.on_file_succeeded(stats.events_written);
                self.emit(RunnerEvent::FileFinished {
                    path: path.to_path_buf(),
                    events_written: stats.events_written,
                });
            }
            Err(e) => {
                self.metrics.on_file_failed();
                self.emit(RunnerEvent::FileFailed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
        FileOutcome {
            path: path.to_path_buf(),
            result,
        }
    }

    fn emit(&self, event: RunnerEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

/// Files under `root` whose name matches the glob `pattern`, sorted by path.
pub fn discover_inputs(root: impl AsRef<Path>, pattern: &str) -> IngestResult<Vec<PathBuf>> {
    let pattern = glob::Pattern::new(pattern).map_err(|e| IngestError::Config {
        message: format!("invalid input pattern '{pattern}': {e}"),
    })?;
    let mut out = Vec::new();
    for entry in WalkDir::new(root.as_ref()).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && pattern.matches(&entry.file_name().to_string_lossy()) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}
