use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Events emitted by the [`super::ParallelRunner`].
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    RunStarted { files: usize },
    FileStarted { path: PathBuf },
    FileFinished { path: PathBuf, events_written: usize },
    FileFailed { path: PathBuf, error: String },
    RunFinished {
        elapsed: Duration,
        metrics: RunnerMetricsSnapshot,
    },
}

/// Observer hook for runner events.
pub trait RunnerObserver: Send + Sync {
    fn on_event(&self, event: &RunnerEvent);
}

/// Logs runner events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingRunnerObserver;

impl RunnerObserver for TracingRunnerObserver {
    fn on_event(&self, event: &RunnerEvent) {
        match event {
            RunnerEvent::FileFailed { path, error } => {
                tracing::warn!(path = %path.display(), %error, "file failed");
            }
            RunnerEvent::RunFinished { elapsed, metrics } => {
                tracing::info!(?elapsed, %metrics, "run finished");
            }
            other => tracing::debug!(event = ?other, "runner event"),
        }
    }
}

/// Live counters for a run; callers can snapshot them at any time.
#[derive(Debug, Default)]
pub struct RunnerMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,
    files_started: AtomicU64,
    files_succeeded: AtomicU64,
    files_failed: AtomicU64,
    events_written: AtomicU64,
    active_files: AtomicUsize,
    max_active_files: AtomicUsize,
}

impl RunnerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_run(&self) {
        self.run_id.fetch_add(1, Ordering::SeqCst);
        for counter in [
            &self.elapsed_ns,
            &self.files_started,
            &self.files_succeeded,
            &self.files_failed,
            &self.events_written,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        self.active_files.store(0, Ordering::SeqCst);
        self.max_active_files.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    pub fn on_file_start(&self) {
        self.files_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_files.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_files.fetch_max(now, Ordering::SeqCst);
    }

    pub fn on_file_succeeded(&self, events_written: usize) {
        self.files_succeeded.fetch_add(1, Ordering::SeqCst);
        self.events_written
            .fetch_add(u64::try_from(events_written).unwrap_or(u64::MAX), Ordering::SeqCst);
        self.active_files.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::SeqCst);
        self.active_files.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> RunnerMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        RunnerMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            files_started: self.files_started.load(Ordering::SeqCst),
            files_succeeded: self.files_succeeded.load(Ordering::SeqCst),
            files_failed: self.files_failed.load(Ordering::SeqCst),
            events_written: self.events_written.load(Ordering::SeqCst),
            max_active_files: self.max_active_files.load(Ordering::SeqCst),
        }
    }
}

/// Immutable snapshot of [`RunnerMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub files_started: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub events_written: u64,
    pub max_active_files: usize,
}

impl fmt::Display for RunnerMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, files={}/{} ok, failed={}, events_written={}, max_active_files={}, elapsed={:?}",
            self.run_id,
            self.files_succeeded,
            self.files_started,
            self.files_failed,
            self.events_written,
            self.max_active_files,
            self.elapsed
        )
    }
}
