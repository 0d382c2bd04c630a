use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// The job failed on its input or its dataset definition.
    Error,
    /// Infrastructure failure: I/O or the database.
    Critical,
}

/// What a job was working on when it reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobContext {
    /// Description of the input resource.
    pub resource: String,
    /// Resolved dataset name, once known.
    pub dataset: Option<String>,
    pub job_id: Option<i64>,
    pub test: bool,
}

/// Counters reported when a job finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Records mapped and handed to the transformer.
    pub records_read: usize,
    /// Lines the tokenizer skipped (blank or tolerated footer).
    pub records_skipped: usize,
    /// Statements (or side-file lines) reported by the writer.
    pub events_written: usize,
    /// Non-empty chunks passed to the writer.
    pub chunks: usize,
}

/// Observer interface for job outcomes.
pub trait JobObserver: Send + Sync {
    fn on_success(&self, _ctx: &JobContext, _stats: JobStats) {}

    fn on_failure(&self, _ctx: &JobContext, _severity: Severity, _error: &IngestError) {}

    /// Called when a failure meets the alert threshold. Forwards to [`Self::on_failure`] by
    /// default.
    fn on_alert(&self, ctx: &JobContext, severity: Severity, error: &IngestError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Map an error to the severity reported to observers.
pub fn severity_for_error(error: &IngestError) -> Severity {
    match error.root_cause() {
        IngestError::Io(_) | IngestError::NonTransientFlatFile { .. } | IngestError::Database(_) => {
            Severity::Critical
        }
        IngestError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => Severity::Critical,
            _ => Severity::Error,
        },
        _ => Severity::Error,
    }
}

/// Fans callbacks out to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn JobObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn JobObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl JobObserver for CompositeObserver {
    fn on_success(&self, ctx: &JobContext, stats: JobStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &JobContext, severity: Severity, error: &IngestError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &JobContext, severity: Severity, error: &IngestError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Reports job outcomes as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl JobObserver for TracingObserver {
    fn on_success(&self, ctx: &JobContext, stats: JobStats) {
        tracing::info!(
            resource = %ctx.resource,
            dataset = ctx.dataset.as_deref().unwrap_or(""),
            job_id = ctx.job_id,
            test = ctx.test,
            records_read = stats.records_read,
            records_skipped = stats.records_skipped,
            events_written = stats.events_written,
            chunks = stats.chunks,
            "job finished"
        );
    }

    fn on_failure(&self, ctx: &JobContext, severity: Severity, error: &IngestError) {
        tracing::error!(
            resource = %ctx.resource,
            dataset = ctx.dataset.as_deref().unwrap_or(""),
            job_id = ctx.job_id,
            ?severity,
            %error,
            "job failed"
        );
    }

    fn on_alert(&self, ctx: &JobContext, severity: Severity, error: &IngestError) {
        tracing::error!(
            alert = true,
            resource = %ctx.resource,
            job_id = ctx.job_id,
            ?severity,
            %error,
            "job alert"
        );
    }
}

/// Appends job outcomes to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Writes are best-effort; failures to open or write the log are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} {line}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"));
        }
    }
}

impl JobObserver for FileObserver {
    fn on_success(&self, ctx: &JobContext, stats: JobStats) {
        self.append_line(&format!(
            "ok resource={} job_id={:?} read={} skipped={} written={} chunks={}",
            ctx.resource,
            ctx.job_id,
            stats.records_read,
            stats.records_skipped,
            stats.events_written,
            stats.chunks
        ));
    }

    fn on_failure(&self, ctx: &JobContext, severity: Severity, error: &IngestError) {
        self.append_line(&format!(
            "fail severity={severity:?} resource={} job_id={:?} err={error}",
            ctx.resource, ctx.job_id
        ));
    }

    fn on_alert(&self, ctx: &JobContext, severity: Severity, error: &IngestError) {
        self.append_line(&format!(
            "ALERT severity={severity:?} resource={} job_id={:?} err={error}",
            ctx.resource, ctx.job_id
        ));
    }
}
