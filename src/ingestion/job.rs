//! Single-file job: reader → transformer → writer in chunks of `commit_interval` records.
//!
//! If an observer is set, the job reports:
//!
//! - `on_success` with [`JobStats`]
//! - `on_failure` with a computed [`Severity`]
//! - `on_alert` when that severity is at or above `alert_at_or_above`
//!
//! The writer is closed whether the job succeeds or fails.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};
use crate::metadata::MetadataProvider;
use crate::processing::Transformer;
use crate::writer::EventWriter;

use super::dataset_reader::{DatasetReader, DatasetReaderOptions};
use super::observability::{JobContext, JobObserver, JobStats, Severity, severity_for_error};
use super::scanner::InputResource;

/// Options controlling a [`Job`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Records per writer chunk.
    pub commit_interval: usize,
    pub reader: DatasetReaderOptions,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            commit_interval: 100,
            reader: DatasetReaderOptions::default(),
            alert_at_or_above: Severity::Critical,
        }
    }
}

/// Ingests one input resource with one writer.
pub struct Job<W: EventWriter> {
    provider: Arc<dyn MetadataProvider>,
    writer: W,
    options: JobOptions,
    observer: Option<Arc<dyn JobObserver>>,
}

impl<W: EventWriter> Job<W> {
    pub fn new(provider: Arc<dyn MetadataProvider>, writer: W, options: JobOptions) -> Self {
        Self {
            provider,
            writer,
            options,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Run the job to completion over `resource`.
    pub fn run(&mut self, resource: InputResource) -> IngestResult<JobStats> {
        if self.options.commit_interval == 0 {
            return Err(IngestError::Config {
                message: "commit_interval must be > 0".to_string(),
            });
        }
        let mut ctx = JobContext {
            resource: resource.description(),
            ..Default::default()
        };

        let result = self.run_chunks(resource, &mut ctx);
        let closed = self.writer.close();
        let result = match (result, closed) {
            (Ok(stats), Ok(())) => Ok(stats),
            (Ok(_), Err(e)) | (Err(e), _) => Err(e),
        };

        if let Some(obs) = self.observer.as_ref() {
            match &result {
                Ok(stats) => obs.on_success(&ctx, *stats),
                Err(e) => {
                    let severity = severity_for_error(e);
                    obs.on_failure(&ctx, severity, e);
                    if severity >= self.options.alert_at_or_above {
                        obs.on_alert(&ctx, severity, e);
                    }
                }
            }
        }
        result
    }

    fn run_chunks(&mut self, resource: InputResource, ctx: &mut JobContext) -> IngestResult<JobStats> {
        let mut reader = DatasetReader::open(resource, self.provider.as_ref(), self.options.reader.clone())?;
        ctx.dataset = Some(reader.dataset().name.clone());
        ctx.job_id = Some(reader.job_id());
        ctx.test = reader.is_test();

        let transformer = Transformer::new(Arc::clone(reader.dataset()), Some(reader.job_id()))?;
        self.writer.open()?;
        let interval = self.options.commit_interval;
        let mut stats = JobStats::default();

        loop {
            let mut chunk = Vec::with_capacity(interval);
            let mut exhausted = false;
            while chunk.len() < interval {
                let Some(record) = reader.read()? else {
                    exhausted = true;
                    break;
                };
                stats.records_read += 1;
                let events = transformer
                    .transform(&record)
                    .map_err(|e| IngestError::parse_at(reader.line_count(), format!("{record:?}"), e))?;
                chunk.push(events);
            }
            if !chunk.is_empty() {
                stats.events_written += self.writer.write(&chunk)?;
                stats.chunks += 1;
                tracing::debug!(
                    job_id = ctx.job_id,
                    chunk = stats.chunks,
                    records = chunk.len(),
                    "chunk committed"
                );
            }
            if exhausted {
                break;
            }
        }

        stats.records_skipped = reader.records_skipped();
        reader.close();
        Ok(stats)
    }
}

impl<W: EventWriter> fmt::Debug for Job<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("options", &self.options)
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}
