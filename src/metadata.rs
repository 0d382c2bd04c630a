//! Metadata provider: resolves an input file name to its [`FileDataset`], and carries the per-job
//! state (file name, test mode, job id) that the reader and writers share.
//!
//! [`CatalogMetadataProvider`] is backed by a JSON [`Catalog`]:
//!
//! ```json
//! {
//!   "datasets": [
//!     {
//!       "name": "purchases",
//!       "file_pattern": "purchases_*.csv*",
//!       "column_delimiter": ",",
//!       "header_row": true,
//!       "columns": [
//!         { "name": "customer", "column_index": 1, "value_type": "STRING", "role": { "kind": "customer_id" } },
//!         { "name": "event", "column_index": 2, "value_type": "INTEGER", "role": { "kind": "event_type" } }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};
use crate::types::FileDataset;

/// Suffix of files currently claimed by a worker.
pub const PROCESSING_SUFFIX: &str = ".processing";

static TEST_PATH: LazyLock<Regex> = LazyLock::new(|| {
    // Matches a `test` directory component on either separator style.
    Regex::new(r"[/\\]test[/\\]").unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Default test-mode policy: the absolute input path contains a `/test/` directory.
pub fn is_test_path(path: &Path) -> bool {
    TEST_PATH.is_match(&path.to_string_lossy())
}

/// Catalog lookup and per-job state consumed by the pipeline.
pub trait MetadataProvider: Send + Sync {
    fn set_filename(&self, filename: &str);

    fn filename(&self) -> Option<String>;

    /// Dataset for the current file name, `None` when the catalog has no match.
    fn file_dataset(&self) -> IngestResult<Option<Arc<FileDataset>>>;

    fn set_test(&self, test: bool);

    fn is_test(&self) -> bool;

    /// Allocate the job id for the current run.
    fn start_job(&self) -> IngestResult<i64>;

    fn job_id(&self) -> Option<i64>;
}

/// The set of datasets a provider can resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub datasets: Vec<FileDataset>,
}

impl Catalog {
    pub fn new(datasets: Vec<FileDataset>) -> Self {
        Self { datasets }
    }

    pub fn from_path(path: impl AsRef<Path>) -> IngestResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> IngestResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Resolve by dataset name (ignoring a `.processing` suffix), then by `file_pattern`.
    pub fn resolve(&self, filename: &str) -> Option<&FileDataset> {
        let bare = filename.strip_suffix(PROCESSING_SUFFIX).unwrap_or(filename);
        self.datasets
            .iter()
            .find(|d| d.name == bare || d.name == filename)
            .or_else(|| {
                self.datasets.iter().find(|d| {
                    d.file_pattern
                        .as_deref()
                        .and_then(|p| glob::Pattern::new(p).ok())
                        .is_some_and(|p| p.matches(bare) || p.matches(filename))
                })
            })
    }
}

#[derive(Debug, Default)]
struct JobState {
    filename: Option<String>,
    test: bool,
    job_id: Option<i64>,
}

/// Shared job id counter.
///
/// Clones hand out ids from the same sequence, so providers built one per input file (as the
/// parallel runner needs) still give every job a distinct id.
#[derive(Debug, Clone)]
pub struct JobIdAllocator {
    next: Arc<AtomicI64>,
}

impl JobIdAllocator {
    /// Start at `first` (e.g. one past the highest id already persisted).
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: Arc::new(AtomicI64::new(first)),
        }
    }

    pub fn allocate(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for JobIdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// [`MetadataProvider`] over an in-memory [`Catalog`]. Job ids come from a [`JobIdAllocator`].
#[derive(Debug)]
pub struct CatalogMetadataProvider {
    datasets: Vec<Arc<FileDataset>>,
    catalog: Catalog,
    job_ids: JobIdAllocator,
    state: Mutex<JobState>,
}

impl CatalogMetadataProvider {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            datasets: catalog.datasets.iter().cloned().map(Arc::new).collect(),
            catalog,
            job_ids: JobIdAllocator::default(),
            state: Mutex::new(JobState::default()),
        }
    }

    /// Start job ids at `first` with a counter of this provider's own.
    pub fn with_first_job_id(self, first: i64) -> Self {
        self.with_job_ids(JobIdAllocator::starting_at(first))
    }

    /// Draw job ids from `job_ids`, typically shared with the providers of other files.
    pub fn with_job_ids(mut self, job_ids: JobIdAllocator) -> Self {
        self.job_ids = job_ids;
        self
    }

    /// Allocator backing this provider's job ids.
    pub fn job_ids(&self) -> &JobIdAllocator {
        &self.job_ids
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        // A poisoned lock only means another thread panicked mid-update of plain values.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MetadataProvider for CatalogMetadataProvider {
    fn set_filename(&self, filename: &str) {
        self.state().filename = Some(filename.to_string());
    }

    fn filename(&self) -> Option<String> {
        self.state().filename.clone()
    }

    fn file_dataset(&self) -> IngestResult<Option<Arc<FileDataset>>> {
        let Some(filename) = self.filename() else {
            return Err(IngestError::InvalidState {
                message: "metadata provider has no filename set".to_string(),
            });
        };
        let found = self.catalog.resolve(&filename).and_then(|resolved| {
            self.datasets
                .iter()
                .find(|d| d.name == resolved.name)
                .cloned()
        });
        Ok(found)
    }

    fn set_test(&self, test: bool) {
        self.state().test = test;
    }

    fn is_test(&self) -> bool {
        self.state().test
    }

    fn start_job(&self) -> IngestResult<i64> {
        let id = self.job_ids.allocate();
        self.state().job_id = Some(id);
        tracing::info!(job_id = id, filename = ?self.filename(), "job started");
        Ok(id)
    }

    fn job_id(&self) -> Option<i64> {
        self.state().job_id
    }
}
