//! Pipeline configuration, loaded from JSON.
//!
//! ```json
//! {
//!   "catalog_path": "catalog.json",
//!   "input_pattern": "*.processing",
//!   "commit_interval": 500,
//!   "strict": true,
//!   "charset": "latin1",
//!   "property_file": { "processing_folder": "/data/processing", "test_processing_folder": "/data/test/processing", "append": false },
//!   "tables": { "production": "events", "test": "events_test" },
//!   "threads": 4,
//!   "logging": { "level": "debug", "format": "json" }
//! }
//! ```
//!
//! Every field is optional.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};
use crate::execution::RunnerOptions;
use crate::ingestion::{Charset, DatasetReaderOptions, JobOptions, ReaderOptions, Severity};
use crate::logging::LogConfig;
use crate::writer::{EventTables, PropertyFileWriterOptions};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Catalog JSON for [`crate::metadata::CatalogMetadataProvider`].
    pub catalog_path: Option<PathBuf>,
    /// Glob selecting input files for [`crate::execution::discover_inputs`].
    pub input_pattern: String,
    pub commit_interval: usize,
    pub strict: bool,
    pub comments: Vec<String>,
    pub charset: Charset,
    /// Force test mode; derived from the input path when unset.
    pub test: Option<bool>,
    pub alert_at_or_above: Severity,
    pub property_file: PropertyFileWriterOptions,
    pub tables: EventTables,
    /// Worker threads for multi-file runs; `None` uses available parallelism.
    pub threads: Option<usize>,
    pub logging: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let reader = ReaderOptions::default();
        Self {
            catalog_path: None,
            input_pattern: "*".to_string(),
            commit_interval: JobOptions::default().commit_interval,
            strict: reader.strict,
            comments: reader.comments,
            charset: reader.charset,
            test: None,
            alert_at_or_above: Severity::Critical,
            property_file: PropertyFileWriterOptions::default(),
            tables: EventTables::default(),
            threads: None,
            logging: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_path(path: impl AsRef<Path>) -> IngestResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> IngestResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.commit_interval == 0 {
            return Err(IngestError::Config {
                message: "commit_interval must be > 0".to_string(),
            });
        }
        if self.threads == Some(0) {
            return Err(IngestError::Config {
                message: "threads must be > 0 when set".to_string(),
            });
        }
        self.tables.validate()
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            commit_interval: self.commit_interval,
            reader: DatasetReaderOptions {
                comments: self.comments.clone(),
                strict: self.strict,
                charset: self.charset,
                test: self.test,
                cancellation: None,
            },
            alert_at_or_above: self.alert_at_or_above,
        }
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            num_threads: self.threads,
        }
    }
}
