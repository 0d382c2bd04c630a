//! Property side-file writer: one delimited line per event property, for downstream bulk load.
//!
//! Line layout:
//!
//! ```text
//! customer_id_type_id,customer_id,event_type_id,event_ts,1,property_type_id,1,value
//! ```

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};
use crate::metadata::MetadataProvider;
use crate::types::CustomerEvent;

use super::{EVENT_VERSION, EventWriter, LINE_SEPARATOR, PROPERTY_VERSION, format_property_value, non_empty};

/// Timestamp layout of the `event_ts` field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const APPEND_FILENAME: &str = "properties.filepart";
const FILEPART_SUFFIX: &str = "_properties.filepart";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyFileWriterOptions {
    pub processing_folder: PathBuf,
    pub test_processing_folder: PathBuf,
    /// Every job appends to one shared `properties.filepart`.
    pub append: bool,
    pub column_delimiter: String,
}

impl Default for PropertyFileWriterOptions {
    fn default() -> Self {
        Self {
            processing_folder: PathBuf::from("processing"),
            test_processing_folder: PathBuf::from("test/processing"),
            append: false,
            column_delimiter: ",".to_string(),
        }
    }
}

/// Writes event properties to `<folder>/<input>_properties.filepart` (or the shared append file).
///
/// The output file is opened on [`open`](Self::open) (or the first write) and released on
/// [`close`](EventWriter::close).
pub struct PropertyFileWriter {
    options: PropertyFileWriterOptions,
    provider: Arc<dyn MetadataProvider>,
    created: NaiveDateTime,
    out: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl PropertyFileWriter {
    pub fn new(options: PropertyFileWriterOptions, provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            options,
            provider,
            created: Local::now().naive_local(),
            out: None,
            path: None,
        }
    }

    pub fn created(&self) -> NaiveDateTime {
        self.created
    }

    /// Path of the open output file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Output location for the provider's current file name and test flag.
    pub fn output_path(&self) -> IngestResult<PathBuf> {
        let folder = if self.provider.is_test() {
            &self.options.test_processing_folder
        } else {
            &self.options.processing_folder
        };
        if self.options.append {
            return Ok(folder.join(APPEND_FILENAME));
        }
        let filename = self.provider.filename().ok_or_else(|| IngestError::InvalidState {
            message: "property file writer needs the input filename".to_string(),
        })?;
        let stem = filename
            .rfind(crate::metadata::PROCESSING_SUFFIX)
            .map_or(filename.as_str(), |idx| &filename[..idx]);
        Ok(folder.join(format!("{stem}{FILEPART_SUFFIX}")))
    }

    /// Create (or, in append mode, reopen) the output file and return its path.
    pub fn open_file(&mut self) -> IngestResult<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let path = self.output_path()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.options.append)
            .truncate(!self.options.append)
            .open(&path)?;
        tracing::debug!(path = %path.display(), append = self.options.append, "property file opened");
        self.out = Some(BufWriter::new(file));
        self.path = Some(path.clone());
        Ok(path)
    }

    fn format_line(&self, event: &CustomerEvent, property_type_id: i32, value: &str) -> String {
        let d = &self.options.column_delimiter;
        let ts = event.ts.unwrap_or(self.created).format(TIMESTAMP_FORMAT);
        format!(
            "{}{d}{}{d}{}{d}{ts}{d}{EVENT_VERSION}{d}{property_type_id}{d}{PROPERTY_VERSION}{d}{value}",
            event.customer_id_type_id, event.customer_id, event.event_type_id,
        )
    }
}

impl EventWriter for PropertyFileWriter {
    fn open(&mut self) -> IngestResult<()> {
        self.open_file().map(drop)
    }

    fn write(&mut self, batch: &[Vec<CustomerEvent>]) -> IngestResult<usize> {
        let mut lines = String::new();
        let mut count = 0;
        for event in non_empty(batch) {
            for property in &event.properties {
                lines.push_str(&self.format_line(
                    event,
                    property.property_type_id,
                    &format_property_value(property),
                ));
                lines.push_str(LINE_SEPARATOR);
                count += 1;
            }
        }
        self.open_file()?;
        if count == 0 {
            return Ok(0);
        }
        let out = self.out.as_mut().ok_or_else(|| IngestError::InvalidState {
            message: "property file writer is not open".to_string(),
        })?;
        out.write_all(lines.as_bytes())?;
        tracing::debug!(lines = count, "properties written");
        Ok(count)
    }

    fn close(&mut self) -> IngestResult<()> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        self.path = None;
        Ok(())
    }
}

impl fmt::Debug for PropertyFileWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyFileWriter")
            .field("options", &self.options)
            .field("path", &self.path)
            .field("created", &self.created)
            .finish()
    }
}
