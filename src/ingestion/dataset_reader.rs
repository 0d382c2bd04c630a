//! Metadata-driven reader: a [`RecordReader`] and a [`LineMapper`] configured from the dataset the
//! metadata provider resolves for the input file.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};
use crate::metadata::{MetadataProvider, is_test_path};
use crate::types::{FileDataset, Record};

use super::line_mapper::LineMapper;
use super::record_reader::{CancellationToken, ReaderOptions, RecordReader};
use super::scanner::{Charset, InputResource};
use super::separator::DefaultRecordSeparatorPolicy;

/// Reader settings that are not part of the dataset definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetReaderOptions {
    pub comments: Vec<String>,
    pub strict: bool,
    pub charset: Charset,
    /// Force test mode instead of deriving it from the input path.
    pub test: Option<bool>,
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl Default for DatasetReaderOptions {
    fn default() -> Self {
        let reader = ReaderOptions::default();
        Self {
            comments: reader.comments,
            strict: reader.strict,
            charset: reader.charset,
            test: None,
            cancellation: None,
        }
    }
}

/// Yields [`Record`]s from one input file.
pub struct DatasetReader {
    dataset: Arc<FileDataset>,
    reader: RecordReader,
    mapper: LineMapper,
    job_id: i64,
    test: bool,
    records_skipped: usize,
}

impl DatasetReader {
    /// Resolve the dataset for `resource`, start the job and open the input.
    ///
    /// Fails with [`IngestError::MissingDataset`] when the provider has no dataset for the file
    /// name. Test mode comes from `options.test`, else from a `/test/` component in the absolute
    /// path.
    pub fn open(
        resource: InputResource,
        provider: &dyn MetadataProvider,
        options: DatasetReaderOptions,
    ) -> IngestResult<Self> {
        let filename = resource.filename();
        provider.set_filename(&filename);
        let Some(dataset) = provider.file_dataset()? else {
            tracing::warn!(%filename, "no dataset found");
            return Err(IngestError::MissingDataset { filename });
        };
        tracing::debug!(%filename, dataset = %dataset.name, "found dataset");

        let test = options.test.unwrap_or_else(|| {
            resource
                .absolute_path()
                .is_some_and(|path| is_test_path(&path))
        });
        provider.set_test(test);
        let job_id = provider.start_job()?;

        let reader_options = ReaderOptions {
            row_delimiter: dataset.row_delimiter.clone(),
            lines_to_skip: usize::from(dataset.header_row),
            comments: options.comments,
            strict: options.strict,
            charset: options.charset,
        };
        let mut reader = RecordReader::new(resource, reader_options)
            .with_policy(DefaultRecordSeparatorPolicy::new(
                dataset.text_qualifier,
                dataset.row_delimiter.clone(),
            ))
            .with_skipped_lines_callback(|header| tracing::debug!(header, "skipped header row"));
        if let Some(token) = options.cancellation {
            reader = reader.with_cancellation(token);
        }

        let mapper = LineMapper::for_dataset(Arc::clone(&dataset))?;
        reader.open()?;

        Ok(Self {
            dataset,
            reader,
            mapper,
            job_id,
            test,
            records_skipped: 0,
        })
    }

    pub fn dataset(&self) -> &Arc<FileDataset> {
        &self.dataset
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn is_test(&self) -> bool {
        self.test
    }

    pub fn line_count(&self) -> usize {
        self.reader.line_count()
    }

    /// Lines the tokenizer skipped (blank lines and tolerated footers).
    pub fn records_skipped(&self) -> usize {
        self.records_skipped
    }

    /// Next mapped record, or `None` once the input is exhausted.
    ///
    /// Mapping failures are reported as [`IngestError::FlatFileParse`] carrying the line number and
    /// the raw record.
    pub fn read(&mut self) -> IngestResult<Option<Record>> {
        loop {
            let Some(line) = self.reader.read()? else {
                return Ok(None);
            };
            match self.mapper.map_line(&line) {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {
                    self.records_skipped += 1;
                    tracing::debug!(line_number = self.reader.line_count(), "record skipped");
                }
                Err(e) => return Err(IngestError::parse_at(self.reader.line_count(), line, e)),
            }
        }
    }

    pub fn close(&mut self) {
        self.reader.close();
    }
}

impl fmt::Debug for DatasetReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetReader")
            .field("dataset", &self.dataset.name)
            .field("reader", &self.reader)
            .field("job_id", &self.job_id)
            .field("test", &self.test)
            .finish()
    }
}
