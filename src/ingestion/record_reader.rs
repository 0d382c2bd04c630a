//! Record reader: logical record strings from an [`InputResource`].
//!
//! The reader splits the input on the dataset's row delimiter, skips header rows and comment
//! rows, and glues rows into one logical record until its [`RecordSeparatorPolicy`] is satisfied.
//!
//! Lifecycle: `closed -> open -> exhausted -> closed`. Reading while closed fails with
//! [`IngestError::ReaderNotOpen`]. An I/O failure is reported once as
//! [`IngestError::NonTransientFlatFile`]; later reads report exhaustion.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

use super::scanner::{Charset, InputResource, RowScanner};
use super::separator::{RecordSeparatorPolicy, SimpleRecordSeparatorPolicy};

/// Cooperative cancellation flag shared between a worker and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options controlling how rows are turned into records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Row delimiter; may be several characters.
    pub row_delimiter: String,
    /// Logical records consumed before regular reading starts.
    pub lines_to_skip: usize,
    /// A record whose first row starts with one of these prefixes is skipped.
    pub comments: Vec<String>,
    /// Fail on open when the resource is missing or unreadable.
    pub strict: bool,
    pub charset: Charset,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            row_delimiter: "\n".to_string(),
            lines_to_skip: 0,
            comments: vec!["#".to_string()],
            strict: true,
            charset: Charset::Utf8,
        }
    }
}

type SkippedLinesCallback = Box<dyn FnMut(&str) + Send>;

/// Reads logical records from one input resource.
pub struct RecordReader {
    resource: InputResource,
    options: ReaderOptions,
    policy: Box<dyn RecordSeparatorPolicy>,
    skipped_lines_callback: Option<SkippedLinesCallback>,
    cancellation: Option<CancellationToken>,
    scanner: Option<RowScanner>,
    line_count: usize,
    no_input: bool,
}

impl RecordReader {
    /// Create a closed reader using [`SimpleRecordSeparatorPolicy`].
    pub fn new(resource: InputResource, options: ReaderOptions) -> Self {
        Self {
            resource,
            options,
            policy: Box::new(SimpleRecordSeparatorPolicy),
            skipped_lines_callback: None,
            cancellation: None,
            scanner: None,
            line_count: 0,
            no_input: false,
        }
    }

    pub fn with_policy(mut self, policy: impl RecordSeparatorPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Receives each header record consumed by `lines_to_skip`.
    pub fn with_skipped_lines_callback(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.skipped_lines_callback = Some(Box::new(callback));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn resource(&self) -> &InputResource {
        &self.resource
    }

    /// Physical rows consumed so far, including header and comment rows.
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn is_open(&self) -> bool {
        self.scanner.is_some()
    }

    /// Open the resource and consume the header records.
    pub fn open(&mut self) -> IngestResult<()> {
        self.no_input = true;
        if !self.resource.exists() {
            if self.options.strict {
                return Err(IngestError::InvalidState {
                    message: format!(
                        "input resource must exist (reader is in 'strict' mode): {}",
                        self.resource
                    ),
                });
            }
            tracing::warn!(resource = %self.resource, "input resource does not exist");
            return Ok(());
        }
        if !self.resource.is_readable() {
            if self.options.strict {
                return Err(IngestError::InvalidState {
                    message: format!(
                        "input resource must be readable (reader is in 'strict' mode): {}",
                        self.resource
                    ),
                });
            }
            tracing::warn!(resource = %self.resource, "input resource is not readable");
            return Ok(());
        }

        let input = self.resource.open()?;
        self.scanner = Some(RowScanner::new(
            input,
            &self.options.row_delimiter,
            self.options.charset,
        )?);
        self.no_input = false;

        for _ in 0..self.options.lines_to_skip {
            let Some(line) = self.read_line()? else {
                break;
            };
            if let Some(callback) = self.skipped_lines_callback.as_mut() {
                callback(&line);
            }
        }
        tracing::debug!(
            resource = %self.resource,
            skipped = self.options.lines_to_skip,
            "reader opened"
        );
        Ok(())
    }

    /// Next logical record, or `None` when exhausted or cancelled.
    pub fn read(&mut self) -> IngestResult<Option<String>> {
        if self.no_input {
            return Ok(None);
        }
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            tracing::info!(resource = %self.resource, line = self.line_count, "read cancelled");
            self.scanner = None;
            self.no_input = true;
            return Ok(None);
        }
        let line = self.read_line()?;
        if line.is_none() {
            // Exhausted: release the file handle now rather than at close.
            self.scanner = None;
            self.no_input = true;
        }
        Ok(line)
    }

    /// Release the scanner and reset the line count.
    pub fn close(&mut self) {
        self.line_count = 0;
        self.scanner = None;
        self.no_input = false;
    }

    fn read_line(&mut self) -> IngestResult<Option<String>> {
        match self.next_logical_line() {
            Ok(line) => Ok(line),
            Err(ReadFailure::Io(source)) => {
                self.no_input = true;
                self.scanner = None;
                Err(IngestError::NonTransientFlatFile {
                    resource: self.resource.description(),
                    line_number: self.line_count,
                    source,
                })
            }
            Err(ReadFailure::Ingest(e)) => Err(e),
        }
    }

    fn next_logical_line(&mut self) -> Result<Option<String>, ReadFailure> {
        let line = loop {
            let Some(row) = self.next_row()? else {
                return Ok(None);
            };
            if !self.is_comment(&row) {
                break row;
            }
        };
        self.apply_record_separator_policy(line).map(Some)
    }

    fn next_row(&mut self) -> Result<Option<String>, ReadFailure> {
        let scanner = self.scanner.as_mut().ok_or_else(|| {
            ReadFailure::Ingest(IngestError::ReaderNotOpen(
                "reader must be open before it can be read".to_string(),
            ))
        })?;
        let row = scanner.next_row().map_err(ReadFailure::Io)?;
        if row.is_some() {
            self.line_count += 1;
        }
        Ok(row)
    }

    fn is_comment(&self, line: &str) -> bool {
        self.options
            .comments
            .iter()
            .any(|prefix| !prefix.is_empty() && line.starts_with(prefix.as_str()))
    }

    fn apply_record_separator_policy(&mut self, line: String) -> Result<String, ReadFailure> {
        let mut record = line;
        while !self.policy.is_end_of_record(&record) {
            let Some(next) = self.next_row()? else {
                if !record.trim().is_empty() {
                    return Err(ReadFailure::Ingest(IngestError::FlatFileParse {
                        line_number: self.line_count,
                        line: record,
                        message: "unexpected end of file before record complete".to_string(),
                        source: None,
                    }));
                }
                break;
            };
            record = self.policy.pre_process(&record) + &next;
        }
        Ok(self.policy.post_process(&record))
    }
}

impl fmt::Debug for RecordReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordReader")
            .field("resource", &self.resource)
            .field("options", &self.options)
            .field("open", &self.scanner.is_some())
            .field("line_count", &self.line_count)
            .field("no_input", &self.no_input)
            .finish()
    }
}

enum ReadFailure {
    Io(std::io::Error),
    Ingest(IngestError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::separator::DefaultRecordSeparatorPolicy;

    fn reader(content: &str, options: ReaderOptions) -> RecordReader {
        RecordReader::new(InputResource::from_content("input.csv", content), options)
    }

    fn read_all(reader: &mut RecordReader) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = reader.read().unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn read_before_open_is_rejected() {
        let mut r = reader("a\n", ReaderOptions::default());
        assert!(matches!(r.read(), Err(IngestError::ReaderNotOpen(_))));
    }

    #[test]
    fn comment_rows_are_skipped_but_counted() {
        let mut r = reader("#c1\na\n#c2\nb\n", ReaderOptions::default());
        r.open().unwrap();
        assert_eq!(read_all(&mut r), vec!["a", "b"]);
        assert_eq!(r.line_count(), 4);
    }

    #[test]
    fn header_records_go_to_the_callback() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut r = reader(
            "h1\nh2\nd1\n",
            ReaderOptions {
                lines_to_skip: 2,
                ..Default::default()
            },
        )
        .with_skipped_lines_callback(move |line| sink.lock().unwrap().push(line.to_string()));
        r.open().unwrap();
        assert_eq!(read_all(&mut r), vec!["d1"]);
        assert_eq!(*seen.lock().unwrap(), vec!["h1", "h2"]);
    }

    #[test]
    fn policy_glues_rows_and_restores_the_delimiter() {
        let mut r = reader("1,\"multi\nline\",x\n2,y\n", ReaderOptions::default())
            .with_policy(DefaultRecordSeparatorPolicy::new('"', "\n"));
        r.open().unwrap();
        assert_eq!(read_all(&mut r), vec!["1,\"multi\nline\",x", "2,y"]);
        assert_eq!(r.line_count(), 3);
    }

    #[test]
    fn continuation_rows_never_match_the_comment_rule() {
        let mut r = reader("1,\"a\n#not a comment\",x\n", ReaderOptions::default())
            .with_policy(DefaultRecordSeparatorPolicy::new('"', "\n"));
        r.open().unwrap();
        assert_eq!(read_all(&mut r), vec!["1,\"a\n#not a comment\",x"]);
    }

    #[test]
    fn unterminated_record_at_eof_is_a_parse_error() {
        let mut r = reader("1,\"open\n", ReaderOptions::default())
            .with_policy(DefaultRecordSeparatorPolicy::default());
        r.open().unwrap();
        let err = r.read().unwrap_err();
        assert!(matches!(err, IngestError::FlatFileParse { line_number: 1, .. }));
    }

    #[test]
    fn missing_resource_in_lenient_mode_is_exhausted() {
        let mut r = RecordReader::new(
            InputResource::from_path("/definitely/not/here.csv"),
            ReaderOptions {
                strict: false,
                ..Default::default()
            },
        );
        r.open().unwrap();
        assert_eq!(r.read().unwrap(), None);
    }

    #[test]
    fn missing_resource_in_strict_mode_is_invalid_state() {
        let mut r = RecordReader::new(
            InputResource::from_path("/definitely/not/here.csv"),
            ReaderOptions::default(),
        );
        assert!(matches!(r.open(), Err(IngestError::InvalidState { .. })));
    }

    #[test]
    fn io_failure_is_reported_once() {
        let mut r = RecordReader::new(
            InputResource::Memory {
                filename: "bad.csv".to_string(),
                bytes: b"ok\n\xff\nmore\n".to_vec(),
            },
            ReaderOptions::default(),
        );
        r.open().unwrap();
        assert_eq!(r.read().unwrap().as_deref(), Some("ok"));
        assert!(matches!(r.read(), Err(IngestError::NonTransientFlatFile { .. })));
        assert_eq!(r.read().unwrap(), None);
    }

    #[test]
    fn cancellation_stops_between_records() {
        let token = CancellationToken::new();
        let mut r = reader("a\nb\nc\n", ReaderOptions::default()).with_cancellation(token.clone());
        r.open().unwrap();
        assert_eq!(r.read().unwrap().as_deref(), Some("a"));
        token.cancel();
        assert_eq!(r.read().unwrap(), None);
        assert!(!r.is_open());
    }

    #[test]
    fn close_resets_line_count_and_rejects_reads() {
        let mut r = reader("a\nb\n", ReaderOptions::default());
        r.open().unwrap();
        r.read().unwrap();
        r.close();
        assert_eq!(r.line_count(), 0);
        assert!(matches!(r.read(), Err(IngestError::ReaderNotOpen(_))));
    }
}
