//! Reading side of the pipeline.
//!
//! Leaves first:
//!
//! - [`scanner`]: input resources and row splitting on a (multi-character) row delimiter
//! - [`separator`]: record-separator policies gluing rows into logical records
//! - [`record_reader`]: logical records with header skip, comments and cancellation
//! - [`tokenizer`]: quote- and XML-aware splitting of a record into fields
//! - [`line_mapper`]: fields to a typed [`crate::types::Record`]
//! - [`dataset_reader`]: all of the above configured from the dataset the metadata provider resolves
//! - [`job`]: reader → transformer → writer for one file, reporting to a [`JobObserver`]

pub mod dataset_reader;
pub mod job;
pub mod line_mapper;
pub mod observability;
pub mod record_reader;
pub mod scanner;
pub mod separator;
pub mod tokenizer;

pub use dataset_reader::{DatasetReader, DatasetReaderOptions};
pub use job::{Job, JobOptions};
pub use line_mapper::{FieldSetMapper, LineMapper};
pub use observability::{
    CompositeObserver, FileObserver, JobContext, JobObserver, JobStats, Severity, TracingObserver,
    severity_for_error,
};
pub use record_reader::{CancellationToken, ReaderOptions, RecordReader};
pub use scanner::{Charset, InputResource, RowScanner};
pub use separator::{DefaultRecordSeparatorPolicy, RecordSeparatorPolicy, SimpleRecordSeparatorPolicy};
pub use tokenizer::{DelimitedLineTokenizer, FieldSet};
