//! `metadata-ingest` loads delimited flat files into customer events. The layout of each file
//! (delimiters, quoting, header/footer rows, column types) is not hard-coded: it is looked up in a
//! metadata catalog by file name.
//!
//! The pipeline has three stages connected by direct calls:
//!
//! 1. [`ingestion::DatasetReader`]: resolves the [`types::FileDataset`] for the input, reads
//!    logical records (multi-character row delimiters, header skip, comments, quoted fields that
//!    span rows) and maps each to a typed [`types::Record`].
//! 2. [`processing::Transformer`]: turns a record into zero or more [`types::CustomerEvent`]s.
//! 3. A [`writer::EventWriter`]: [`writer::JdbcBatchWriter`] inserts into the production or test
//!    events table; [`writer::PropertyFileWriter`] writes a side-file for bulk load.
//!
//! [`ingestion::Job`] drives the three stages for one file; [`execution::ParallelRunner`] runs
//! jobs for many files on a thread pool.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use metadata_ingest::ingestion::{InputResource, Job, JobOptions};
//! use metadata_ingest::metadata::{Catalog, CatalogMetadataProvider, MetadataProvider};
//! use metadata_ingest::writer::{EventTables, JdbcBatchWriter, ensure_event_tables};
//!
//! # fn main() -> Result<(), metadata_ingest::IngestError> {
//! let catalog = Catalog::from_json(
//!     r#"{"datasets": [{
//!         "name": "logins.csv",
//!         "column_delimiter": "|",
//!         "header_row": true,
//!         "columns": [
//!             {"name": "customer", "column_index": 1, "value_type": "STRING", "role": {"kind": "customer_id"}},
//!             {"name": "event", "column_index": 2, "value_type": "INTEGER", "role": {"kind": "event_type"}}
//!         ]
//!     }]}"#,
//! )?;
//! let provider: Arc<dyn MetadataProvider> = Arc::new(CatalogMetadataProvider::new(catalog));
//!
//! let conn = rusqlite::Connection::open_in_memory()?;
//! ensure_event_tables(&conn, &EventTables::default())?;
//! let writer = JdbcBatchWriter::new(conn, Arc::clone(&provider));
//!
//! let mut job = Job::new(provider, writer, JobOptions::default());
//! let stats = job.run(InputResource::from_content("logins.csv", "customer|event\nc-1|3\nc-2|4\n"))?;
//! assert_eq!(stats.events_written, 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: tokenizer, record reader, line mapper, dataset reader, job
//! - [`processing`]: record → event transformation
//! - [`writer`]: database and side-file writers, side-file loader
//! - [`metadata`]: catalog lookup and per-job state
//! - [`execution`]: multi-file runner
//! - [`config`], [`logging`]: ambient setup
//! - [`error`]: the shared error type

pub mod config;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod logging;
pub mod metadata;
pub mod processing;
pub mod types;
pub mod writer;

pub use error::{IngestError, IngestResult};
