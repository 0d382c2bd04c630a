//! Record processing.
//!
//! The processing layer turns mapped records ([`crate::types::Record`]) into
//! [`crate::types::CustomerEvent`]s. See [`Transformer`] for the rules.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use metadata_ingest::processing::Transformer;
//! use metadata_ingest::types::{ColumnRole, FileColumn, FileDataset, Record, Value};
//!
//! let dataset = FileDataset::new(
//!     "logins",
//!     ",",
//!     vec![
//!         FileColumn::new("customer", 1, "STRING").with_role(ColumnRole::CustomerId),
//!         FileColumn::new("event", 2, "INTEGER").with_role(ColumnRole::EventType),
//!     ],
//! );
//! let transformer = Transformer::new(Arc::new(dataset), Some(1)).unwrap();
//!
//! let mut record = Record::new();
//! record.insert("customer".to_string(), Value::Utf8("c-42".to_string()));
//! record.insert("event".to_string(), Value::Int64(3));
//!
//! let events = transformer.transform(&record).unwrap();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].event_type_id, 3);
//! ```

pub mod transform;

pub use transform::Transformer;
