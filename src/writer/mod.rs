//! Batch sinks for customer events.
//!
//! Both writers take one chunk at a time: each outer element is the list of events produced from
//! one input record. Empty lists are dropped before anything is persisted.
//!
//! - [`JdbcBatchWriter`]: parameterised inserts into the production or test events table.
//! - [`PropertyFileWriter`]: one delimited line per event property, for later bulk load with
//!   [`PropertyFileLoader`].

pub mod jdbc;
pub mod loader;
pub mod property_file;

use crate::error::IngestResult;
use crate::types::{CustomerEvent, CustomerEventProperty, ValueType};

pub use jdbc::{EventTables, JdbcBatchWriter, ensure_event_tables};
pub use loader::{PropertyFileLoader, ensure_property_table};
pub use property_file::{PropertyFileWriter, PropertyFileWriterOptions};

/// Constant `event_version` written with every event.
pub const EVENT_VERSION: i32 = 1;

/// Constant `property_version` written with every property.
pub const PROPERTY_VERSION: i32 = 1;

const QUOTE: char = '"';

/// Separator between side-file records.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Sink for chunks of events.
pub trait EventWriter: Send {
    /// Acquire the job's output once the input file and test mode are known.
    fn open(&mut self) -> IngestResult<()> {
        Ok(())
    }

    /// Persist one chunk; returns the number of statements or lines written.
    fn write(&mut self, batch: &[Vec<CustomerEvent>]) -> IngestResult<usize>;

    /// Flush and release any resources held for the job.
    fn close(&mut self) -> IngestResult<()> {
        Ok(())
    }
}

impl<W: EventWriter + ?Sized> EventWriter for Box<W> {
    fn open(&mut self) -> IngestResult<()> {
        (**self).open()
    }

    fn write(&mut self, batch: &[Vec<CustomerEvent>]) -> IngestResult<usize> {
        (**self).write(batch)
    }

    fn close(&mut self) -> IngestResult<()> {
        (**self).close()
    }
}

/// Character types, and properties without a type, are quoted.
pub fn should_quote_value(value_type: Option<&ValueType>) -> bool {
    value_type.is_none_or(ValueType::is_character)
}

/// Property value as written to the store: quoted per [`should_quote_value`], with embedded quotes
/// doubled.
pub fn format_property_value(property: &CustomerEventProperty) -> String {
    let raw = property.value.to_string();
    if should_quote_value(property.value_type.as_ref()) {
        let escaped = raw.replace(QUOTE, "\"\"");
        format!("{QUOTE}{escaped}{QUOTE}")
    } else {
        raw
    }
}

/// Comma-separated property values, or `None` for an event without properties.
pub fn serialize_properties(properties: &[CustomerEventProperty]) -> Option<String> {
    if properties.is_empty() {
        return None;
    }
    Some(
        properties
            .iter()
            .map(format_property_value)
            .collect::<Vec<_>>()
            .join(","),
    )
}

pub(crate) fn non_empty(batch: &[Vec<CustomerEvent>]) -> impl Iterator<Item = &CustomerEvent> {
    batch.iter().filter(|events| !events.is_empty()).flatten()
}
