//! Core data model: catalog datasets, typed values and customer events.
//!
//! A [`FileDataset`] describes the physical layout of one family of input files (delimiters,
//! quoting, header/footer rows, columns) and how each record maps onto [`CustomerEvent`]s.
//! Datasets are read-only once resolved and are shared as `Arc<FileDataset>`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Column value type as named in the catalog.
///
/// Names are matched case-insensitively; anything unrecognised is kept verbatim in
/// [`ValueType::Other`] and treated as a string by the line mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueType {
    Integer,
    String,
    Text,
    None,
    Other(String),
}

impl ValueType {
    /// Canonical catalog name.
    pub fn name(&self) -> &str {
        match self {
            Self::Integer => "INTEGER",
            Self::String => "STRING",
            Self::Text => "TEXT",
            Self::None => "NONE",
            Self::Other(name) => name,
        }
    }

    /// Character types are quoted when serialised into property strings and side-files.
    pub fn is_character(&self) -> bool {
        matches!(self, Self::String | Self::Text | Self::None)
    }
}

impl From<String> for ValueType {
    fn from(name: String) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "INTEGER" => Self::Integer,
            "STRING" => Self::String,
            "TEXT" => Self::Text,
            "NONE" => Self::None,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for ValueType {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<ValueType> for String {
    fn from(value_type: ValueType) -> Self {
        value_type.name().to_string()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic role of a column when building events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnRole {
    /// The customer key.
    CustomerId,
    /// Per-row customer id type (overrides [`FileDataset::customer_id_type_id`]).
    CustomerIdType,
    /// Integer event type id.
    EventType,
    /// The event's value.
    EventValue,
    /// Event timestamp, parsed with [`FileDataset::timestamp_format`].
    Timestamp,
    /// A named property attached to every event built from the row.
    Property { property_type_id: i32 },
    /// Identifies the originating source record.
    SourceKey,
}

/// One column of a [`FileDataset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileColumn {
    pub name: String,
    /// 1-based position of the column in a record.
    pub column_index: usize,
    pub value_type: ValueType,
    #[serde(default)]
    pub role: Option<ColumnRole>,
}

impl FileColumn {
    pub fn new(name: impl Into<String>, column_index: usize, value_type: impl Into<ValueType>) -> Self {
        Self {
            name: name.into(),
            column_index,
            value_type: value_type.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: ColumnRole) -> Self {
        self.role = Some(role);
        self
    }
}

/// Maps a column onto a property type for an [`EventTypeRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRule {
    pub column: String,
    pub property_type_id: i32,
}

/// Catalog rule producing at most one event per record.
///
/// The event type is either fixed (`event_type_id`) or read from `event_type_column`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeRule {
    #[serde(default)]
    pub event_type_id: Option<i32>,
    #[serde(default)]
    pub event_type_column: Option<String>,
    #[serde(default)]
    pub value_column: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyRule>,
    /// Emit nothing for a record whose value column is blank.
    #[serde(default)]
    pub skip_if_empty: bool,
}

fn default_row_delimiter() -> String {
    "\n".to_string()
}

fn default_text_qualifier() -> char {
    '"'
}

fn default_customer_id_type_id() -> i32 {
    1
}

fn default_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

/// Physical layout and event mapping for one family of input files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDataset {
    pub name: String,
    /// Glob matched against incoming file names when the name alone does not resolve.
    #[serde(default)]
    pub file_pattern: Option<String>,
    pub column_delimiter: String,
    #[serde(default = "default_row_delimiter")]
    pub row_delimiter: String,
    #[serde(default = "default_text_qualifier")]
    pub text_qualifier: char,
    #[serde(default)]
    pub header_row: bool,
    #[serde(default)]
    pub footer_row: bool,
    pub columns: Vec<FileColumn>,
    #[serde(default = "default_customer_id_type_id")]
    pub customer_id_type_id: i32,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    #[serde(default)]
    pub event_types: Vec<EventTypeRule>,
}

impl FileDataset {
    /// Create a dataset with default row delimiter (`\n`), qualifier (`"`) and no event rules.
    pub fn new(name: impl Into<String>, column_delimiter: impl Into<String>, columns: Vec<FileColumn>) -> Self {
        Self {
            name: name.into(),
            file_pattern: None,
            column_delimiter: column_delimiter.into(),
            row_delimiter: default_row_delimiter(),
            text_qualifier: default_text_qualifier(),
            header_row: false,
            footer_row: false,
            columns,
            customer_id_type_id: default_customer_id_type_id(),
            timestamp_format: default_timestamp_format(),
            event_types: Vec::new(),
        }
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Returns the column with `name`, if declared.
    pub fn column(&self, name: &str) -> Option<&FileColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// First column carrying `role`.
    pub fn column_with_role(&self, role: &ColumnRole) -> Option<&FileColumn> {
        self.columns.iter().find(|c| c.role.as_ref() == Some(role))
    }
}

/// A single typed value produced by the line mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null or an all-whitespace string.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Int64(_) => false,
            Self::Utf8(s) => s.trim().is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(s) => f.write_str(s),
        }
    }
}

/// One mapped input record: column name to typed value.
pub type Record = BTreeMap<String, Value>;

/// A property attached to a [`CustomerEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerEventProperty {
    pub property_type_id: i32,
    /// `None` is treated like a character type when quoting.
    pub value_type: Option<ValueType>,
    pub value: Value,
}

impl CustomerEventProperty {
    pub fn new(property_type_id: i32, value_type: Option<ValueType>, value: Value) -> Self {
        Self {
            property_type_id,
            value_type,
            value,
        }
    }
}

/// An event emitted by the transformer for one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerEvent {
    pub customer_id_type_id: i32,
    pub customer_id: String,
    pub event_type_id: i32,
    /// `None` adopts the writer's per-run `created` timestamp.
    pub ts: Option<NaiveDateTime>,
    pub value: Value,
    pub source_key: String,
    pub job_id: Option<i64>,
    pub properties: Vec<CustomerEventProperty>,
}
