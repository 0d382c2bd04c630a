use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Error type returned by every stage of the pipeline.
///
/// This is a single error enum shared by the reader, line mapper, transformer and writers.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Underlying I/O error (e.g. output directory missing, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The relational store rejected a statement or a batch.
    #[error("database failure: {0}")]
    Database(#[from] rusqlite::Error),

    /// Catalog or configuration JSON could not be decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A property side-file could not be parsed while bulk loading it.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A read was attempted before `open` (or after `close`).
    #[error("reader not open: {0}")]
    ReaderNotOpen(String),

    /// Strict-mode open of a missing or unreadable resource.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// A logical record could not be read or mapped.
    #[error("parsing error at line {line_number}: {message} (input=[{line}])")]
    FlatFileParse {
        line_number: usize,
        line: String,
        message: String,
        #[source]
        source: Option<Box<IngestError>>,
    },

    /// The input stream failed. Raised once; later reads report exhaustion.
    #[error("unable to read from resource [{resource}] at line {line_number}: {source}")]
    NonTransientFlatFile {
        resource: String,
        line_number: usize,
        #[source]
        source: std::io::Error,
    },

    /// A tokenized line did not have the declared number of columns.
    #[error("incorrect token count: expected {expected}, actual {actual}")]
    IncorrectTokenCount { expected: usize, actual: usize },

    /// A value could not be converted to the column's declared type.
    #[error("invalid format for column '{column}': {message} (raw='{raw}')")]
    InvalidFormat {
        column: String,
        raw: String,
        message: String,
    },

    /// The metadata catalog has no dataset for the input file.
    #[error("no dataset found for '{filename}'")]
    MissingDataset { filename: String },

    /// The dataset definition cannot drive the pipeline (no delimiter, no customer id column, ...).
    #[error("invalid dataset '{dataset}': {message}")]
    InvalidDataset { dataset: String, message: String },

    /// Pipeline configuration is unusable.
    #[error("config error: {message}")]
    Config { message: String },
}

impl IngestError {
    /// Wrap a line-mapping failure with the position and raw text of the offending record.
    pub fn parse_at(line_number: usize, line: impl Into<String>, source: IngestError) -> Self {
        Self::FlatFileParse {
            line_number,
            line: line.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// The innermost pipeline error, looking through `FlatFileParse` wrappers.
    pub fn root_cause(&self) -> &IngestError {
        match self {
            Self::FlatFileParse {
                source: Some(inner), ..
            } => inner.root_cause(),
            other => other,
        }
    }
}
