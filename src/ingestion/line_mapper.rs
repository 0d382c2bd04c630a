//! Line mapping: tokenizer + field-set mapper, parameterised by a [`FileDataset`].

use std::sync::Arc;

use crate::error::{IngestError, IngestResult};
use crate::types::{FileDataset, Record, Value, ValueType};

use super::tokenizer::{DelimitedLineTokenizer, FieldSet};

/// Converts a [`FieldSet`] into a [`Record`] using the dataset's declared column types.
#[derive(Debug, Clone)]
pub struct FieldSetMapper {
    dataset: Arc<FileDataset>,
}

impl FieldSetMapper {
    pub fn new(dataset: Arc<FileDataset>) -> Self {
        Self { dataset }
    }

    /// Reads every declared column by its 1-based index.
    ///
    /// `INTEGER` columns become [`Value::Int64`] (blank → [`Value::Null`]); every other type is kept
    /// as the token string. A column index beyond the tokens maps to [`Value::Null`].
    pub fn map_field_set(&self, field_set: &FieldSet) -> IngestResult<Record> {
        let mut record = Record::new();
        for column in &self.dataset.columns {
            let index = column.column_index.saturating_sub(1);
            let value = match column.value_type {
                ValueType::Integer => field_set
                    .read_int(index)
                    .map_err(|e| match e {
                        IngestError::InvalidFormat { raw, message, .. } => IngestError::InvalidFormat {
                            column: column.name.clone(),
                            raw,
                            message,
                        },
                        other => other,
                    })?
                    .map_or(Value::Null, Value::Int64),
                _ => field_set
                    .read_string(index)
                    .map_or(Value::Null, |s| Value::Utf8(s.to_string())),
            };
            record.insert(column.name.clone(), value);
        }
        Ok(record)
    }
}

/// Tokenizes a line and maps the result to a [`Record`].
#[derive(Debug, Clone)]
pub struct LineMapper {
    tokenizer: DelimitedLineTokenizer,
    field_set_mapper: FieldSetMapper,
}

impl LineMapper {
    pub fn new(tokenizer: DelimitedLineTokenizer, field_set_mapper: FieldSetMapper) -> Self {
        Self {
            tokenizer,
            field_set_mapper,
        }
    }

    /// Tokenizer and mapper both built from `dataset`.
    pub fn for_dataset(dataset: Arc<FileDataset>) -> IngestResult<Self> {
        let tokenizer = DelimitedLineTokenizer::new(Arc::clone(&dataset))?;
        Ok(Self::new(tokenizer, FieldSetMapper::new(dataset)))
    }

    pub fn tokenizer(&self) -> &DelimitedLineTokenizer {
        &self.tokenizer
    }

    /// `Ok(None)` when the tokenizer skips the line (blank, or a tolerated footer).
    pub fn map_line(&self, line: &str) -> IngestResult<Option<Record>> {
        match self.tokenizer.tokenize(line)? {
            Some(field_set) => self.field_set_mapper.map_field_set(&field_set).map(Some),
            None => Ok(None),
        }
    }
}
