//! Delimited line tokenizer driven by a [`FileDataset`].
//!
//! Splits one logical record into fields on the dataset's column delimiter (which may be several
//! characters long), honouring the text qualifier and XML fragments embedded in fields.
//!
//! Rules:
//!
//! - the qualifier toggles the quoted state, except in an XML fragment whose `<` and `>` do not
//!   balance between the field start and the end of the line, where it is literal;
//! - a field whose first non-whitespace, non-qualifier character is `<` is an XML fragment;
//! - delimiter matches never overlap the previous match; in a run of a repeated-character
//!   delimiter the surplus characters stay with the preceding field;
//! - a line ending with the delimiter yields a trailing empty field;
//! - tokens are trimmed, then enclosing qualifiers are removed and doubled qualifiers collapsed.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{IngestError, IngestResult};
use crate::types::FileDataset;

const START_XML_CHAR: char = '<';
const END_XML_CHAR: char = '>';

/// Ordered raw tokens of one record with the parallel column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    tokens: Vec<String>,
    names: Vec<String>,
}

impl FieldSet {
    pub fn new(tokens: Vec<String>, names: Vec<String>) -> Self {
        Self { tokens, names }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Raw token at a 0-based index.
    pub fn read_string(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// Raw token for a column name.
    pub fn read_string_by_name(&self, name: &str) -> Option<&str> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.read_string(idx)
    }

    /// Token at a 0-based index parsed as an integer. Blank tokens yield `Ok(None)`.
    pub fn read_int(&self, index: usize) -> IngestResult<Option<i64>> {
        let Some(raw) = self.read_string(index) else {
            return Ok(None);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed.parse::<i64>().map(Some).map_err(|e| IngestError::InvalidFormat {
            column: self
                .names
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("#{}", index + 1)),
            raw: raw.to_string(),
            message: e.to_string(),
        })
    }
}

/// Tokenizer for one dataset's column delimiter and text qualifier.
#[derive(Debug, Clone)]
pub struct DelimitedLineTokenizer {
    dataset: Arc<FileDataset>,
    delimiter: Vec<char>,
    quote: char,
    names: Vec<String>,
    included_fields: Option<BTreeSet<usize>>,
}

impl DelimitedLineTokenizer {
    /// Build a tokenizer from the dataset's delimiter, qualifier and column names.
    pub fn new(dataset: Arc<FileDataset>) -> IngestResult<Self> {
        if dataset.column_delimiter.is_empty() {
            return Err(IngestError::InvalidDataset {
                dataset: dataset.name.clone(),
                message: "column delimiter must not be empty".to_string(),
            });
        }
        let delimiter = dataset.column_delimiter.chars().collect();
        let quote = dataset.text_qualifier;
        let names = positional_names(&dataset);
        Ok(Self {
            dataset,
            delimiter,
            quote,
            names,
            included_fields: None,
        })
    }

    /// Override the dataset's text qualifier.
    pub fn with_quote_character(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    /// Keep only the fields at these 0-based positions.
    pub fn with_included_fields(mut self, fields: impl IntoIterator<Item = usize>) -> Self {
        self.included_fields = Some(fields.into_iter().collect());
        self
    }

    pub fn dataset(&self) -> &Arc<FileDataset> {
        &self.dataset
    }

    /// Tokenize `line` and check the token count against the declared columns.
    ///
    /// Returns `Ok(None)` for a blank line, and for a mis-sized line when the dataset declares a
    /// footer row.
    pub fn tokenize(&self, line: &str) -> IngestResult<Option<FieldSet>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let tokens = self.split(line);
        let expected = self.names.len();
        if tokens.len() != expected {
            if self.dataset.footer_row {
                tracing::debug!(
                    dataset = %self.dataset.name,
                    expected,
                    actual = tokens.len(),
                    "skipping mis-sized row as footer"
                );
                return Ok(None);
            }
            return Err(IngestError::IncorrectTokenCount {
                expected,
                actual: tokens.len(),
            });
        }
        Ok(Some(FieldSet::new(tokens, self.names.clone())))
    }

    /// Split `line` into tokens without any count check.
    pub fn split(&self, line: &str) -> Vec<String> {
        let chars: Vec<char> = line.chars().collect();
        let length = chars.len();
        let dlen = self.delimiter.len();

        let xml_balance = suffix_xml_balance(&chars);
        let runs = self.delimiter_runs(&chars);

        let mut tokens = Vec::new();
        let mut in_quoted = false;
        let mut in_token_content = false;
        let mut in_xml = false;
        let mut outside_xml_tag = true;
        let mut last_cut = 0usize;
        let mut field_count = 0usize;
        let mut end_last_delimiter: Option<usize> = None;

        for i in 0..length {
            let current = chars[i];
            let is_end = i == length - 1;
            let is_delimiter = self.is_delimiter(&runs, i, end_last_delimiter);
            let is_quote = current == self.quote;

            if !in_token_content && !is_quote && !is_whitespace(current) {
                if current == START_XML_CHAR {
                    in_xml = true;
                }
                in_token_content = true;
            }
            if in_xml {
                outside_xml_tag = xml_balance[last_cut] == 0;
            }

            if (is_delimiter && !in_quoted) || is_end {
                end_last_delimiter = Some(i);
                let end = if is_end && is_delimiter {
                    length - dlen
                } else if is_end {
                    length
                } else {
                    i + 1 - dlen
                };

                if self.is_included(field_count) {
                    let raw: String = chars[last_cut..end.max(last_cut)].iter().collect();
                    tokens.push(self.maybe_strip_quotes(&raw));
                }
                field_count += 1;

                if is_end && is_delimiter {
                    if self.is_included(field_count) {
                        tokens.push(String::new());
                    }
                    field_count += 1;
                }

                last_cut = i + 1;
                in_token_content = false;
                in_xml = false;
                outside_xml_tag = true;
            } else if is_quote && outside_xml_tag {
                in_quoted = !in_quoted;
            }
        }

        tokens
    }

    fn is_included(&self, field: usize) -> bool {
        self.included_fields
            .as_ref()
            .is_none_or(|fields| fields.contains(&field))
    }

    fn ends_with_delimiter(&self, chars: &[char], i: usize) -> bool {
        let dlen = self.delimiter.len();
        i + 1 >= dlen && chars[i + 1 - dlen..=i] == self.delimiter[..]
    }

    /// For each position, the number of consecutive delimiter match ends starting there.
    fn delimiter_runs(&self, chars: &[char]) -> Vec<usize> {
        let mut runs = vec![0; chars.len() + 1];
        for i in (0..chars.len()).rev() {
            if self.ends_with_delimiter(chars, i) {
                runs[i] = runs[i + 1] + 1;
            }
        }
        runs
    }

    fn is_delimiter(&self, runs: &[usize], i: usize, end_last_delimiter: Option<usize>) -> bool {
        let dlen = self.delimiter.len();
        let far_enough = end_last_delimiter.is_none_or(|end| i - end >= dlen);
        if !far_enough || runs[i] == 0 {
            return false;
        }
        // A repeated-character delimiter run is cut from the right so leftover characters belong
        // to the preceding field.
        dlen == 1 || (runs[i] - 1) % dlen == 0
    }

    fn maybe_strip_quotes(&self, raw: &str) -> String {
        let value = raw.trim();
        if !(value.starts_with(self.quote) && value.ends_with(self.quote)) {
            return value.to_string();
        }
        let mut chars = value.chars();
        chars.next();
        chars.next_back();
        let inner = chars.as_str();
        let doubled: String = [self.quote, self.quote].iter().collect();
        inner.replace(&doubled, &self.quote.to_string())
    }
}

/// Column names ordered by `column_index` when the indexes cover every position, otherwise in
/// declaration order.
fn positional_names(dataset: &FileDataset) -> Vec<String> {
    let mut positional: Vec<Option<String>> = vec![None; dataset.columns.len()];
    for column in &dataset.columns {
        if let Some(slot) = column
            .column_index
            .checked_sub(1)
            .and_then(|i| positional.get_mut(i))
        {
            *slot = Some(column.name.clone());
        }
    }
    if positional.iter().all(Option::is_some) {
        positional.into_iter().flatten().collect()
    } else {
        dataset.column_names()
    }
}

/// `<` count minus `>` count of `chars[k..]` for every `k`, including the empty suffix.
fn suffix_xml_balance(chars: &[char]) -> Vec<isize> {
    let mut balance = vec![0; chars.len() + 1];
    for (i, ch) in chars.iter().enumerate().rev() {
        balance[i] = balance[i + 1]
            + match *ch {
                START_XML_CHAR => 1,
                END_XML_CHAR => -1,
                _ => 0,
            };
    }
    balance
}

/// Space, tab, carriage return, newline, form feed.
fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n' | '\u{000C}')
}
