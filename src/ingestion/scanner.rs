//! Input resources and a row scanner that splits a byte stream on a (multi-character) row
//! delimiter.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const READ_CHUNK: usize = 8 * 1024;

/// Character set of an input file. Detection is out of scope; the caller supplies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    #[default]
    #[serde(alias = "utf-8")]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    #[serde(alias = "iso-8859-1")]
    Latin1,
}

impl Charset {
    fn encode(self, text: &str) -> io::Result<Vec<u8>> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("delimiter character {c:?} is not representable in latin1"),
                        )
                    })
                })
                .collect(),
        }
    }

    fn decode(self, bytes: Vec<u8>) -> io::Result<String> {
        match self {
            Self::Utf8 => {
                String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            }
            Self::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

/// Where records are read from.
#[derive(Clone)]
pub enum InputResource {
    /// A file on disk.
    Path(PathBuf),
    /// In-memory content, mostly for tests and pre-fetched payloads.
    Memory { filename: String, bytes: Vec<u8> },
}

impl InputResource {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    pub fn from_content(filename: impl Into<String>, content: &str) -> Self {
        Self::Memory {
            filename: filename.into(),
            bytes: content.as_bytes().to_vec(),
        }
    }

    /// Final path component (or the in-memory name), used to resolve the dataset.
    pub fn filename(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Memory { filename, .. } => filename.clone(),
        }
    }

    /// Absolute path when the resource lives on disk.
    pub fn absolute_path(&self) -> Option<PathBuf> {
        match self {
            Self::Path(path) => std::path::absolute(path).ok(),
            Self::Memory { .. } => None,
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            Self::Path(path) => path.is_file(),
            Self::Memory { .. } => true,
        }
    }

    pub fn is_readable(&self) -> bool {
        match self {
            Self::Path(path) => File::open(path).is_ok(),
            Self::Memory { .. } => true,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Path(path) => format!("file [{}]", path.display()),
            Self::Memory { filename, .. } => format!("memory [{filename}]"),
        }
    }

    pub(crate) fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            Self::Path(path) => Ok(Box::new(File::open(path)?)),
            Self::Memory { bytes, .. } => Ok(Box::new(Cursor::new(bytes.clone()))),
        }
    }
}

impl fmt::Debug for InputResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Memory { filename, bytes } => f
                .debug_struct("Memory")
                .field("filename", filename)
                .field("bytes_len", &bytes.len())
                .finish(),
        }
    }
}

impl fmt::Display for InputResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Yields rows separated by a delimiter. A trailing delimiter does not produce an empty final row.
pub struct RowScanner {
    inner: BufReader<Box<dyn Read + Send>>,
    delimiter: Vec<u8>,
    charset: Charset,
    buf: Vec<u8>,
    searched: usize,
    eof: bool,
}

impl RowScanner {
    pub fn new(inner: Box<dyn Read + Send>, row_delimiter: &str, charset: Charset) -> io::Result<Self> {
        if row_delimiter.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "row delimiter must not be empty",
            ));
        }
        Ok(Self {
            inner: BufReader::new(inner),
            delimiter: charset.encode(row_delimiter)?,
            charset,
            buf: Vec::new(),
            searched: 0,
            eof: false,
        })
    }

    /// Next row without its delimiter, or `None` once the input is exhausted.
    pub fn next_row(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.find_delimiter() {
                let rest = self.buf.split_off(pos + self.delimiter.len());
                let mut row = std::mem::replace(&mut self.buf, rest);
                row.truncate(pos);
                self.searched = 0;
                return self.charset.decode(row).map(Some);
            }
            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                self.searched = 0;
                return self.charset.decode(std::mem::take(&mut self.buf)).map(Some);
            }
            self.fill()?;
        }
    }

    fn find_delimiter(&mut self) -> Option<usize> {
        let dlen = self.delimiter.len();
        if self.buf.len() < dlen {
            return None;
        }
        let start = self.searched;
        let found = self.buf[start..]
            .windows(dlen)
            .position(|w| w == self.delimiter.as_slice())
            .map(|p| p + start);
        if found.is_none() {
            // The tail may hold a partial delimiter; rescan it after the next fill.
            self.searched = self.buf.len() + 1 - dlen;
        }
        found
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

impl fmt::Debug for RowScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowScanner")
            .field("delimiter", &self.delimiter)
            .field("charset", &self.charset)
            .field("buffered", &self.buf.len())
            .field("eof", &self.eof)
            .finish()
    }
}
