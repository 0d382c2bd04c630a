//! Bulk load of a property side-file into the `event_properties` table.

use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{Connection, params};
use serde::Deserialize;

use crate::error::{IngestError, IngestResult};

use super::property_file::TIMESTAMP_FORMAT;

/// Create `event_properties` if it is missing.
pub fn ensure_property_table(conn: &Connection) -> IngestResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS event_properties (
            customer_id_type_id INTEGER NOT NULL,
            customer_id TEXT NOT NULL,
            event_type_id INTEGER NOT NULL,
            event_ts TEXT NOT NULL,
            event_version INTEGER NOT NULL,
            property_type_id INTEGER NOT NULL,
            version INTEGER NOT NULL,
            value TEXT
        );
        ",
    )?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PropertyLine(i32, String, i32, String, i32, i32, i32, String);

/// Reads side-files produced by [`super::PropertyFileWriter`].
#[derive(Debug, Clone)]
pub struct PropertyFileLoader {
    delimiter: u8,
}

impl Default for PropertyFileLoader {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl PropertyFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Insert every line of `path` in one transaction; returns the number of rows loaded.
    pub fn load(&self, conn: &mut Connection, path: impl AsRef<Path>) -> IngestResult<usize> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter)
            .quote(b'"')
            .double_quote(true)
            .from_path(path)?;

        let tx = conn.transaction()?;
        let mut rows = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO event_properties (customer_id_type_id, customer_id, event_type_id, event_ts, \
                 event_version, property_type_id, version, value) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (idx, line) in reader.deserialize::<PropertyLine>().enumerate() {
                let PropertyLine(cit, customer_id, event_type_id, ts, event_version, property_type_id, version, value) =
                    line?;
                let event_ts = NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).map_err(|e| {
                    IngestError::InvalidFormat {
                        column: "event_ts".to_string(),
                        raw: ts.clone(),
                        message: format!("line {}: {e}", idx + 1),
                    }
                })?;
                stmt.execute(params![
                    cit,
                    customer_id,
                    event_type_id,
                    event_ts,
                    event_version,
                    property_type_id,
                    version,
                    value
                ])?;
                rows += 1;
            }
        }
        tx.commit()?;
        tracing::info!(path = %path.display(), rows, "property file loaded");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_quoted_and_raw_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.filepart");
        fs::write(
            &path,
            "1,c1,9,2015-05-03 10:00:00.000,1,4,1,12\n1,c1,9,2015-05-03 10:00:00.000,1,5,1,\"say \"\"hi\"\", ok\"\n",
        )
        .unwrap();

        let mut conn = Connection::open_in_memory().unwrap();
        ensure_property_table(&conn).unwrap();
        assert_eq!(PropertyFileLoader::new().load(&mut conn, &path).unwrap(), 2);

        let values: Vec<String> = conn
            .prepare("SELECT value FROM event_properties ORDER BY property_type_id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(values, vec!["12".to_string(), "say \"hi\", ok".to_string()]);
    }

    #[test]
    fn bad_timestamp_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.filepart");
        fs::write(&path, "1,c,9,2015-05-03 10:00:00.000,1,4,1,1\n1,c,9,noon,1,4,1,2\n").unwrap();

        let mut conn = Connection::open_in_memory().unwrap();
        ensure_property_table(&conn).unwrap();
        let err = PropertyFileLoader::new().load(&mut conn, &path).unwrap_err();
        assert!(matches!(err, IngestError::InvalidFormat { .. }));
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM event_properties", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }
}
