//! Batched event inserts over a SQLite connection.

use std::fmt;
use std::sync::{Arc, LazyLock};

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};
use crate::metadata::MetadataProvider;
use crate::types::CustomerEvent;

use super::{EVENT_VERSION, EventWriter, non_empty, serialize_properties};

static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Destination tables for production and test runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventTables {
    pub production: String,
    pub test: String,
}

impl Default for EventTables {
    fn default() -> Self {
        Self {
            production: "events".to_string(),
            test: "events_test".to_string(),
        }
    }
}

impl EventTables {
    /// Reject names that are not plain (optionally schema-qualified) identifiers.
    pub fn validate(&self) -> IngestResult<()> {
        for name in [&self.production, &self.test] {
            if !TABLE_NAME.is_match(name) {
                return Err(IngestError::Config {
                    message: format!("invalid events table name '{name}'"),
                });
            }
        }
        Ok(())
    }

    pub fn for_mode(&self, test: bool) -> &str {
        if test { &self.test } else { &self.production }
    }
}

/// Create both event tables if they are missing.
pub fn ensure_event_tables(conn: &Connection, tables: &EventTables) -> IngestResult<()> {
    tables.validate()?;
    for table in [&tables.production, &tables.test] {
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {table} (
                customer_id_type_id INTEGER NOT NULL,
                customer_id TEXT NOT NULL,
                event_type_id INTEGER NOT NULL,
                event_ts TEXT NOT NULL,
                event_version INTEGER NOT NULL,
                event_property TEXT,
                source_key TEXT,
                job_id INTEGER,
                created_ts TEXT NOT NULL
            );
            "
        ))?;
    }
    Ok(())
}

/// Inserts every event of a chunk with one prepared statement inside one transaction.
///
/// Events without a timestamp get the writer's `created` time, fixed when the writer is built.
/// The table is chosen per chunk from the provider's test flag.
pub struct JdbcBatchWriter {
    conn: Connection,
    provider: Arc<dyn MetadataProvider>,
    tables: EventTables,
    created: NaiveDateTime,
}

impl JdbcBatchWriter {
    pub fn new(conn: Connection, provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            conn,
            provider,
            tables: EventTables::default(),
            created: Local::now().naive_local(),
        }
    }

    pub fn with_tables(mut self, tables: EventTables) -> IngestResult<Self> {
        tables.validate()?;
        self.tables = tables;
        Ok(self)
    }

    pub fn created(&self) -> NaiveDateTime {
        self.created
    }

    pub fn tables(&self) -> &EventTables {
        &self.tables
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

impl EventWriter for JdbcBatchWriter {
    fn write(&mut self, batch: &[Vec<CustomerEvent>]) -> IngestResult<usize> {
        let table = self.tables.for_mode(self.provider.is_test()).to_string();
        let sql = format!(
            "INSERT INTO {table} (customer_id_type_id, customer_id, event_type_id, event_ts, event_version, \
             event_property, source_key, job_id, created_ts) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        );

        let created = self.created;
        let tx = self.conn.transaction()?;
        let mut statements = 0;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for event in non_empty(batch) {
                tracing::trace!(
                    customer_id = %event.customer_id,
                    event_type_id = event.event_type_id,
                    "inserting event"
                );
                stmt.execute(params![
                    event.customer_id_type_id,
                    event.customer_id,
                    event.event_type_id,
                    event.ts.unwrap_or(created),
                    EVENT_VERSION,
                    serialize_properties(&event.properties),
                    event.source_key,
                    event.job_id.unwrap_or(0),
                    created,
                ])?;
                statements += 1;
            }
        }
        tx.commit()?;
        tracing::debug!(%table, statements, "batch inserted");
        Ok(statements)
    }
}

impl fmt::Debug for JdbcBatchWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdbcBatchWriter")
            .field("tables", &self.tables)
            .field("created", &self.created)
            .finish()
    }
}
