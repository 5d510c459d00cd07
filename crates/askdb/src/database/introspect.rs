//! Schema introspection - renders the live table/column layout as prompt text.

use std::fmt;
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use super::DatabaseConnection;
use crate::error::{AssistantError, Result};

/// One table and its columns in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

/// Snapshot of every user table. Never cached: each request re-reads the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescription {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// `- table(col1, col2)` per line, no trailing newline, empty for no tables.
impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, table) in self.tables.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "- {}({})", table.name, table.columns.join(", "))?;
        }
        Ok(())
    }
}

/// Reads table and column metadata from the connected database.
#[derive(Debug, Clone)]
pub struct SchemaIntrospector {
    timeout: Duration,
}

impl SchemaIntrospector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Describe the schema of `connection` as it is right now.
    pub async fn describe_schema(&self, connection: &DatabaseConnection) -> Result<SchemaDescription> {
        let schema = match connection.network() {
            Some(pool) => pool
                .call(self.timeout, |pool, _| async move { pool.read_schema().await })
                .await
                .map_err(|e| AssistantError::SchemaIntrospection(e.to_string()))?
                .map_err(|e| AssistantError::SchemaIntrospection(e.to_string()))?,
            None => connection
                .call(self.timeout, |conn, _| Self::read_schema(conn))
                .await
                .map_err(|e| AssistantError::SchemaIntrospection(e.to_string()))?
                .map_err(|e| AssistantError::SchemaIntrospection(e.to_string()))?,
        };

        debug!("Introspected {} tables", schema.tables.len());
        Ok(schema)
    }

    /// Catalog walk on an already locked connection.
    pub fn read_schema(conn: &Connection) -> rusqlite::Result<SchemaDescription> {
        let table_names: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY rowid",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            names
        };

        let mut column_stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let mut tables = Vec::with_capacity(table_names.len());

        for name in table_names {
            let columns = column_stmt
                .query_map([&name], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            tables.push(TableSchema { name, columns });
        }

        Ok(SchemaDescription { tables })
    }
}
