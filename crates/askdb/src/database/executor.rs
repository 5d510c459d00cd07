//! Statement execution against the session connection.
//!
//! Driver errors never escape as faults: every failure is folded into
//! [`QueryResult::ExecutionFailure`] carrying the driver's own message.

use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::{debug, warn};

use super::network::CANCELLED_MESSAGE;
use super::result::{QueryResult, ScalarValue};
use super::statement::{is_blank_statement, is_multi_statement, manages_own_transaction, StatementKind};
use super::{CallGuard, DatabaseConnection};
use crate::metrics;

pub const MULTI_STATEMENT_MESSAGE: &str =
    "multiple statements are not supported; submit one statement per request";
pub const EMPTY_STATEMENT_MESSAGE: &str = "statement is empty";

#[derive(Debug, Clone)]
pub struct QueryExecutor {
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Execute one statement with the configured timeout.
    pub async fn execute(&self, connection: &DatabaseConnection, sql: &str) -> QueryResult {
        let kind = StatementKind::classify(sql);
        if let Some(rejected) = Self::reject(sql) {
            metrics::inc_statement(kind.as_str(), "rejected");
            return rejected;
        }

        let started = Instant::now();
        let statement = sql.to_string();
        let outcome = match connection.network() {
            Some(pool) => {
                pool.call(self.timeout, move |pool, guard| async move {
                    pool.run(&statement, kind, &guard).await
                })
                .await
            }
            None => {
                connection
                    .call(self.timeout, move |conn, guard| Self::run(conn, &statement, kind, guard))
                    .await
            }
        };
        let result = outcome.unwrap_or_else(|e| QueryResult::failure(e.to_string()));

        let status = if result.is_failure() { "error" } else { "ok" };
        metrics::inc_statement(kind.as_str(), status);
        debug!(
            "Executed {} statement in {:?}: {} rows, status {}",
            kind.as_str(),
            started.elapsed(),
            result.row_count(),
            status
        );
        if let QueryResult::ExecutionFailure { message } = &result {
            warn!("Statement failed: {}", message);
        }
        result
    }

    /// Execute on an already locked connection, without a timeout.
    pub fn execute_on(conn: &mut Connection, sql: &str) -> QueryResult {
        if let Some(rejected) = Self::reject(sql) {
            return rejected;
        }
        Self::run(conn, sql, StatementKind::classify(sql), &CallGuard::default())
    }

    fn reject(sql: &str) -> Option<QueryResult> {
        if is_blank_statement(sql) {
            Some(QueryResult::failure(EMPTY_STATEMENT_MESSAGE))
        } else if is_multi_statement(sql) {
            Some(QueryResult::failure(MULTI_STATEMENT_MESSAGE))
        } else {
            None
        }
    }

    fn run(conn: &mut Connection, sql: &str, kind: StatementKind, guard: &CallGuard) -> QueryResult {
        match kind {
            StatementKind::Read => Self::run_read(conn, sql).unwrap_or_else(|e| QueryResult::failure(e.to_string())),
            StatementKind::Write => Self::run_write(conn, sql, guard),
        }
    }

    // Statement and cursor are dropped at the end of each scope, on the error
    // path as well.
    fn run_read(conn: &Connection, sql: &str) -> rusqlite::Result<QueryResult> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = stmt.query([])?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(ScalarValue::from(row.get_ref(i)?));
            }
            collected.push(values);
        }

        Ok(QueryResult::Rows { columns, rows: collected })
    }

    // Writes run in their own transaction and only commit if the caller is
    // still waiting. Statements that manage transactions themselves, or run
    // inside one the user opened, go through as they are.
    fn run_write(conn: &Connection, sql: &str, guard: &CallGuard) -> QueryResult {
        if manages_own_transaction(sql) || !conn.is_autocommit() {
            return match Self::drain(conn, sql) {
                Ok(()) => QueryResult::empty(),
                Err(e) => QueryResult::failure(e.to_string()),
            };
        }

        if let Err(e) = conn.execute_batch("BEGIN") {
            return QueryResult::failure(e.to_string());
        }
        let result = match Self::drain(conn, sql) {
            Ok(()) if guard.begin_commit() => match conn.execute_batch("COMMIT") {
                Ok(()) => QueryResult::empty(),
                Err(e) => QueryResult::failure(e.to_string()),
            },
            Ok(()) => QueryResult::failure(CANCELLED_MESSAGE),
            Err(e) => QueryResult::failure(e.to_string()),
        };

        // Still open after a failed statement, a refused COMMIT or a cancel.
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                warn!("Rollback failed: {}", e);
            }
        }
        result
    }

    fn drain(conn: &Connection, sql: &str) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.raw_query();
        while rows.next()?.is_some() {}
        Ok(())
    }
}
