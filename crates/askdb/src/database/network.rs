//! MySQL and PostgreSQL targets, reached through a small sqlx pool.
//!
//! Statements go over each server's plain-text query protocol, so every cell
//! arrives as text and is typed from the column's declared type.

use std::future::Future;
use std::time::Duration;

use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, Postgres};
use sqlx::{Column, ColumnIndex, Decode, Executor, Pool, Row, Statement, TypeInfo, ValueRef};
use tracing::info;

use super::introspect::{SchemaDescription, TableSchema};
use super::result::{QueryResult, ScalarValue};
use super::statement::{manages_own_transaction, StatementKind};
use super::{await_guarded, CallGuard, ConnectionError, DatabaseTarget};
use crate::error::{AssistantError, Result};

const MAX_CONNECTIONS: u32 = 4;

pub const CANCELLED_MESSAGE: &str = "statement cancelled after its deadline; nothing was committed";

const MYSQL_COLUMNS: &str = "SELECT c.TABLE_NAME, c.COLUMN_NAME
     FROM information_schema.COLUMNS c
     JOIN information_schema.TABLES t
       ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
     WHERE c.TABLE_SCHEMA = DATABASE() AND t.TABLE_TYPE = 'BASE TABLE'
     ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

const POSTGRES_COLUMNS: &str = "SELECT c.table_name, c.column_name
     FROM information_schema.columns c
     JOIN information_schema.tables t
       ON t.table_schema = c.table_schema AND t.table_name = c.table_name
     WHERE c.table_schema = current_schema() AND t.table_type = 'BASE TABLE'
     ORDER BY c.table_name, c.ordinal_position";

/// Connection pool for a networked server.
#[derive(Debug, Clone)]
pub enum NetworkPool {
    MySql(Pool<MySql>),
    Postgres(Pool<Postgres>),
}

impl NetworkPool {
    /// Dial `target` and wait up to `timeout` for the first connection.
    pub async fn connect(target: &DatabaseTarget, timeout: Duration) -> Result<Self> {
        let DatabaseTarget::Network {
            scheme,
            host,
            port,
            user,
            password,
            database,
        } = target
        else {
            return Err(AssistantError::Configuration(format!(
                "{} is not a network target",
                target
            )));
        };

        info!("Connecting to {}", target);
        let pool = match scheme.as_str() {
            "mysql" | "mariadb" => {
                let options = MySqlConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(user)
                    .password(password)
                    .database(database);
                MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await
                    .map(NetworkPool::MySql)
            }
            "postgres" | "postgresql" => {
                let options = PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(user)
                    .password(password)
                    .database(database);
                PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await
                    .map(NetworkPool::Postgres)
            }
            other => {
                return Err(AssistantError::Configuration(format!(
                    "unsupported database scheme `{}`; use mysql, postgres or sqlite",
                    other
                )))
            }
        };

        pool.map_err(|e| AssistantError::Configuration(format!("failed to connect to {}: {}", target, e)))
    }

    pub fn dialect(&self) -> &'static str {
        match self {
            NetworkPool::MySql(_) => "mysql",
            NetworkPool::Postgres(_) => "postgres",
        }
    }

    /// Run `f` as its own task, bounded by `timeout`.
    ///
    /// On timeout the task is aborted, which drops any open transaction and
    /// rolls it back, unless the task has already claimed its commit.
    pub async fn call<T, F, Fut>(&self, timeout: Duration, f: F) -> std::result::Result<T, ConnectionError>
    where
        F: FnOnce(NetworkPool, CallGuard) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = CallGuard::default();
        let work = f(self.clone(), guard.clone());
        let task = tokio::spawn(async move { Ok(work.await) });
        let abort = task.abort_handle();
        await_guarded(task, timeout, &guard, move || abort.abort()).await
    }

    /// Tables of the current database or schema, columns in declared order.
    pub async fn read_schema(&self) -> sqlx::Result<SchemaDescription> {
        let rows = match self {
            NetworkPool::MySql(pool) => mysql_ops::fetch_text_pairs(pool, MYSQL_COLUMNS).await?,
            NetworkPool::Postgres(pool) => postgres_ops::fetch_text_pairs(pool, POSTGRES_COLUMNS).await?,
        };
        Ok(group_columns(rows))
    }

    /// Execute one statement. Driver errors come back as `ExecutionFailure`.
    pub async fn run(&self, sql: &str, kind: StatementKind, guard: &CallGuard) -> QueryResult {
        let outcome = match (self, kind) {
            (NetworkPool::MySql(pool), StatementKind::Read) => mysql_ops::run_read(pool, sql).await,
            (NetworkPool::Postgres(pool), StatementKind::Read) => postgres_ops::run_read(pool, sql).await,
            (NetworkPool::MySql(pool), StatementKind::Write) => mysql_ops::run_write(pool, sql, guard).await,
            (NetworkPool::Postgres(pool), StatementKind::Write) => postgres_ops::run_write(pool, sql, guard).await,
        };
        outcome.unwrap_or_else(|e| QueryResult::failure(e.to_string()))
    }
}

// sqlx futures that are generic over the database do not always prove
// `Send` once spawned, so each backend gets its own concrete copy.
macro_rules! backend_ops {
    ($module:ident, $db:ty) => {
        mod $module {
            use super::*;

            pub(super) async fn run_read(pool: &Pool<$db>, sql: &str) -> sqlx::Result<QueryResult> {
                let fetched = sqlx::raw_sql(sql).fetch_all(pool).await?;

                // An empty result carries no column metadata; prepare the statement to get it.
                let columns: Vec<String> = match fetched.first() {
                    Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
                    None => pool
                        .prepare(sql)
                        .await?
                        .columns()
                        .iter()
                        .map(|c| c.name().to_string())
                        .collect(),
                };

                let mut rows = Vec::with_capacity(fetched.len());
                for row in &fetched {
                    let mut values = Vec::with_capacity(columns.len());
                    for (i, column) in row.columns().iter().enumerate() {
                        values.push(decode_cell(row, i, column.type_info().name())?);
                    }
                    rows.push(values);
                }

                Ok(QueryResult::Rows { columns, rows })
            }

            // The statement runs inside a transaction that only commits if the
            // caller is still waiting. An abort before that point drops the
            // transaction, which rolls it back.
            pub(super) async fn run_write(
                pool: &Pool<$db>,
                sql: &str,
                guard: &CallGuard,
            ) -> sqlx::Result<QueryResult> {
                if manages_own_transaction(sql) {
                    sqlx::raw_sql(sql).execute(pool).await?;
                    return Ok(QueryResult::empty());
                }

                let mut tx = pool.begin().await?;
                let conn: &mut <$db as sqlx::Database>::Connection = &mut *tx;
                conn.execute(sqlx::raw_sql(sql)).await?;
                if !guard.begin_commit() {
                    tx.rollback().await?;
                    return Ok(QueryResult::failure(CANCELLED_MESSAGE));
                }
                tx.commit().await?;
                Ok(QueryResult::empty())
            }

            pub(super) async fn fetch_text_pairs(pool: &Pool<$db>, sql: &str) -> sqlx::Result<Vec<(String, String)>> {
                let fetched = sqlx::raw_sql(sql).fetch_all(pool).await?;
                let mut pairs = Vec::with_capacity(fetched.len());
                for row in &fetched {
                    let table: String = row.try_get_unchecked(0usize)?;
                    let column: String = row.try_get_unchecked(1usize)?;
                    pairs.push((table, column));
                }
                Ok(pairs)
            }
        }
    };
}

backend_ops!(mysql_ops, MySql);
backend_ops!(postgres_ops, Postgres);

fn decode_cell<R>(row: &R, index: usize, type_name: &str) -> sqlx::Result<ScalarValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database>,
{
    if row.try_get_raw(index)?.is_null() {
        return Ok(ScalarValue::Null);
    }
    if is_binary_type(type_name) {
        return Ok(ScalarValue::Blob(row.try_get_unchecked(index)?));
    }
    let text: String = row.try_get_unchecked(index)?;
    Ok(typed_from_text(type_name, text))
}

fn base_type(type_name: &str) -> String {
    type_name
        .split(|c: char| c == ' ' || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

fn is_binary_type(type_name: &str) -> bool {
    matches!(
        base_type(type_name).as_str(),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BYTEA"
    )
}

/// Type a text-protocol cell from its column type. Anything unparsable stays text.
fn typed_from_text(type_name: &str, text: String) -> ScalarValue {
    match base_type(type_name).as_str() {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "INT2" | "INT4" | "INT8" | "YEAR"
        | "OID" => match text.parse::<i64>() {
            Ok(i) => ScalarValue::Integer(i),
            Err(_) => ScalarValue::Text(text),
        },
        "FLOAT" | "DOUBLE" | "REAL" | "DECIMAL" | "NUMERIC" | "FLOAT4" | "FLOAT8" => match text.parse::<f64>() {
            Ok(r) => ScalarValue::Real(r),
            Err(_) => ScalarValue::Text(text),
        },
        "BOOL" | "BOOLEAN" => match text.as_str() {
            "t" | "true" | "1" => ScalarValue::Integer(1),
            "f" | "false" | "0" => ScalarValue::Integer(0),
            _ => ScalarValue::Text(text),
        },
        _ => ScalarValue::Text(text),
    }
}

/// Fold `(table, column)` rows, already ordered by table, into tables.
fn group_columns(rows: Vec<(String, String)>) -> SchemaDescription {
    let mut tables: Vec<TableSchema> = Vec::new();
    for (table, column) in rows {
        match tables.last_mut() {
            Some(last) if last.name == table => last.columns.push(column),
            _ => tables.push(TableSchema {
                name: table,
                columns: vec![column],
            }),
        }
    }
    SchemaDescription { tables }
}
