//! Database boundary - the session's single connection, schema introspection
//! and statement execution.
pub mod executor;
pub mod introspect;
pub mod network;
pub mod result;
pub mod statement;
pub mod target;

pub use executor::QueryExecutor;
pub use introspect::{SchemaDescription, SchemaIntrospector, TableSchema};
pub use network::NetworkPool;
pub use result::{QueryResult, ScalarValue};
pub use statement::StatementKind;
pub use target::DatabaseTarget;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, InterruptHandle, OpenFlags};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::{AssistantError, Result};

/// How long a network target gets to accept the first connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure of the blocking call wrapper itself, as opposed to a driver error
/// returned by the closure.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("database call timed out after {0:?}")]
    TimedOut(Duration),
    #[error("database connection is unusable after an earlier panic")]
    Poisoned,
    #[error("database task aborted: {0}")]
    Aborted(String),
    #[error("{0} is not a SQLite connection")]
    NotSqlite(String),
}

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const COMMITTING: u8 = 2;

/// Arbitrates between a timed call and the worker running it.
///
/// Exactly one side wins: either the caller cancels and reports a timeout, or
/// the worker claims the commit and the caller waits for its real outcome.
#[derive(Debug, Clone, Default)]
pub struct CallGuard(Arc<AtomicU8>);

impl CallGuard {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst) == CANCELLED
    }

    /// Claim the right to make the call's effects durable. Returns false
    /// once the caller has given up; the worker must then roll back.
    pub fn begin_commit(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, COMMITTING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Give up on the call. Returns false if the worker is already committing.
    pub fn cancel(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[derive(Clone)]
enum Backend {
    Sqlite {
        conn: Arc<Mutex<Connection>>,
        interrupt: Arc<InterruptHandle>,
    },
    Network(NetworkPool),
}

/// Handle to one open database. Cloning shares the same underlying connection.
#[derive(Clone)]
pub struct DatabaseConnection {
    backend: Backend,
    target: DatabaseTarget,
}

impl DatabaseConnection {
    /// Open any target. SQLite opens in place; network targets dial the
    /// server and wait for the first connection.
    pub async fn connect(target: &DatabaseTarget) -> Result<Self> {
        Self::connect_with_timeout(target, CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(target: &DatabaseTarget, timeout: Duration) -> Result<Self> {
        match target {
            DatabaseTarget::Network { .. } => {
                let pool = NetworkPool::connect(target, timeout).await?;
                Ok(Self {
                    backend: Backend::Network(pool),
                    target: target.clone(),
                })
            }
            _ => Self::open(target),
        }
    }

    /// Open a SQLite target on the calling thread.
    pub fn open(target: &DatabaseTarget) -> Result<Self> {
        let conn = match target {
            DatabaseTarget::Sqlite { path } => {
                info!("Opening SQLite database at: {}", path.display());
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AssistantError::Configuration(format!(
                            "cannot create directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
                Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
            }
            DatabaseTarget::InMemory => {
                info!("Opening in-memory SQLite database");
                Connection::open_in_memory()
            }
            DatabaseTarget::Network { .. } => {
                return Err(AssistantError::Configuration(format!(
                    "{} is a network target; open it with DatabaseConnection::connect",
                    target
                )));
            }
        }
        .map_err(|e| AssistantError::Configuration(format!("failed to open {}: {}", target, e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(|e| AssistantError::Configuration(format!("failed to configure {}: {}", target, e)))?;

        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Self {
            backend: Backend::Sqlite {
                conn: Arc::new(Mutex::new(conn)),
                interrupt,
            },
            target: target.clone(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&DatabaseTarget::InMemory)
    }

    pub fn target(&self) -> &DatabaseTarget {
        &self.target
    }

    /// The server pool, for network targets.
    pub fn network(&self) -> Option<&NetworkPool> {
        match &self.backend {
            Backend::Network(pool) => Some(pool),
            Backend::Sqlite { .. } => None,
        }
    }

    /// Run `f` against the SQLite connection on the blocking pool, bounded by
    /// `timeout`.
    ///
    /// On timeout the running statement is interrupted so the connection is
    /// released promptly and stays usable for the next call. A worker that
    /// only gets the lock after the deadline does not run `f` at all.
    pub async fn call<T, F>(&self, timeout: Duration, f: F) -> std::result::Result<T, ConnectionError>
    where
        F: FnOnce(&mut Connection, &CallGuard) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (conn, interrupt) = match &self.backend {
            Backend::Sqlite { conn, interrupt } => (Arc::clone(conn), Arc::clone(interrupt)),
            Backend::Network(_) => return Err(ConnectionError::NotSqlite(self.target.to_string())),
        };

        let guard = CallGuard::default();
        let worker = guard.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| ConnectionError::Poisoned)?;
            if worker.is_cancelled() {
                debug!("Skipping database call abandoned before it started");
                return Err(ConnectionError::TimedOut(timeout));
            }
            Ok(f(&mut conn, &worker))
        });

        await_guarded(task, timeout, &guard, move || interrupt.interrupt()).await
    }

    /// Run `f` on the calling thread. Used by synchronous callers and tests.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> T,
    ) -> std::result::Result<T, ConnectionError> {
        match &self.backend {
            Backend::Sqlite { conn, .. } => {
                let mut guard = conn.lock().map_err(|_| ConnectionError::Poisoned)?;
                Ok(f(&mut guard))
            }
            Backend::Network(_) => Err(ConnectionError::NotSqlite(self.target.to_string())),
        }
    }
}

/// Wait for `task` until `timeout`. If the deadline passes first and the
/// worker has not started committing, the call is cancelled and `on_cancel`
/// stops whatever the worker is doing. Otherwise the commit is allowed to
/// finish and its outcome is returned.
pub(crate) async fn await_guarded<T>(
    mut task: JoinHandle<std::result::Result<T, ConnectionError>>,
    timeout: Duration,
    guard: &CallGuard,
    on_cancel: impl FnOnce(),
) -> std::result::Result<T, ConnectionError> {
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => flatten(joined),
        Err(_) => {
            if guard.cancel() {
                warn!("Database call exceeded {:?}, cancelling", timeout);
                on_cancel();
                Err(ConnectionError::TimedOut(timeout))
            } else {
                debug!("Database call passed {:?} while committing; waiting for it", timeout);
                flatten(task.await)
            }
        }
    }
}

fn flatten<T>(
    joined: std::result::Result<std::result::Result<T, ConnectionError>, JoinError>,
) -> std::result::Result<T, ConnectionError> {
    joined.unwrap_or_else(|e| Err(ConnectionError::Aborted(e.to_string())))
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Sqlite { .. } => "sqlite",
            Backend::Network(pool) => pool.dialect(),
        };
        f.debug_struct("DatabaseConnection")
            .field("target", &self.target)
            .field("backend", &backend)
            .finish()
    }
}
