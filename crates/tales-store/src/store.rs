//! Shared handle over one SQLite connection.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::db;
use crate::error::{StoreError, StoreResult};

/// Cloneable handle to the YourTales database.
///
/// All SQLite work runs on tokio's blocking pool behind a single mutex;
/// repository methods are `async` so handlers never block the runtime.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Opens the database file at `path`, applying migrations.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_connection(db::open_db(path)?))
    }

    /// Opens a fresh in-memory database, applying migrations.
    ///
    /// # Errors
    ///
    /// Fails if migrations cannot be applied.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(db::open_db_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs a trivial query; used by readiness probes.
    ///
    /// # Errors
    ///
    /// Fails if the database is unusable.
    pub async fn ping(&self) -> StoreResult<()> {
        self.run("ping", |conn| {
            conn.query_row("SELECT 1;", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    /// Runs `work` against the connection on the blocking pool.
    pub(crate) async fn run<T, F>(&self, op: &'static str, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            work(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Internal {
            message: format!("{op}: blocking task failed: {e}"),
        })?
        .inspect_err(|err| match err {
            StoreError::Storage(_) | StoreError::Internal { .. } => {
                tracing::error!(op, error = %err, "store operation failed");
            }
            _ => tracing::debug!(op, error = %err, "store operation rejected"),
        })
    }
}
