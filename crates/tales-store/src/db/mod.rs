//! SQLite connection bootstrap.
//!
//! Returned connections have `foreign_keys=ON`, a busy timeout, and every
//! migration applied. Nothing reads application tables before that.

use std::path::Path;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::error::StoreResult;

pub mod migrations;

/// Opens (creating if needed) a database file and applies pending migrations.
///
/// # Errors
///
/// Fails if the file cannot be opened or migrated.
pub fn open_db(path: impl AsRef<Path>) -> StoreResult<Connection> {
    let started_at = Instant::now();
    let path = path.as_ref();
    let mut conn = Connection::open(path).inspect_err(|err| {
        tracing::error!(path = %path.display(), error = %err, "failed to open database");
    })?;
    bootstrap(&mut conn)?;
    tracing::info!(
        path = %path.display(),
        duration_ms = started_at.elapsed().as_millis(),
        "database ready"
    );
    Ok(conn)
}

/// Opens a private in-memory database and applies all migrations.
///
/// # Errors
///
/// Fails if migrations cannot be applied.
pub fn open_db_in_memory() -> StoreResult<Connection> {
    let mut conn = Connection::open_in_memory()?;
    bootstrap(&mut conn)?;
    tracing::debug!("in-memory database ready");
    Ok(conn)
}

fn bootstrap(conn: &mut Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    migrations::apply_migrations(conn)
}
