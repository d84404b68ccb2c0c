//! Schema migration registry and executor.
//!
//! Versions are strictly increasing and mirrored to `PRAGMA user_version`.
//! Pending migrations are applied in one transaction.

use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_init.sql"),
}];

/// Returns the newest schema version this build knows.
#[must_use]
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations.
///
/// # Errors
///
/// Fails if the file is newer than this build or a migration statement fails.
pub fn apply_migrations(conn: &mut Connection) -> StoreResult<()> {
    let current = current_user_version(conn)?;
    let latest = latest_version();

    if current > latest {
        return Err(StoreError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        tracing::info!(version = migration.version, "applied schema migration");
    }
    tx.commit()?;
    Ok(())
}

/// Reads `PRAGMA user_version`.
///
/// # Errors
///
/// Fails if the pragma cannot be read.
pub fn current_user_version(conn: &Connection) -> StoreResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_bring_fresh_database_to_latest() -> anyhow::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        apply_migrations(&mut conn)?;
        assert_eq!(current_user_version(&conn)?, latest_version());

        // Re-running is a no-op.
        apply_migrations(&mut conn)?;
        assert_eq!(current_user_version(&conn)?, latest_version());
        Ok(())
    }

    #[test]
    fn newer_schema_is_rejected() -> anyhow::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA user_version = 999;")?;
        let err = apply_migrations(&mut conn).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnsupportedSchemaVersion { db_version: 999, .. }
        ));
        Ok(())
    }
}
