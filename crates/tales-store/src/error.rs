//! Error types for the SQLite store.

use rusqlite::ErrorCode;

/// The result type used throughout `tales-store`.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of row.
        entity: &'static str,
        /// Key that was looked up.
        id: String,
    },

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row or an argument could not be interpreted.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The database file was written by a newer schema.
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        /// Version found in the file.
        db_version: u32,
        /// Newest version this build knows.
        latest_supported: u32,
    },

    /// The SQLite driver failed.
    #[error("storage error: {0}")]
    Storage(#[source] rusqlite::Error),

    /// A blocking task could not be joined.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

// SQLITE_CONSTRAINT_UNIQUE and SQLITE_CONSTRAINT_FOREIGNKEY extended codes.
const CONSTRAINT_UNIQUE: i32 = 2067;
const CONSTRAINT_FOREIGNKEY: i32 = 787;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                let detail = message.clone().unwrap_or_else(|| err.to_string());
                match code.extended_code {
                    CONSTRAINT_UNIQUE => Self::Conflict(detail),
                    CONSTRAINT_FOREIGNKEY => {
                        Self::InvalidData(format!("referenced row does not exist: {detail}"))
                    }
                    _ => Self::InvalidData(detail),
                }
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => Self::InvalidData(err.to_string()),
            _ => Self::Storage(err),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}
