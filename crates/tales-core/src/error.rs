//! Error types and result aliases for YourTales.
//!
//! Errors are structured for programmatic handling; the HTTP layer maps each
//! variant onto a status code.

/// The result type used throughout `tales-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An identifier or enum value could not be parsed.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the value invalid.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A password could not be hashed.
    #[error("credential error: {message}")]
    Credential {
        /// Description of the hashing failure.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new invalid-identifier error for the named kind.
    #[must_use]
    pub fn invalid_id(kind: &str, value: impl std::fmt::Display) -> Self {
        Self::InvalidId {
            message: format!("invalid {kind} '{value}'"),
        }
    }

    /// Creates an invalid-input error for an unrecognised value of the named kind.
    #[must_use]
    pub fn invalid_input(kind: &str, value: impl std::fmt::Display) -> Self {
        Self::InvalidInput(format!("unknown {kind} '{value}'"))
    }
}
