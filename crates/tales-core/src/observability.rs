//! Logging initialization and span constructors shared by the YourTales binaries.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; subsequent calls are no-ops. `RUST_LOG`
/// controls levels and defaults to `info`.
///
/// ```rust
/// use tales_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for a manuscript-scoped operation.
#[must_use]
pub fn manuscript_span(operation: &str, manuscript_id: i64, user_id: i64) -> Span {
    tracing::info_span!(
        "manuscript",
        op = operation,
        manuscript_id = manuscript_id,
        user_id = user_id,
    )
}

/// Creates a span for an account credential operation (register, login, OTP, reset).
///
/// Only the operation name is recorded; email addresses stay out of span fields.
#[must_use]
pub fn credential_span(operation: &str) -> Span {
    tracing::info_span!("credential", op = operation)
}
