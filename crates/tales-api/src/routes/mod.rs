//! HTTP route handlers.

pub mod chapters;
pub mod comments;
pub mod manuscripts;
pub mod notifications;
pub mod users;

use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use utoipa::ToSchema;

use crate::server::AppState;

/// Acknowledgement body for mutations that return nothing else.
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `/api` account routes reachable without a token (credential rate tier).
pub fn credential_routes() -> Router<Arc<AppState>> {
    Router::new().nest("/users", users::public_routes())
}

/// `/api` routes on the default rate tier.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/users", users::routes())
        .nest("/manuscripts", manuscripts::routes())
        .nest("/chapters", chapters::routes())
        .nest("/comments", comments::routes())
        .nest("/notifications", notifications::routes())
}

/// Trims `value` and treats blank input as absent.
pub(crate) fn required_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Like [`required_text`] but keeps surrounding whitespace (passwords).
pub(crate) fn required_secret(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_count_as_missing() {
        assert_eq!(required_text(Some("  Ada ".to_string())).as_deref(), Some("Ada"));
        assert!(required_text(Some("   ".to_string())).is_none());
        assert!(required_text(None).is_none());
        assert_eq!(
            required_secret(Some(" pw ".to_string())).as_deref(),
            Some(" pw ")
        );
        assert!(required_secret(Some(String::new())).is_none());
    }
}
