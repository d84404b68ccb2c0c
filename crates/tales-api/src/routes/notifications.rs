//! Notification inbox routes. Every route acts on the caller's own inbox;
//! another user's notification is reported as not found.
//!
//! ## Routes
//!
//! - `GET    /notifications?type=&isRead=` - List with unread count
//! - `PATCH  /notifications/mark-all-read` - Mark everything read
//! - `PATCH  /notifications/{id}/read` - Mark one read
//! - `DELETE /notifications/{id}` - Delete one

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use tales_core::id::NotificationId;
use tales_core::model::{Notification, NotificationType};
use tales_store::{NotificationFilter, StoreError};

use super::MessageResponse;
use crate::context::RequestContext;
use crate::error::{ApiError, ApiErrorBody, ApiResult};
use crate::server::AppState;

/// Inbox filters.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    /// Only this category.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// `true` or `false`; any other value selects unread.
    pub is_read: Option<String>,
}

impl NotificationQuery {
    fn into_filter(self) -> ApiResult<NotificationFilter> {
        let kind = self
            .kind
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(str::parse::<NotificationType>)
            .transpose()
            .map_err(|_| {
                ApiError::bad_request(
                    "type must be one of COMMENT, REVIEW, COLLABORATION, MENTION, SYSTEM",
                )
            })?;
        // Anything but the literal "true" reads as false.
        let is_read = self.is_read.map(|raw| raw == "true");
        Ok(NotificationFilter { kind, is_read })
    }
}

/// Inbox listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsResponse {
    /// Matching notifications, newest first.
    pub notifications: Vec<Notification>,
    /// Unread notifications in the whole inbox, ignoring filters.
    pub unread_count: i64,
}

/// A single notification with an outcome message.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    /// Outcome.
    pub message: String,
    /// The notification.
    pub notification: Notification,
}

/// Creates notification routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/mark-all-read", patch(mark_all_read))
        .route("/:id/read", patch(mark_read))
        .route("/:id", delete(delete_notification))
}

/// List the caller's notifications.
///
/// GET /api/notifications
#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Notifications", body = ListNotificationsResponse),
        (status = 400, description = "Unknown type filter", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn list_notifications(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = query.into_filter()?;
    let notifications = state
        .store
        .list_notifications(ctx.user_id, filter)
        .await?;
    let unread_count = state.store.unread_count(ctx.user_id).await?;
    Ok(Json(ListNotificationsResponse {
        notifications,
        unread_count,
    }))
}

/// Mark one notification read.
///
/// PATCH /api/notifications/{id}/read
#[utoipa::path(
    patch,
    path = "/api/notifications/{id}/read",
    tag = "notifications",
    params(
        ("id" = i64, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Marked read", body = NotificationResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn mark_read(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<NotificationId>,
) -> ApiResult<impl IntoResponse> {
    let notification = state
        .store
        .mark_notification_read(id, ctx.user_id)
        .await
        .map_err(notification_not_found)?;
    Ok(Json(NotificationResponse {
        message: "Notification marked as read".to_string(),
        notification,
    }))
}

/// Mark every notification read.
///
/// PATCH /api/notifications/mark-all-read
#[utoipa::path(
    patch,
    path = "/api/notifications/mark-all-read",
    tag = "notifications",
    responses(
        (status = 200, description = "All marked read", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn mark_all_read(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let changed = state.store.mark_all_read(ctx.user_id).await?;
    tracing::debug!(user_id = ctx.user_id.get(), changed, "notifications marked read");
    Ok(Json(MessageResponse::new("All notifications marked as read")))
}

/// Delete a notification.
///
/// DELETE /api/notifications/{id}
#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    tag = "notifications",
    params(
        ("id" = i64, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn delete_notification(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<NotificationId>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .delete_notification(id, ctx.user_id)
        .await
        .map_err(notification_not_found)?;
    Ok(Json(MessageResponse::new(
        "Notification deleted successfully",
    )))
}

fn notification_not_found(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound { .. } => ApiError::not_found("Notification not found"),
        other => ApiError::from(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(kind: Option<&str>, is_read: Option<&str>) -> NotificationQuery {
        NotificationQuery {
            kind: kind.map(str::to_string),
            is_read: is_read.map(str::to_string),
        }
    }

    #[test]
    fn empty_query_filters_nothing() {
        let filter = NotificationQuery::default().into_filter().unwrap();
        assert!(filter.kind.is_none());
        assert!(filter.is_read.is_none());
    }

    #[test]
    fn is_read_only_true_for_literal_true() {
        assert_eq!(
            query(None, Some("true")).into_filter().unwrap().is_read,
            Some(true)
        );
        assert_eq!(
            query(None, Some("yes")).into_filter().unwrap().is_read,
            Some(false)
        );
    }

    #[test]
    fn type_filter_is_parsed_case_insensitively() {
        let filter = query(Some("review"), None).into_filter().unwrap();
        assert_eq!(filter.kind, Some(NotificationType::Review));
        assert!(query(Some("BOGUS"), None).into_filter().is_err());
    }
}
