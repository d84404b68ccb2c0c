//! Manuscript and collaboration API routes.
//!
//! ## Routes
//!
//! - `GET    /manuscripts` - Published catalogue (public)
//! - `GET    /manuscripts/my-manuscripts` - Manuscripts the caller authors or joined
//! - `GET    /manuscripts/stats` - Dashboard aggregates for the caller
//! - `GET    /manuscripts/{id}` - Manuscript page (public)
//! - `POST   /manuscripts` - Create a manuscript
//! - `PATCH  /manuscripts/{id}` - Edit a manuscript (author or accepted editor)
//! - `DELETE /manuscripts/{id}` - Delete a manuscript (author)
//! - `POST   /manuscripts/invite` - Invite a collaborator (author)
//! - `POST   /manuscripts/respond` - Accept or decline an invitation (invitee)

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use utoipa::ToSchema;

use tales_core::access::{can_edit, invitation_addressed_to, is_author};
use tales_core::id::{CollaborationId, ManuscriptId};
use tales_core::model::{
    Collaboration, CollaborationRole, CollaborationStatus, DashboardStats, Manuscript,
    ManuscriptDetail, ManuscriptStatus, MemberManuscript, PublishedManuscript,
};
use tales_core::observability::manuscript_span;
use tales_store::{ManuscriptPatch, NewCollaboration, NewManuscript, StoreError};

use super::{MessageResponse, required_text};
use crate::context::RequestContext;
use crate::error::{ApiError, ApiErrorBody, ApiResult};
use crate::mailer::{OutgoingMail, send_best_effort};
use crate::notify;
use crate::server::AppState;

const MANUSCRIPT_NOT_FOUND: &str = "Manuscript not found";
const ALREADY_PROCESSED: &str = "Invitation has already been processed";

/// Manuscript creation payload.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateManuscriptRequest {
    /// Title (required).
    pub title: Option<String>,
    /// Subtitle.
    pub subtitle: Option<String>,
    /// Genre label.
    pub genre: Option<String>,
    /// Blurb.
    pub description: Option<String>,
    /// Tags; defaults to none.
    pub tags: Option<Vec<String>>,
    /// Cover image URL.
    pub cover_url: Option<String>,
    /// List price in cents; defaults to 0.
    pub price_cents: Option<i64>,
}

/// Manuscript edit payload; omitted fields are kept.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManuscriptRequest {
    /// New title.
    pub title: Option<String>,
    /// New subtitle.
    pub subtitle: Option<String>,
    /// New genre.
    pub genre: Option<String>,
    /// New blurb.
    pub description: Option<String>,
    /// Replacement tag list.
    pub tags: Option<Vec<String>>,
    /// New cover image URL.
    pub cover_url: Option<String>,
    /// New lifecycle state.
    pub status: Option<ManuscriptStatus>,
    /// New list price in cents.
    pub price_cents: Option<i64>,
}

/// A single manuscript with an outcome message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ManuscriptResponse {
    /// Outcome.
    pub message: String,
    /// Stored manuscript.
    pub manuscript: Manuscript,
}

/// Published catalogue.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublishedListResponse {
    /// Published manuscripts, most recently updated first.
    pub manuscripts: Vec<PublishedManuscript>,
}

/// Manuscripts the caller belongs to.
#[derive(Debug, Serialize, ToSchema)]
pub struct MemberListResponse {
    /// Authored or joined manuscripts, most recently updated first.
    pub manuscripts: Vec<MemberManuscript>,
}

/// Manuscript page.
#[derive(Debug, Serialize, ToSchema)]
pub struct ManuscriptDetailResponse {
    /// Manuscript with author and collaborators.
    pub manuscript: ManuscriptDetail,
}

/// Dashboard figures.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsBody {
    /// Manuscripts authored or joined (accepted).
    pub total_manuscripts: i64,
    /// Of which published.
    pub published_books: i64,
    /// Sum of read counters.
    pub total_reads: i64,
    /// Sum of list prices, in cents.
    pub total_earnings: i64,
}

impl From<DashboardStats> for StatsBody {
    fn from(stats: DashboardStats) -> Self {
        Self {
            total_manuscripts: stats.total_manuscripts,
            published_books: stats.published,
            total_reads: stats.total_reads,
            total_earnings: stats.earnings_cents,
        }
    }
}

/// Dashboard response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Aggregates.
    pub stats: StatsBody,
}

/// Invitation payload.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    /// Manuscript to join.
    pub manuscript_id: Option<ManuscriptId>,
    /// Address to invite.
    pub email: Option<String>,
    /// Granted role; defaults to `VIEWER`.
    pub role: Option<CollaborationRole>,
}

/// Invitation answer payload.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    /// Invitation to answer.
    pub collaboration_id: Option<CollaborationId>,
    /// `ACCEPTED` or `DECLINED`.
    pub status: Option<String>,
}

/// A single invitation with an outcome message.
#[derive(Debug, Serialize, ToSchema)]
pub struct CollaborationResponse {
    /// Outcome.
    pub message: String,
    /// Stored invitation.
    pub collaboration: Collaboration,
}

/// Creates manuscript routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_published).post(create_manuscript))
        .route("/my-manuscripts", get(list_mine))
        .route("/stats", get(dashboard_stats))
        .route("/invite", post(invite_collaborator))
        .route("/respond", post(respond_to_invitation))
        .route(
            "/:id",
            get(get_manuscript)
                .patch(update_manuscript)
                .delete(delete_manuscript),
        )
}

/// List published manuscripts.
///
/// GET /api/manuscripts
#[utoipa::path(
    get,
    path = "/api/manuscripts",
    tag = "manuscripts",
    responses(
        (status = 200, description = "Published manuscripts", body = PublishedListResponse),
    )
)]
pub(crate) async fn list_published(
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let manuscripts = state.store.list_published().await?;
    Ok(Json(PublishedListResponse { manuscripts }))
}

/// List manuscripts the caller authors or collaborates on.
///
/// GET /api/manuscripts/my-manuscripts
#[utoipa::path(
    get,
    path = "/api/manuscripts/my-manuscripts",
    tag = "manuscripts",
    responses(
        (status = 200, description = "Caller's manuscripts", body = MemberListResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn list_mine(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let manuscripts = state.store.list_for_member(ctx.user_id).await?;
    Ok(Json(MemberListResponse { manuscripts }))
}

/// Dashboard aggregates.
///
/// GET /api/manuscripts/stats
#[utoipa::path(
    get,
    path = "/api/manuscripts/stats",
    tag = "manuscripts",
    responses(
        (status = 200, description = "Dashboard stats", body = StatsResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn dashboard_stats(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let stats = state.store.dashboard_stats(ctx.user_id).await?;
    Ok(Json(StatsResponse {
        stats: stats.into(),
    }))
}

/// Get a manuscript.
///
/// Viewing a published manuscript counts as a read.
///
/// GET /api/manuscripts/{id}
#[utoipa::path(
    get,
    path = "/api/manuscripts/{id}",
    tag = "manuscripts",
    params(
        ("id" = i64, Path, description = "Manuscript ID")
    ),
    responses(
        (status = 200, description = "Manuscript", body = ManuscriptDetailResponse),
        (status = 404, description = "Not found", body = ApiErrorBody),
    )
)]
pub(crate) async fn get_manuscript(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ManuscriptId>,
) -> ApiResult<impl IntoResponse> {
    let mut manuscript = state
        .store
        .manuscript_detail(id)
        .await?
        .ok_or_else(|| ApiError::not_found(MANUSCRIPT_NOT_FOUND))?;

    if manuscript.manuscript.status == ManuscriptStatus::Published {
        match state.store.record_read(id).await {
            Ok(()) => manuscript.manuscript.reads += 1,
            Err(err) => {
                tracing::warn!(manuscript_id = id.get(), error = %err, "read count not recorded");
            }
        }
    }

    Ok(Json(ManuscriptDetailResponse { manuscript }))
}

/// Create a manuscript.
///
/// POST /api/manuscripts
#[utoipa::path(
    post,
    path = "/api/manuscripts",
    tag = "manuscripts",
    request_body = CreateManuscriptRequest,
    responses(
        (status = 201, description = "Manuscript created", body = ManuscriptResponse),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn create_manuscript(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateManuscriptRequest>,
) -> ApiResult<impl IntoResponse> {
    let Some(title) = required_text(req.title) else {
        return Err(ApiError::bad_request("Title is required"));
    };
    let price_cents = validate_price(req.price_cents)?.unwrap_or(0);

    let mut new = NewManuscript::new(ctx.user_id, title);
    new.subtitle = req.subtitle;
    new.genre = req.genre;
    new.description = req.description;
    new.tags = req.tags.unwrap_or_default();
    new.cover_url = req.cover_url;
    new.price_cents = price_cents;

    let manuscript = state.store.create_manuscript(new).await?;
    tracing::info!(
        manuscript_id = manuscript.id.get(),
        user_id = ctx.user_id.get(),
        request_id = %ctx.request_id,
        "manuscript created"
    );
    notify::deliver(&state.store, notify::manuscript_created(&manuscript)).await;

    Ok((
        StatusCode::CREATED,
        Json(ManuscriptResponse {
            message: "Manuscript created successfully".to_string(),
            manuscript,
        }),
    ))
}

/// Edit a manuscript.
///
/// PATCH /api/manuscripts/{id}
#[utoipa::path(
    patch,
    path = "/api/manuscripts/{id}",
    tag = "manuscripts",
    params(
        ("id" = i64, Path, description = "Manuscript ID")
    ),
    request_body = UpdateManuscriptRequest,
    responses(
        (status = 200, description = "Manuscript updated", body = ManuscriptResponse),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the author or an editor", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn update_manuscript(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<ManuscriptId>,
    Json(req): Json<UpdateManuscriptRequest>,
) -> ApiResult<impl IntoResponse> {
    let price_cents = validate_price(req.price_cents)?;
    let span = manuscript_span("update_manuscript", id.get(), ctx.user_id.get());

    async move {
        let current = load_manuscript(&state, id).await?;
        let collaborations = state.store.list_collaborations(id).await?;
        if !can_edit(&current, &collaborations, ctx.user_id) {
            return Err(ApiError::forbidden("Permission denied"));
        }

        let patch = ManuscriptPatch {
            title: required_text(req.title),
            subtitle: req.subtitle,
            genre: req.genre,
            description: req.description,
            tags: req.tags,
            cover_url: req.cover_url,
            status: req.status,
            price_cents,
        };
        let updated = state.store.update_manuscript(id, patch).await?;
        tracing::info!(status = %updated.status, "manuscript updated");

        if updated.status == ManuscriptStatus::Published
            && current.status != ManuscriptStatus::Published
        {
            notify::deliver(
                &state.store,
                notify::manuscript_published(ctx.user_id, &updated),
            )
            .await;
        }

        Ok(Json(ManuscriptResponse {
            message: "Manuscript updated successfully".to_string(),
            manuscript: updated,
        }))
    }
    .instrument(span)
    .await
}

/// Delete a manuscript.
///
/// DELETE /api/manuscripts/{id}
#[utoipa::path(
    delete,
    path = "/api/manuscripts/{id}",
    tag = "manuscripts",
    params(
        ("id" = i64, Path, description = "Manuscript ID")
    ),
    responses(
        (status = 200, description = "Manuscript deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the author", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn delete_manuscript(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<ManuscriptId>,
) -> ApiResult<impl IntoResponse> {
    let manuscript = load_manuscript(&state, id).await?;
    if !is_author(&manuscript, ctx.user_id) {
        return Err(ApiError::forbidden(
            "Only the author can delete this manuscript",
        ));
    }

    state.store.delete_manuscript(id).await?;
    tracing::info!(
        manuscript_id = id.get(),
        user_id = ctx.user_id.get(),
        "manuscript deleted"
    );
    Ok(Json(MessageResponse::new("Manuscript deleted successfully")))
}

/// Invite a collaborator.
///
/// POST /api/manuscripts/invite
#[utoipa::path(
    post,
    path = "/api/manuscripts/invite",
    tag = "manuscripts",
    request_body = InviteRequest,
    responses(
        (status = 201, description = "Invitation sent", body = CollaborationResponse),
        (status = 400, description = "Missing fields, self-invite, or duplicate", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the author", body = ApiErrorBody),
        (status = 404, description = "Manuscript not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn invite_collaborator(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(manuscript_id), Some(email)) = (req.manuscript_id, required_text(req.email)) else {
        return Err(ApiError::bad_request("manuscriptId and email are required"));
    };
    let role = req.role.unwrap_or_default();
    let span = manuscript_span("invite_collaborator", manuscript_id.get(), ctx.user_id.get());

    async move {
        let manuscript = load_manuscript(&state, manuscript_id).await?;
        if !is_author(&manuscript, ctx.user_id) {
            return Err(ApiError::forbidden(
                "Only the author can invite collaborators",
            ));
        }

        let sender = state.store.find_user(ctx.user_id).await?;
        if sender
            .as_ref()
            .is_some_and(|user| user.email.eq_ignore_ascii_case(&email))
        {
            return Err(ApiError::bad_request("You cannot invite yourself"));
        }
        if state
            .store
            .find_collaboration_by_email(manuscript_id, &email)
            .await?
            .is_some()
        {
            return Err(ApiError::bad_request("Invitation already sent to this email"));
        }

        let invitee = state.store.find_user_by_email(&email).await?;
        let collaboration = state
            .store
            .create_collaboration(NewCollaboration {
                manuscript_id,
                email: email.clone(),
                user_id: invitee.as_ref().map(|user| user.id),
                role,
            })
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => {
                    ApiError::bad_request("Invitation already sent to this email")
                }
                other => ApiError::from(other),
            })?;
        tracing::info!(
            collaboration_id = collaboration.id.get(),
            role = %role,
            registered = invitee.is_some(),
            "collaborator invited"
        );

        if let Some(invitee) = invitee.as_ref() {
            notify::deliver(
                &state.store,
                notify::collaboration_requested(
                    invitee.id,
                    sender.as_ref(),
                    &manuscript,
                    &collaboration,
                ),
            )
            .await;
        }
        send_best_effort(
            state.mailer.as_ref(),
            OutgoingMail::invitation(
                &email,
                notify::display_name(sender.as_ref()),
                &manuscript.title,
                role,
            ),
        )
        .await;

        Ok((
            StatusCode::CREATED,
            Json(CollaborationResponse {
                message: "Invitation sent successfully".to_string(),
                collaboration,
            }),
        ))
    }
    .instrument(span)
    .await
}

/// Accept or decline an invitation.
///
/// POST /api/manuscripts/respond
#[utoipa::path(
    post,
    path = "/api/manuscripts/respond",
    tag = "manuscripts",
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Invitation answered", body = CollaborationResponse),
        (status = 400, description = "Bad status or already processed", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Invitation addressed to someone else", body = ApiErrorBody),
        (status = 404, description = "Invitation not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn respond_to_invitation(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<impl IntoResponse> {
    let Some(collaboration_id) = req.collaboration_id else {
        return Err(ApiError::bad_request("collaborationId is required"));
    };
    let status = response_status(req.status.as_deref())?;

    let collaboration = state
        .store
        .find_collaboration(collaboration_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invitation not found"))?;
    let responder = state
        .store
        .find_user(ctx.user_id)
        .await?
        .filter(|user| invitation_addressed_to(&collaboration, user))
        .ok_or_else(|| ApiError::forbidden("This invitation is not for you"))?;
    if collaboration.status != CollaborationStatus::Pending {
        return Err(ApiError::bad_request(ALREADY_PROCESSED));
    }

    let updated = state
        .store
        .respond_to_collaboration(collaboration_id, ctx.user_id, status)
        .await
        .map_err(|err| match err {
            StoreError::Conflict(_) => ApiError::bad_request(ALREADY_PROCESSED),
            StoreError::NotFound { .. } => ApiError::not_found("Invitation not found"),
            other => ApiError::from(other),
        })?;
    tracing::info!(
        collaboration_id = updated.id.get(),
        manuscript_id = updated.manuscript_id.get(),
        user_id = ctx.user_id.get(),
        status = %status,
        "invitation answered"
    );

    if let Some(manuscript) = notify::lookup(
        state.store.find_manuscript(updated.manuscript_id).await,
        "manuscript",
    ) {
        notify::deliver(
            &state.store,
            notify::invitation_answered(&responder, &manuscript, &updated),
        )
        .await;
    }

    Ok(Json(CollaborationResponse {
        message: format!("Invitation {}", status.as_str().to_ascii_lowercase()),
        collaboration: updated,
    }))
}

/// Loads a manuscript or fails with 404.
pub(crate) async fn load_manuscript(state: &AppState, id: ManuscriptId) -> ApiResult<Manuscript> {
    state
        .store
        .find_manuscript(id)
        .await?
        .ok_or_else(|| ApiError::not_found(MANUSCRIPT_NOT_FOUND))
}

fn validate_price(price_cents: Option<i64>) -> ApiResult<Option<i64>> {
    match price_cents {
        Some(cents) if cents < 0 => Err(ApiError::bad_request("priceCents cannot be negative")),
        other => Ok(other),
    }
}

fn response_status(raw: Option<&str>) -> ApiResult<CollaborationStatus> {
    match raw.map(str::parse::<CollaborationStatus>) {
        Some(Ok(status @ (CollaborationStatus::Accepted | CollaborationStatus::Declined))) => {
            Ok(status)
        }
        _ => Err(ApiError::bad_request("status must be ACCEPTED or DECLINED")),
    }
}
