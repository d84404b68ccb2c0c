//! Chapter API routes.
//!
//! ## Routes
//!
//! - `GET    /chapters/manuscript/{manuscriptId}` - Chapters in reading order (public)
//! - `POST   /chapters` - Add a chapter (author or accepted editor)
//! - `PATCH  /chapters/{id}` - Edit a chapter (author or accepted editor)
//! - `DELETE /chapters/{id}` - Remove a chapter (author)

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use tales_core::access::{can_edit, is_author};
use tales_core::id::{ChapterId, ManuscriptId};
use tales_core::model::{Chapter, Manuscript};
use tales_store::{ChapterPatch, NewChapter};

use super::manuscripts::load_manuscript;
use super::{MessageResponse, required_text};
use crate::context::RequestContext;
use crate::error::{ApiError, ApiErrorBody, ApiResult};
use crate::server::AppState;

/// Chapter creation payload.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChapterRequest {
    /// Owning manuscript.
    pub manuscript_id: Option<ManuscriptId>,
    /// Chapter title.
    pub title: Option<String>,
    /// Chapter body.
    pub content: Option<String>,
    /// Sort key; defaults to 0.
    pub order: Option<i64>,
}

/// Chapter edit payload; omitted fields are kept.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateChapterRequest {
    /// New title.
    pub title: Option<String>,
    /// New body.
    pub content: Option<String>,
    /// New sort key.
    pub order: Option<i64>,
}

/// A single chapter with an outcome message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChapterResponse {
    /// Outcome.
    pub message: String,
    /// Stored chapter.
    pub chapter: Chapter,
}

/// Chapters of a manuscript.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListChaptersResponse {
    /// Chapters ordered by `order`, then creation.
    pub chapters: Vec<Chapter>,
}

/// Creates chapter routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_chapter))
        .route("/manuscript/:manuscript_id", get(list_chapters))
        .route("/:id", patch(update_chapter).delete(delete_chapter))
}

/// List a manuscript's chapters.
///
/// GET /api/chapters/manuscript/{manuscriptId}
#[utoipa::path(
    get,
    path = "/api/chapters/manuscript/{manuscriptId}",
    tag = "chapters",
    params(
        ("manuscriptId" = i64, Path, description = "Manuscript ID")
    ),
    responses(
        (status = 200, description = "Chapters", body = ListChaptersResponse),
        (status = 404, description = "Manuscript not found", body = ApiErrorBody),
    )
)]
pub(crate) async fn list_chapters(
    State(state): State<Arc<AppState>>,
    Path(manuscript_id): Path<ManuscriptId>,
) -> ApiResult<impl IntoResponse> {
    load_manuscript(&state, manuscript_id).await?;
    let chapters = state.store.list_chapters(manuscript_id).await?;
    Ok(Json(ListChaptersResponse { chapters }))
}

/// Add a chapter.
///
/// POST /api/chapters
#[utoipa::path(
    post,
    path = "/api/chapters",
    tag = "chapters",
    request_body = CreateChapterRequest,
    responses(
        (status = 201, description = "Chapter created", body = ChapterResponse),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the author or an editor", body = ApiErrorBody),
        (status = 404, description = "Manuscript not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn create_chapter(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateChapterRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(manuscript_id), Some(title)) = (req.manuscript_id, required_text(req.title)) else {
        return Err(ApiError::bad_request("manuscriptId and title are required"));
    };

    let manuscript = load_manuscript(&state, manuscript_id).await?;
    ensure_editor(&state, &manuscript, &ctx, "Only authors or editors can create chapters").await?;

    let chapter = state
        .store
        .create_chapter(NewChapter {
            manuscript_id,
            title,
            content: req.content,
            order: req.order,
        })
        .await?;
    tracing::info!(
        chapter_id = chapter.id.get(),
        manuscript_id = manuscript_id.get(),
        user_id = ctx.user_id.get(),
        "chapter created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ChapterResponse {
            message: "Chapter created successfully".to_string(),
            chapter,
        }),
    ))
}

/// Edit a chapter.
///
/// PATCH /api/chapters/{id}
#[utoipa::path(
    patch,
    path = "/api/chapters/{id}",
    tag = "chapters",
    params(
        ("id" = i64, Path, description = "Chapter ID")
    ),
    request_body = UpdateChapterRequest,
    responses(
        (status = 200, description = "Chapter updated", body = ChapterResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the author or an editor", body = ApiErrorBody),
        (status = 404, description = "Chapter not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn update_chapter(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<ChapterId>,
    Json(req): Json<UpdateChapterRequest>,
) -> ApiResult<impl IntoResponse> {
    let (_, manuscript) = load_chapter_with_manuscript(&state, id).await?;
    ensure_editor(&state, &manuscript, &ctx, "Permission denied").await?;

    let chapter = state
        .store
        .update_chapter(
            id,
            ChapterPatch {
                title: required_text(req.title),
                content: req.content,
                order: req.order,
            },
        )
        .await?;
    tracing::info!(chapter_id = id.get(), user_id = ctx.user_id.get(), "chapter updated");

    Ok(Json(ChapterResponse {
        message: "Chapter updated successfully".to_string(),
        chapter,
    }))
}

/// Remove a chapter.
///
/// DELETE /api/chapters/{id}
#[utoipa::path(
    delete,
    path = "/api/chapters/{id}",
    tag = "chapters",
    params(
        ("id" = i64, Path, description = "Chapter ID")
    ),
    responses(
        (status = 200, description = "Chapter deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the author", body = ApiErrorBody),
        (status = 404, description = "Chapter not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn delete_chapter(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<ChapterId>,
) -> ApiResult<impl IntoResponse> {
    let (_, manuscript) = load_chapter_with_manuscript(&state, id).await?;
    if !is_author(&manuscript, ctx.user_id) {
        return Err(ApiError::forbidden("Only the author can delete chapters"));
    }

    state.store.delete_chapter(id).await?;
    tracing::info!(chapter_id = id.get(), user_id = ctx.user_id.get(), "chapter deleted");
    Ok(Json(MessageResponse::new("Chapter deleted successfully")))
}

/// Loads a chapter and its manuscript or fails with 404.
pub(crate) async fn load_chapter_with_manuscript(
    state: &AppState,
    id: ChapterId,
) -> ApiResult<(Chapter, Manuscript)> {
    let chapter = state
        .store
        .find_chapter(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chapter not found"))?;
    let manuscript = state
        .store
        .find_manuscript(chapter.manuscript_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chapter not found"))?;
    Ok((chapter, manuscript))
}

async fn ensure_editor(
    state: &AppState,
    manuscript: &Manuscript,
    ctx: &RequestContext,
    denied: &'static str,
) -> ApiResult<()> {
    let collaborations = state.store.list_collaborations(manuscript.id).await?;
    if can_edit(manuscript, &collaborations, ctx.user_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden(denied))
    }
}
