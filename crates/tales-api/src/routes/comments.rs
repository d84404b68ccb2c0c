//! Chapter feedback routes: comments and star reviews.
//!
//! ## Routes
//!
//! - `GET    /comments/comment/chapter/{chapterId}` - Comments, oldest first (public)
//! - `GET    /comments/review/chapter/{chapterId}` - Reviews, newest first (public)
//! - `POST   /comments/comment` - Comment on a chapter
//! - `DELETE /comments/comment/{id}` - Delete own comment
//! - `POST   /comments/review` - Review a chapter

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use tales_core::id::{ChapterId, CommentId, UserId};
use tales_core::model::{Comment, CommentView, Manuscript, Review, ReviewView};

use super::chapters::load_chapter_with_manuscript;
use super::{MessageResponse, required_text};
use crate::context::RequestContext;
use crate::error::{ApiError, ApiErrorBody, ApiResult};
use crate::notify;
use crate::server::AppState;

/// Comment payload.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    /// Chapter to comment on.
    pub chapter_id: Option<ChapterId>,
    /// Comment text.
    pub content: Option<String>,
}

/// Review payload.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    /// Chapter to review.
    pub chapter_id: Option<ChapterId>,
    /// Stars, 1 to 5.
    pub rating: Option<i64>,
    /// Optional review text.
    pub content: Option<String>,
}

/// Stored comment with an outcome message.
#[derive(Debug, Serialize, ToSchema)]
pub struct CommentResponse {
    /// Outcome.
    pub message: String,
    /// The comment.
    pub comment: Comment,
}

/// Stored review with an outcome message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewResponse {
    /// Outcome.
    pub message: String,
    /// The review.
    pub review: Review,
}

/// Comments on a chapter.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListCommentsResponse {
    /// Oldest first.
    pub comments: Vec<CommentView>,
}

/// Reviews of a chapter.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListReviewsResponse {
    /// Newest first.
    pub reviews: Vec<ReviewView>,
}

/// Creates feedback routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/comment", post(add_comment))
        .route("/comment/:id", delete(delete_comment))
        .route("/comment/chapter/:chapter_id", get(list_comments))
        .route("/review", post(add_review))
        .route("/review/chapter/:chapter_id", get(list_reviews))
}

/// List a chapter's comments.
///
/// GET /api/comments/comment/chapter/{chapterId}
#[utoipa::path(
    get,
    path = "/api/comments/comment/chapter/{chapterId}",
    tag = "feedback",
    params(
        ("chapterId" = i64, Path, description = "Chapter ID")
    ),
    responses(
        (status = 200, description = "Comments", body = ListCommentsResponse),
    )
)]
pub(crate) async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<ChapterId>,
) -> ApiResult<impl IntoResponse> {
    let comments = state.store.list_comments(chapter_id).await?;
    Ok(Json(ListCommentsResponse { comments }))
}

/// List a chapter's reviews.
///
/// GET /api/comments/review/chapter/{chapterId}
#[utoipa::path(
    get,
    path = "/api/comments/review/chapter/{chapterId}",
    tag = "feedback",
    params(
        ("chapterId" = i64, Path, description = "Chapter ID")
    ),
    responses(
        (status = 200, description = "Reviews", body = ListReviewsResponse),
    )
)]
pub(crate) async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<ChapterId>,
) -> ApiResult<impl IntoResponse> {
    let reviews = state.store.list_reviews(chapter_id).await?;
    Ok(Json(ListReviewsResponse { reviews }))
}

/// Comment on a chapter.
///
/// POST /api/comments/comment
#[utoipa::path(
    post,
    path = "/api/comments/comment",
    tag = "feedback",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = CommentResponse),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Chapter not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn add_comment(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let Some(chapter_id) = req.chapter_id else {
        return Err(ApiError::bad_request("chapterId is required"));
    };
    let (chapter, manuscript) = load_chapter_with_manuscript(&state, chapter_id).await?;
    let Some(content) = required_text(req.content) else {
        return Err(ApiError::bad_request("Comment content is required"));
    };

    let comment = state
        .store
        .create_comment(chapter_id, ctx.user_id, content)
        .await?;
    tracing::info!(
        comment_id = comment.id.get(),
        chapter_id = chapter_id.get(),
        user_id = ctx.user_id.get(),
        "comment added"
    );

    if notifies_author(&manuscript, ctx.user_id) {
        let commenter = notify::lookup(state.store.find_user(ctx.user_id).await, "commenter");
        notify::deliver(
            &state.store,
            notify::new_comment(
                notify::display_name(commenter.as_ref()),
                &manuscript,
                &chapter,
                &comment,
            ),
        )
        .await;
    }

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            message: "Comment added".to_string(),
            comment,
        }),
    ))
}

/// Delete one of the caller's comments.
///
/// DELETE /api/comments/comment/{id}
#[utoipa::path(
    delete,
    path = "/api/comments/comment/{id}",
    tag = "feedback",
    params(
        ("id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Comment deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the comment author", body = ApiErrorBody),
        (status = 404, description = "Comment not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn delete_comment(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<CommentId>,
) -> ApiResult<impl IntoResponse> {
    let comment = state
        .store
        .find_comment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
    if comment.author_id != ctx.user_id {
        return Err(ApiError::forbidden("Permission denied"));
    }

    state.store.delete_comment(id).await?;
    tracing::info!(comment_id = id.get(), user_id = ctx.user_id.get(), "comment deleted");
    Ok(Json(MessageResponse::new("Comment deleted")))
}

/// Review a chapter.
///
/// POST /api/comments/review
#[utoipa::path(
    post,
    path = "/api/comments/review",
    tag = "feedback",
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review submitted", body = ReviewResponse),
        (status = 400, description = "Rating outside 1-5", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Chapter not found", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn add_review(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    let Some(chapter_id) = req.chapter_id else {
        return Err(ApiError::bad_request("chapterId is required"));
    };
    let (chapter, manuscript) = load_chapter_with_manuscript(&state, chapter_id).await?;
    let rating = star_rating(req.rating)?;

    let review = state
        .store
        .create_review(chapter_id, ctx.user_id, rating, required_text(req.content))
        .await?;
    tracing::info!(
        review_id = review.id.get(),
        chapter_id = chapter_id.get(),
        user_id = ctx.user_id.get(),
        rating,
        "review submitted"
    );

    if notifies_author(&manuscript, ctx.user_id) {
        let reviewer = notify::lookup(state.store.find_user(ctx.user_id).await, "reviewer");
        notify::deliver(
            &state.store,
            notify::new_review(
                notify::display_name(reviewer.as_ref()),
                &manuscript,
                &chapter,
                &review,
            ),
        )
        .await;
    }

    Ok((
        StatusCode::CREATED,
        Json(ReviewResponse {
            message: "Review submitted".to_string(),
            review,
        }),
    ))
}

// Authors are not notified about their own feedback.
fn notifies_author(manuscript: &Manuscript, actor: UserId) -> bool {
    manuscript.author_id != actor
}

fn star_rating(raw: Option<i64>) -> ApiResult<u8> {
    raw.and_then(|value| u8::try_from(value).ok())
        .filter(|stars| (1..=5).contains(stars))
        .ok_or_else(|| ApiError::bad_request("rating must be an integer between 1 and 5"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_rating_bounds() {
        assert_eq!(star_rating(Some(1)).unwrap(), 1);
        assert_eq!(star_rating(Some(5)).unwrap(), 5);
        assert!(star_rating(Some(0)).is_err());
        assert!(star_rating(Some(6)).is_err());
        assert!(star_rating(Some(-3)).is_err());
        assert!(star_rating(Some(261)).is_err());
        assert!(star_rating(None).is_err());
    }
}
