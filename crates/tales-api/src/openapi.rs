//! `OpenAPI` (3.0) specification generation for `tales-api`.
//!
//! Served at `/openapi.json` and written to stdout by the `gen_openapi` binary.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// `OpenAPI` documentation for the YourTales REST API (`/api/*`).
#[derive(OpenApi)]
#[openapi(
    info(
        title = "YourTales API",
        description = "Manuscript writing, collaboration, and feedback platform"
    ),
    paths(
        crate::routes::users::register,
        crate::routes::users::verify_otp,
        crate::routes::users::login,
        crate::routes::users::forgot_password,
        crate::routes::users::verify_reset_otp,
        crate::routes::users::reset_password,
        crate::routes::users::my_profile,
        crate::routes::users::list_users,
        crate::routes::users::update_me,
        crate::routes::users::update_password,
        crate::routes::users::delete_me,
        crate::routes::manuscripts::list_published,
        crate::routes::manuscripts::list_mine,
        crate::routes::manuscripts::dashboard_stats,
        crate::routes::manuscripts::get_manuscript,
        crate::routes::manuscripts::create_manuscript,
        crate::routes::manuscripts::update_manuscript,
        crate::routes::manuscripts::delete_manuscript,
        crate::routes::manuscripts::invite_collaborator,
        crate::routes::manuscripts::respond_to_invitation,
        crate::routes::chapters::list_chapters,
        crate::routes::chapters::create_chapter,
        crate::routes::chapters::update_chapter,
        crate::routes::chapters::delete_chapter,
        crate::routes::comments::list_comments,
        crate::routes::comments::list_reviews,
        crate::routes::comments::add_comment,
        crate::routes::comments::delete_comment,
        crate::routes::comments::add_review,
        crate::routes::notifications::list_notifications,
        crate::routes::notifications::mark_read,
        crate::routes::notifications::mark_all_read,
        crate::routes::notifications::delete_notification,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::routes::MessageResponse,
            crate::routes::users::RegisterRequest,
            crate::routes::users::RegisterResponse,
            crate::routes::users::VerifyOtpRequest,
            crate::routes::users::LoginRequest,
            crate::routes::users::LoginUser,
            crate::routes::users::LoginResponse,
            crate::routes::users::ForgotPasswordRequest,
            crate::routes::users::ResetPasswordRequest,
            crate::routes::users::ProfileResponse,
            crate::routes::users::UpdateProfileRequest,
            crate::routes::users::UpdateProfileResponse,
            crate::routes::users::UpdatePasswordRequest,
            crate::routes::users::ListUsersResponse,
            crate::routes::manuscripts::CreateManuscriptRequest,
            crate::routes::manuscripts::UpdateManuscriptRequest,
            crate::routes::manuscripts::ManuscriptResponse,
            crate::routes::manuscripts::PublishedListResponse,
            crate::routes::manuscripts::MemberListResponse,
            crate::routes::manuscripts::ManuscriptDetailResponse,
            crate::routes::manuscripts::StatsBody,
            crate::routes::manuscripts::StatsResponse,
            crate::routes::manuscripts::InviteRequest,
            crate::routes::manuscripts::RespondRequest,
            crate::routes::manuscripts::CollaborationResponse,
            crate::routes::chapters::CreateChapterRequest,
            crate::routes::chapters::UpdateChapterRequest,
            crate::routes::chapters::ChapterResponse,
            crate::routes::chapters::ListChaptersResponse,
            crate::routes::comments::CreateCommentRequest,
            crate::routes::comments::CreateReviewRequest,
            crate::routes::comments::CommentResponse,
            crate::routes::comments::ReviewResponse,
            crate::routes::comments::ListCommentsResponse,
            crate::routes::comments::ListReviewsResponse,
            crate::routes::notifications::ListNotificationsResponse,
            crate::routes::notifications::NotificationResponse,
            tales_core::model::User,
            tales_core::model::UserSummary,
            tales_core::model::AuthorSummary,
            tales_core::model::UserRole,
            tales_core::model::Manuscript,
            tales_core::model::ManuscriptStatus,
            tales_core::model::ChapterRef,
            tales_core::model::Chapter,
            tales_core::model::Collaboration,
            tales_core::model::CollaborationRole,
            tales_core::model::CollaborationStatus,
            tales_core::model::Comment,
            tales_core::model::Review,
            tales_core::model::Notification,
            tales_core::model::NotificationType,
            tales_core::model::PublishedManuscript,
            tales_core::model::MemberManuscript,
            tales_core::model::CollaboratorEntry,
            tales_core::model::ManuscriptDetail,
            tales_core::model::CommentView,
            tales_core::model::ReviewView,
        )
    ),
    tags(
        (name = "users", description = "Accounts, one-time passcodes, and profiles"),
        (name = "manuscripts", description = "Manuscripts, dashboard stats, and collaboration"),
        (name = "chapters", description = "Chapter operations"),
        (name = "feedback", description = "Chapter comments and reviews"),
        (name = "notifications", description = "Per-user notification inbox"),
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Returns the generated `OpenAPI` spec.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Returns the generated `OpenAPI` spec serialized as pretty JSON.
///
/// # Errors
///
/// Returns an error if JSON serialization fails (should not happen).
pub fn openapi_json() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&openapi())
}
