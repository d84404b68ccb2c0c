//! Account API routes.
//!
//! ## Routes
//!
//! Public (credential rate tier):
//! - `POST   /users/register` - Create an account and mail a verification OTP
//! - `POST   /users/verify-otp` - Confirm the account's email
//! - `POST   /users/login` - Exchange email and password for a bearer token
//! - `POST   /users/forgot-password` - Mail a password reset OTP
//! - `POST   /users/verify-reset-otp` - Check a reset OTP without consuming it
//! - `POST   /users/reset-password` - Set a new password with a reset OTP
//!
//! Authenticated:
//! - `GET    /users/myProfile` - Caller's profile
//! - `GET    /users/allUsers` - Account directory
//! - `PATCH  /users/updateMe` - Edit profile fields
//! - `POST   /users/update-password` - Change password
//! - `DELETE /users/deleteMe` - Delete the caller's account

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use utoipa::ToSchema;

use tales_core::id::UserId;
use tales_core::model::{User, UserRole, UserSummary};
use tales_core::observability::credential_span;
use tales_core::otp::{OtpCode, expiry_from};
use tales_core::password::{hash_password, verify_password};
use tales_store::{NewUser, ProfilePatch, StoreError};

use super::{MessageResponse, required_secret, required_text};
use crate::context::RequestContext;
use crate::error::{ApiError, ApiErrorBody, ApiResult};
use crate::mailer::{OutgoingMail, send_best_effort};
use crate::server::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Registration payload.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Display name.
    pub full_name: Option<String>,
    /// Login email.
    pub email: Option<String>,
    /// Plain-text password.
    pub password: Option<String>,
    /// `READER` (default) or `WRITER`.
    pub role: Option<String>,
}

/// Registration result.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// Outcome.
    pub message: String,
    /// New account ID.
    pub user_id: UserId,
}

/// Email plus OTP.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    /// Account email.
    pub email: Option<String>,
    /// Five-digit code from the mail.
    pub otp: Option<String>,
}

/// Login payload.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Account email.
    pub email: Option<String>,
    /// Plain-text password.
    pub password: Option<String>,
}

/// Account fields returned on login.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    /// Account ID.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// Login email.
    pub email: String,
    /// Platform role.
    pub role: UserRole,
}

/// Login result.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Outcome.
    pub message: String,
    /// Bearer token for the `Authorization` header.
    pub token: String,
    /// Logged-in account.
    pub user: LoginUser,
}

/// Email-only payload.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    /// Account email.
    pub email: Option<String>,
}

/// Password reset payload.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    /// Account email.
    pub email: Option<String>,
    /// Reset code from the mail.
    pub otp: Option<String>,
    /// Replacement password.
    pub new_password: Option<String>,
}

/// Profile of the caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    /// The account.
    pub user: User,
}

/// Profile edit result.
#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateProfileResponse {
    /// Outcome.
    pub message: String,
    /// Updated account.
    pub user: User,
}

/// Account directory.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListUsersResponse {
    /// All accounts.
    pub users: Vec<UserSummary>,
}

/// Profile fields to change; omitted fields are kept.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    /// New display name.
    pub full_name: Option<String>,
    /// New bio.
    pub bio: Option<String>,
    /// New avatar URL.
    pub avatar_url: Option<String>,
}

/// Password change payload.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    /// Password currently set.
    pub current_password: Option<String>,
    /// Replacement password.
    pub new_password: Option<String>,
}

/// Routes that do not take a bearer token.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/verify-otp", post(verify_otp))
        .route("/login", post(login))
        .route("/forgot-password", post(forgot_password))
        .route("/verify-reset-otp", post(verify_reset_otp))
        .route("/reset-password", post(reset_password))
}

/// Routes for the authenticated caller.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/myProfile", get(my_profile))
        .route("/allUsers", get(list_users))
        .route("/updateMe", patch(update_me))
        .route("/update-password", post(update_password))
        .route("/deleteMe", delete(delete_me))
}

/// Register an account.
///
/// POST /api/users/register
#[utoipa::path(
    post,
    path = "/api/users/register",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, OTP mailed", body = RegisterResponse),
        (status = 400, description = "Missing fields or email in use", body = ApiErrorBody),
        (status = 429, description = "Rate limited", body = ApiErrorBody),
    )
)]
pub(crate) async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(full_name), Some(email), Some(password)) = (
        required_text(req.full_name),
        required_text(req.email),
        required_secret(req.password),
    ) else {
        return Err(ApiError::bad_request(
            "Full Name, email, and password are required.",
        ));
    };
    let role = registration_role(req.role.as_deref())?;

    async move {
        if state.store.find_user_by_email(&email).await?.is_some() {
            return Err(ApiError::bad_request("Email already in use"));
        }

        let password_hash = hash_off_thread(password).await?;
        let otp = OtpCode::generate();
        let otp_expires_at = expiry_from(Utc::now(), state.config.otp_ttl_secs);
        let mail = OutgoingMail::otp(&email, otp.as_str(), state.config.otp_ttl_secs);

        let user = state
            .store
            .create_user(NewUser {
                full_name,
                email,
                password_hash: Some(password_hash),
                role,
                otp_code: Some(otp.into_string()),
                otp_expires_at: Some(otp_expires_at),
            })
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => ApiError::bad_request("Email already in use"),
                other => ApiError::from(other),
            })?;

        tracing::info!(user_id = user.id.get(), role = %user.role, "account registered");
        send_best_effort(state.mailer.as_ref(), mail).await;

        Ok((
            StatusCode::CREATED,
            Json(RegisterResponse {
                message: "User registered successfully. Please verify your OTP.".to_string(),
                user_id: user.id,
            }),
        ))
    }
    .instrument(credential_span("register"))
    .await
}

/// Verify an account's email.
///
/// POST /api/users/verify-otp
#[utoipa::path(
    post,
    path = "/api/users/verify-otp",
    tag = "users",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Verified (or already verified)", body = MessageResponse),
        (status = 400, description = "Invalid or expired OTP", body = ApiErrorBody),
        (status = 404, description = "Unknown email", body = ApiErrorBody),
    )
)]
pub(crate) async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(email), Some(otp)) = (required_text(req.email), required_text(req.otp)) else {
        return Err(ApiError::bad_request("Email and OTP are required."));
    };

    let user = find_by_email(&state, &email, "User not found.").await?;
    if user.otp_verified {
        return Ok(Json(MessageResponse::new("User is already verified.")));
    }
    if !user.pending_otp_matches(&otp, Utc::now()) {
        return Err(ApiError::bad_request("Invalid OTP."));
    }

    state.store.mark_verified(user.id).await?;
    tracing::info!(user_id = user.id.get(), "account verified");
    Ok(Json(MessageResponse::new(
        "Account verified successfully. You may now login.",
    )))
}

/// Log in.
///
/// POST /api/users/login
#[utoipa::path(
    post,
    path = "/api/users/login",
    tag = "users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 401, description = "Invalid email or password", body = ApiErrorBody),
        (status = 403, description = "Account not verified", body = ApiErrorBody),
        (status = 429, description = "Rate limited", body = ApiErrorBody),
    )
)]
pub(crate) async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(email), Some(password)) = (required_text(req.email), required_secret(req.password))
    else {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    async move {
        let user = state
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;
        let Some(stored_hash) = user.password_hash.clone() else {
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        };
        if !user.otp_verified {
            return Err(ApiError::forbidden("Account not verified. Please verify OTP."));
        }
        if !verify_off_thread(password, stored_hash).await? {
            tracing::info!(user_id = user.id.get(), "login rejected");
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }

        let token = state.tokens.issue(user.id, user.role)?;
        tracing::info!(user_id = user.id.get(), "login succeeded");
        Ok(Json(LoginResponse {
            message: "Login successful".to_string(),
            token,
            user: LoginUser {
                id: user.id,
                full_name: user.full_name,
                email: user.email,
                role: user.role,
            },
        }))
    }
    .instrument(credential_span("login"))
    .await
}

/// Mail a password reset code.
///
/// POST /api/users/forgot-password
#[utoipa::path(
    post,
    path = "/api/users/forgot-password",
    tag = "users",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset OTP mailed", body = MessageResponse),
        (status = 400, description = "Email missing", body = ApiErrorBody),
        (status = 404, description = "Unknown email", body = ApiErrorBody),
    )
)]
pub(crate) async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let Some(email) = required_text(req.email) else {
        return Err(ApiError::bad_request("Email is required."));
    };

    async move {
        let user = find_by_email(&state, &email, "User with this email does not exist.").await?;

        let otp = OtpCode::generate();
        let expires_at = expiry_from(Utc::now(), state.config.otp_ttl_secs);
        let mail = OutgoingMail::otp(&user.email, otp.as_str(), state.config.otp_ttl_secs);
        state
            .store
            .set_otp(user.id, otp.into_string(), expires_at)
            .await?;
        send_best_effort(state.mailer.as_ref(), mail).await;

        Ok(Json(MessageResponse::new(
            "Password reset OTP sent to your email.",
        )))
    }
    .instrument(credential_span("forgot_password"))
    .await
}

/// Check a reset code.
///
/// POST /api/users/verify-reset-otp
#[utoipa::path(
    post,
    path = "/api/users/verify-reset-otp",
    tag = "users",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "OTP valid", body = MessageResponse),
        (status = 400, description = "Missing fields or invalid OTP", body = ApiErrorBody),
        (status = 404, description = "Unknown email", body = ApiErrorBody),
    )
)]
pub(crate) async fn verify_reset_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(email), Some(otp)) = (required_text(req.email), required_text(req.otp)) else {
        return Err(ApiError::bad_request("Email and OTP are required."));
    };

    let user = find_by_email(&state, &email, "User not found.").await?;
    if !user.pending_otp_matches(&otp, Utc::now()) {
        return Err(ApiError::bad_request("Invalid OTP."));
    }
    Ok(Json(MessageResponse::new(
        "OTP verified successfully. You can now reset your password.",
    )))
}

/// Reset the password with a mailed code.
///
/// POST /api/users/reset-password
#[utoipa::path(
    post,
    path = "/api/users/reset-password",
    tag = "users",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced", body = MessageResponse),
        (status = 400, description = "Missing fields or invalid OTP", body = ApiErrorBody),
        (status = 404, description = "Unknown email", body = ApiErrorBody),
    )
)]
pub(crate) async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(email), Some(otp), Some(new_password)) = (
        required_text(req.email),
        required_text(req.otp),
        required_secret(req.new_password),
    ) else {
        return Err(ApiError::bad_request(
            "Email, OTP, and new password are required.",
        ));
    };

    async move {
        let user = find_by_email(&state, &email, "User not found.").await?;
        if !user.pending_otp_matches(&otp, Utc::now()) {
            return Err(ApiError::bad_request("Invalid or expired OTP."));
        }

        let hash = hash_off_thread(new_password).await?;
        state.store.reset_password(user.id, hash).await?;
        tracing::info!(user_id = user.id.get(), "password reset");

        Ok(Json(MessageResponse::new(
            "Password reset successful. You can now login with your new password.",
        )))
    }
    .instrument(credential_span("reset_password"))
    .await
}

/// Get the caller's profile.
///
/// GET /api/users/myProfile
#[utoipa::path(
    get,
    path = "/api/users/myProfile",
    tag = "users",
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Account no longer exists", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn my_profile(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .store
        .find_user(ctx.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(ProfileResponse { user }))
}

/// List all accounts.
///
/// GET /api/users/allUsers
#[utoipa::path(
    get,
    path = "/api/users/allUsers",
    tag = "users",
    responses(
        (status = 200, description = "Accounts", body = ListUsersResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn list_users(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    tracing::debug!(user_id = ctx.user_id.get(), "listing users");
    let users = state.store.list_users().await?;
    Ok(Json(ListUsersResponse { users }))
}

/// Edit the caller's profile.
///
/// PATCH /api/users/updateMe
#[utoipa::path(
    patch,
    path = "/api/users/updateMe",
    tag = "users",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UpdateProfileResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Account no longer exists", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn update_me(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let patch = ProfilePatch {
        full_name: required_text(req.full_name),
        bio: req.bio,
        avatar_url: req.avatar_url,
    };
    let user = state
        .store
        .update_profile(ctx.user_id, patch)
        .await
        .map_err(user_not_found)?;
    Ok(Json(UpdateProfileResponse {
        message: "Profile updated".to_string(),
        user,
    }))
}

/// Change the caller's password.
///
/// POST /api/users/update-password
#[utoipa::path(
    post,
    path = "/api/users/update-password",
    tag = "users",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Missing fields", body = ApiErrorBody),
        (status = 401, description = "Wrong current password", body = ApiErrorBody),
        (status = 404, description = "Account no longer exists", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn update_password(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdatePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(current), Some(replacement)) = (
        required_secret(req.current_password),
        required_secret(req.new_password),
    ) else {
        return Err(ApiError::bad_request(
            "Current and new password are required.",
        ));
    };

    async move {
        let stored_hash = state
            .store
            .find_user(ctx.user_id)
            .await?
            .and_then(|user| user.password_hash)
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        if !verify_off_thread(current, stored_hash).await? {
            return Err(ApiError::unauthorized("Invalid current password"));
        }

        let hash = hash_off_thread(replacement).await?;
        state
            .store
            .set_password_hash(ctx.user_id, hash)
            .await
            .map_err(user_not_found)?;
        tracing::info!(user_id = ctx.user_id.get(), "password changed");
        Ok(Json(MessageResponse::new("Password updated successfully")))
    }
    .instrument(credential_span("update_password"))
    .await
}

/// Delete the caller's account.
///
/// DELETE /api/users/deleteMe
#[utoipa::path(
    delete,
    path = "/api/users/deleteMe",
    tag = "users",
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Account no longer exists", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn delete_me(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .delete_user(ctx.user_id)
        .await
        .map_err(user_not_found)?;
    tracing::info!(
        user_id = ctx.user_id.get(),
        request_id = %ctx.request_id,
        "account deleted"
    );
    Ok(Json(MessageResponse::new("User deleted successfully")))
}

fn registration_role(raw: Option<&str>) -> ApiResult<UserRole> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(UserRole::default());
    };
    match raw.parse::<UserRole>() {
        Ok(role @ (UserRole::Reader | UserRole::Writer)) => Ok(role),
        _ => Err(ApiError::bad_request("role must be READER or WRITER")),
    }
}

async fn find_by_email(state: &AppState, email: &str, missing: &'static str) -> ApiResult<User> {
    state
        .store
        .find_user_by_email(email)
        .await?
        .ok_or_else(|| ApiError::not_found(missing))
}

fn user_not_found(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound { .. } => ApiError::not_found("User not found"),
        other => ApiError::from(other),
    }
}

// Argon2 is deliberately slow; keep it off the async workers.
async fn hash_off_thread(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::internal(format!("password hashing task failed: {e}")))?
        .map_err(ApiError::from)
}

async fn verify_off_thread(password: String, stored_hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| ApiError::internal(format!("password verification task failed: {e}")))
}
