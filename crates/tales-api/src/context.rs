//! Request context extraction and request-id propagation.
//!
//! Every request gets a request id: the caller's `X-Request-Id` when present,
//! otherwise a fresh ULID. Protected handlers take a [`RequestContext`], which
//! verifies the bearer token issued at login. In debug mode an `X-User-Id`
//! header is accepted instead (local development only).

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use ulid::Ulid;

use tales_core::id::UserId;
use tales_core::model::UserRole;

use crate::error::ApiError;
use crate::server::AppState;

/// Header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header naming the caller in debug mode.
pub const DEBUG_USER_HEADER: &str = "x-user-id";

/// Correlation id attached to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Authenticated caller of a protected route.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Caller's account.
    pub user_id: UserId,
    /// Role claimed by the token (or `READER` for debug-header callers).
    pub role: UserRole,
    /// Request ID for tracing/correlation.
    pub request_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return Ok(existing.clone());
        }

        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .or_else(|| request_id_from_headers(&parts.headers))
            .unwrap_or_else(|| Ulid::new().to_string());

        let ctx = if state.config.debug && bearer_token(&parts.headers).is_none() {
            extract_from_debug_header(&parts.headers, &request_id)?
        } else {
            extract_from_jwt(&parts.headers, state, &request_id)?
        };

        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

fn extract_from_debug_header(
    headers: &HeaderMap,
    request_id: &str,
) -> Result<RequestContext, ApiError> {
    let raw = header_string(headers, DEBUG_USER_HEADER)
        .ok_or_else(|| ApiError::missing_auth().with_request_id(request_id.to_string()))?;
    let user_id = raw.parse::<UserId>().map_err(|_| {
        ApiError::unauthorized("X-User-Id must be an integer (debug mode)")
            .with_request_id(request_id.to_string())
    })?;
    Ok(RequestContext {
        user_id,
        role: UserRole::default(),
        request_id: request_id.to_string(),
    })
}

fn extract_from_jwt(
    headers: &HeaderMap,
    state: &AppState,
    request_id: &str,
) -> Result<RequestContext, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::missing_auth().with_request_id(request_id.to_string()))?;

    let claims = state.tokens.verify(&token).map_err(|err| {
        tracing::debug!(request_id = %request_id, error = %err, "bearer token rejected");
        ApiError::invalid_token().with_request_id(request_id.to_string())
    })?;
    let user_id = claims
        .user_id()
        .map_err(|_| ApiError::invalid_token().with_request_id(request_id.to_string()))?;

    Ok(RequestContext {
        user_id,
        role: claims.role,
        request_id: request_id.to_string(),
    })
}

fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    header_string(headers, "X-Request-Id").filter(|id| !id.trim().is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_string(headers, "Authorization")?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    value.to_str().ok().map(str::to_string)
}

/// Assigns a request id and echoes it on the response.
///
/// Runs outermost so that every response, including rejections from
/// extractors and rate limiting, carries `x-request-id`.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let request_id =
        request_id_from_headers(req.headers()).unwrap_or_else(|| Ulid::new().to_string());
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
