//! API server implementation.
//!
//! Wires the store, mailer, token service, and middleware stack into one
//! router and serves it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderValue, Method, Request, StatusCode, Uri, header};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tales_core::Result;
use tales_store::Store;

use crate::auth::TokenService;
use crate::config::{Config, CorsConfig};
use crate::mailer::Mailer;
use crate::rate_limit::{RateLimitConfig, RateLimitState};

// ============================================================================
// Health and Ready Responses
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Service readiness status.
    pub ready: bool,
    /// Optional message about readiness state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all request handlers.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Database handle.
    pub store: Store,
    /// Outbound mail transport.
    pub mailer: Arc<dyn Mailer>,
    /// Bearer token issuing and verification.
    pub tokens: TokenService,
    /// Rate limiting state (shared across clients).
    rate_limit: Arc<RateLimitState>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("mailer", &self.mailer)
            .field("tokens", &self.tokens)
            .field("rate_limit", &"<RateLimitState>")
            .finish()
    }
}

impl AppState {
    /// Creates application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the token service cannot be configured.
    pub fn new(config: Config, store: Store, mailer: Arc<dyn Mailer>) -> Result<Self> {
        let tokens = TokenService::from_config(&config.jwt, config.debug)?;
        let rate_limit = Arc::new(RateLimitState::new(config.rate_limit.clone()));
        Ok(Self {
            config,
            store,
            mailer,
            tokens,
            rate_limit,
        })
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn welcome() -> &'static str {
    "Welcome to the YourTales API"
}

/// Health check endpoint handler.
///
/// Shallow liveness check; does not touch the database.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check endpoint handler.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                message: Some(format!("database check failed: {e}")),
            }),
        ),
    }
}

async fn openapi_spec() -> impl IntoResponse {
    Json(crate::openapi::openapi())
}

// ============================================================================
// Path normalization
// ============================================================================

/// Collapses runs of `/` in the request path before routing.
fn collapse_slashes(mut req: Request<Body>) -> Request<Body> {
    let path = req.uri().path();
    if !path.contains("//") {
        return req;
    }

    let collapsed = collapse_path(path);
    let path_and_query = match req.uri().query() {
        Some(query) => format!("{collapsed}?{query}"),
        None => collapsed,
    };

    let mut parts = req.uri().clone().into_parts();
    match path_and_query.parse::<PathAndQuery>() {
        Ok(pq) => {
            parts.path_and_query = Some(pq);
            if let Ok(uri) = Uri::from_parts(parts) {
                *req.uri_mut() = uri;
            }
        }
        Err(e) => tracing::debug!(error = %e, "could not rewrite request path"),
    }
    req
}

fn collapse_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for ch in path.chars() {
        let slash = ch == '/';
        if !(slash && previous_slash) {
            out.push(ch);
        }
        previous_slash = slash;
    }
    out
}

// ============================================================================
// Server
// ============================================================================

/// The YourTales API server.
pub struct Server {
    config: Config,
    store: Store,
    mailer: Arc<dyn Mailer>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("mailer", &self.mailer)
            .finish()
    }
}

impl Server {
    /// Creates a server over `store`, with the mail transport chosen by configuration.
    #[must_use]
    pub fn new(config: Config, store: Store) -> Self {
        let mailer = crate::mailer::from_config(&config.mail);
        Self {
            config,
            store,
            mailer,
        }
    }

    /// Creates a new `ServerBuilder`.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the router with all routes and middleware.
    fn create_router(&self) -> Result<Router> {
        let state = Arc::new(AppState::new(
            self.config.clone(),
            self.store.clone(),
            Arc::clone(&self.mailer),
        )?);

        let cors = self.build_cors_layer();

        let credential_rate_limit_layer = middleware::from_fn_with_state(
            Arc::clone(&state.rate_limit),
            crate::rate_limit::credential_rate_limit_middleware,
        );
        let rate_limit_layer = middleware::from_fn_with_state(
            Arc::clone(&state.rate_limit),
            crate::rate_limit::rate_limit_middleware,
        );
        let metrics_layer = middleware::from_fn(crate::metrics::metrics_middleware);

        let app = Router::new()
            // Service endpoints (no auth required)
            .route("/", get(welcome))
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/metrics", get(crate::metrics::serve_metrics))
            .route("/openapi.json", get(openapi_spec))
            // Account creation and recovery draw from the tighter quota.
            .nest(
                "/api",
                crate::routes::credential_routes().route_layer(credential_rate_limit_layer),
            )
            // Everything else (auth via RequestContext extractor)
            .nest(
                "/api",
                crate::routes::api_routes().route_layer(rate_limit_layer),
            )
            // Middleware (order matters): Metrics outermost for timing, then trace, then CORS.
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(metrics_layer)
            .with_state(state);

        // Paths must be rewritten before the inner router matches them.
        let normalized = ServiceBuilder::new()
            .map_request(collapse_slashes)
            .service(app);

        Ok(Router::new()
            .fallback_service(normalized)
            .layer(middleware::from_fn(crate::context::request_id_middleware)))
    }

    /// Builds the CORS layer from configuration.
    fn build_cors_layer(&self) -> CorsLayer {
        let cors_config = &self.config.cors;
        let cors = Self::build_cors_base(cors_config);
        Self::apply_cors_allowed_origins(cors, cors_config)
    }

    fn build_cors_base(cors_config: &CorsConfig) -> CorsLayer {
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::HeaderName::from_static("x-request-id"),
            ])
            .expose_headers([
                header::CONTENT_TYPE,
                header::CONTENT_LENGTH,
                header::HeaderName::from_static("x-request-id"),
                header::HeaderName::from_static("x-ratelimit-limit"),
                header::HeaderName::from_static("x-ratelimit-remaining"),
                header::RETRY_AFTER,
            ])
            .max_age(Duration::from_secs(cors_config.max_age_seconds))
    }

    fn cors_allows_any_origin(cors_config: &CorsConfig) -> bool {
        cors_config.allowed_origins.len() == 1
            && cors_config
                .allowed_origins
                .first()
                .is_some_and(|origin| origin == "*")
    }

    fn parse_cors_origins(cors_config: &CorsConfig) -> Vec<HeaderValue> {
        let mut allowed = Vec::new();
        for origin in &cors_config.allowed_origins {
            match HeaderValue::from_str(origin) {
                Ok(value) => allowed.push(value),
                Err(_) => {
                    tracing::error!(
                        origin = %origin,
                        "Invalid CORS origin; expected a valid HeaderValue"
                    );
                }
            }
        }
        allowed
    }

    fn apply_cors_allowed_origins(cors: CorsLayer, cors_config: &CorsConfig) -> CorsLayer {
        if cors_config.allowed_origins.is_empty() {
            return cors;
        }

        if Self::cors_allows_any_origin(cors_config) {
            return cors.allow_origin(Any);
        }

        if cors_config
            .allowed_origins
            .iter()
            .any(|origin| origin == "*")
        {
            tracing::error!(
                origins = ?cors_config.allowed_origins,
                "Invalid CORS config: '*' must be the only allowed origin"
            );
            return cors;
        }

        let allowed = Self::parse_cors_origins(cors_config);

        if allowed.is_empty() {
            tracing::warn!("All configured CORS origins were invalid; disabling CORS");
            cors
        } else {
            tracing::info!(origins = ?cors_config.allowed_origins, "CORS configured");
            cors.allow_origin(AllowOrigin::list(allowed))
        }
    }

    /// Starts the server and blocks until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unsafe, or the server cannot
    /// start or bind to the port.
    pub async fn serve(&self) -> Result<()> {
        self.config.validate()?;

        crate::metrics::init_metrics();

        let addr = format!("{}:{}", self.config.http_host, self.config.http_port);
        let router = self.create_router()?;

        tracing::info!(
            http_host = %self.config.http_host,
            http_port = self.config.http_port,
            database = %self.config.database_path.display(),
            "Starting YourTales API server"
        );

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| tales_core::Error::Internal {
                message: format!("failed to bind to {addr}: {e}"),
            })?;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| tales_core::Error::Internal {
            message: format!("server error: {e}"),
        })?;

        tracing::info!("YourTales API server stopped");
        Ok(())
    }

    /// Creates a test router for the server.
    ///
    /// Routes are served without binding a port; client addresses are not
    /// available, so every request shares one rate-limit bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the token service cannot be configured.
    #[doc(hidden)]
    pub fn test_router(&self) -> Result<Router> {
        self.create_router()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Builder for constructing a server.
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: Config,
    store: Option<Store>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl ServerBuilder {
    /// Creates a new server builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the HTTP port.
    #[must_use]
    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http_port = port;
        self
    }

    /// Enables debug mode.
    ///
    /// See `Config::debug` for behavior changes.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Sets the JWT HS256 secret used to sign and verify bearer tokens.
    ///
    /// Required when `debug` is false.
    #[must_use]
    pub fn jwt_hs256_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt.hs256_secret = Some(secret.into());
        self
    }

    /// Sets the one-time passcode lifetime.
    #[must_use]
    pub fn otp_ttl_secs(mut self, secs: u64) -> Self {
        self.config.otp_ttl_secs = secs;
        self
    }

    /// Sets the rate limiting configuration.
    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    /// Sets the database handle.
    ///
    /// By default, the server opens a private in-memory database.
    #[must_use]
    pub fn store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the mail transport.
    ///
    /// By default, the transport is chosen from `Config::mail`.
    #[must_use]
    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Builds the server.
    ///
    /// # Errors
    ///
    /// Returns an error if no store was given and the in-memory database
    /// cannot be created.
    pub fn build(self) -> Result<Server> {
        let store = match self.store {
            Some(store) => store,
            None => Store::open_in_memory().map_err(|e| tales_core::Error::Internal {
                message: format!("failed to open in-memory database: {e}"),
            })?,
        };
        let mailer = self
            .mailer
            .unwrap_or_else(|| crate::mailer::from_config(&self.config.mail));
        Ok(Server {
            config: self.config,
            store,
            mailer,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_server() -> Result<Server> {
        Ok(ServerBuilder::new().debug(true).build()?)
    }

    #[tokio::test]
    async fn test_health_endpoint() -> Result<()> {
        let router = test_server()?.test_router()?;

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .context("build request")?;

        let response = router.oneshot(request).await.map_err(|err| match err {})?;

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .context("read response body")?;
        let health: HealthResponse = serde_json::from_slice(&body).context("parse JSON body")?;
        assert_eq!(health.status, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn test_ready_endpoint() -> Result<()> {
        let router = test_server()?.test_router()?;

        let request = Request::builder()
            .uri("/ready")
            .body(Body::empty())
            .context("build request")?;

        let response = router.oneshot(request).await.map_err(|err| match err {})?;

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .context("read response body")?;
        let ready: ReadyResponse = serde_json::from_slice(&body).context("parse JSON body")?;
        assert!(ready.ready);
        Ok(())
    }

    #[tokio::test]
    async fn test_welcome_text() -> Result<()> {
        let router = test_server()?.test_router()?;

        let request = Request::builder()
            .uri("/")
            .body(Body::empty())
            .context("build request")?;
        let response = router.oneshot(request).await.map_err(|err| match err {})?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .context("read response body")?;
        assert_eq!(&body[..], b"Welcome to the YourTales API");
        Ok(())
    }

    #[tokio::test]
    async fn test_double_slashes_are_collapsed() -> Result<()> {
        let router = test_server()?.test_router()?;

        let request = Request::builder()
            .uri("//health")
            .body(Body::empty())
            .context("build request")?;
        let response = router.oneshot(request).await.map_err(|err| match err {})?;

        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() -> Result<()> {
        let router = test_server()?.test_router()?;

        let request = Request::builder()
            .uri("/does-not-exist")
            .header("x-request-id", "req-42")
            .body(Body::empty())
            .context("build request")?;
        let response = router.oneshot(request).await.map_err(|err| match err {})?;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok()),
            Some("req-42")
        );
        Ok(())
    }

    #[test]
    fn test_router_requires_secret_outside_debug() -> Result<()> {
        let server = ServerBuilder::new().build()?;
        assert!(server.test_router().is_err());
        Ok(())
    }

    #[test]
    fn collapse_path_keeps_single_slashes() {
        assert_eq!(collapse_path("//api///users//login"), "/api/users/login");
        assert_eq!(collapse_path("/api/users/"), "/api/users/");
        assert_eq!(collapse_path("/"), "/");
    }

    #[test]
    fn collapse_slashes_preserves_query() {
        let req = Request::builder()
            .uri("http://localhost//api//notifications?type=REVIEW&isRead=false")
            .body(Body::empty())
            .unwrap();
        let req = collapse_slashes(req);
        assert_eq!(req.uri().path(), "/api/notifications");
        assert_eq!(req.uri().query(), Some("type=REVIEW&isRead=false"));
    }

    #[test]
    fn cors_wildcard_must_stand_alone() {
        let config = CorsConfig {
            allowed_origins: vec!["*".to_string()],
            max_age_seconds: 60,
        };
        assert!(Server::cors_allows_any_origin(&config));

        let mixed = CorsConfig {
            allowed_origins: vec!["*".to_string(), "https://yourtales.app".to_string()],
            max_age_seconds: 60,
        };
        assert!(!Server::cors_allows_any_origin(&mixed));
    }
}
