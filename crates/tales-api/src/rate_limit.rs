//! Per-client rate limiting.
//!
//! Clients are keyed by their peer address. Behind a reverse proxy, setting
//! `trust_forwarded_for` keys them by the first `X-Forwarded-For` hop instead;
//! the header is ignored otherwise. Public credential endpoints (register,
//! login, OTP, password reset) draw from a separate, smaller quota so that OTP
//! guessing and mail flooding are throttled well before ordinary traffic.
//!
//! ## Response Headers
//!
//! When rate limited, returns:
//! - `429 Too Many Requests` status
//! - `Retry-After` header with seconds to wait
//! - `X-RateLimit-Limit` with the configured limit
//! - `X-RateLimit-Remaining` with remaining quota

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};

use crate::context::RequestId;
use crate::error::ApiError;

/// Checks between sweeps of idle client entries.
const SWEEP_EVERY: u64 = 1024;

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Default requests per minute per client.
    #[serde(default = "default_requests_per_minute")]
    pub default_requests_per_minute: u32,

    /// Credential endpoint requests per minute per client.
    #[serde(default = "default_auth_per_minute")]
    pub auth_requests_per_minute: u32,

    /// Maximum burst size (requests allowed above steady rate).
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Key clients by the first `X-Forwarded-For` hop.
    ///
    /// Only safe when every request arrives through a proxy that overwrites
    /// the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

const fn default_enabled() -> bool {
    true
}

const fn default_requests_per_minute() -> u32 {
    300
}

const fn default_auth_per_minute() -> u32 {
    20
}

const fn default_burst_size() -> u32 {
    30
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_requests_per_minute: default_requests_per_minute(),
            auth_requests_per_minute: default_auth_per_minute(),
            burst_size: default_burst_size(),
            trust_forwarded_for: false,
        }
    }
}

/// Quota a route draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitTier {
    /// Ordinary API traffic.
    Default,
    /// Public credential endpoints.
    Credentials,
}

type ClientLimiter =
    RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock, StateInformationMiddleware>;

fn keyed_limiter(requests_per_minute: u32, burst_size: u32) -> ClientLimiter {
    let replenish_rate = NonZeroU32::new(requests_per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst_size.max(1)).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::per_minute(replenish_rate).allow_burst(burst);
    RateLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>()
}

/// Rate limiting state shared across all request handlers.
pub struct RateLimitState {
    config: RateLimitConfig,
    default_limiter: ClientLimiter,
    credential_limiter: ClientLimiter,
    checks: AtomicU64,
}

impl std::fmt::Debug for RateLimitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitState")
            .field("config", &self.config)
            .field("default_clients", &self.default_limiter.len())
            .field("credential_clients", &self.credential_limiter.len())
            .finish_non_exhaustive()
    }
}

impl RateLimitState {
    /// Creates new rate limit state with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let default_limiter = keyed_limiter(config.default_requests_per_minute, config.burst_size);
        let credential_limiter = keyed_limiter(
            config.auth_requests_per_minute,
            Self::credential_burst(&config),
        );
        Self {
            config,
            default_limiter,
            credential_limiter,
            checks: AtomicU64::new(0),
        }
    }

    fn credential_burst(config: &RateLimitConfig) -> u32 {
        (config.burst_size / 3).max(1)
    }

    /// Whether the first `X-Forwarded-For` hop identifies the client.
    #[must_use]
    pub fn trusts_forwarded_for(&self) -> bool {
        self.config.trust_forwarded_for
    }

    /// Number of clients currently tracked by `tier`.
    #[must_use]
    pub fn tracked_clients(&self, tier: RateLimitTier) -> usize {
        self.limiter(tier).len()
    }

    fn limiter(&self, tier: RateLimitTier) -> &ClientLimiter {
        match tier {
            RateLimitTier::Default => &self.default_limiter,
            RateLimitTier::Credentials => &self.credential_limiter,
        }
    }

    /// Drops clients whose quota has fully replenished.
    pub fn sweep(&self) {
        for limiter in [&self.default_limiter, &self.credential_limiter] {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Checks the quota of `tier` for `client`.
    pub fn check(&self, tier: RateLimitTier, client: &str) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::Allowed {
                limit: 0,
                remaining: 0,
            };
        }

        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }

        let limit = match tier {
            RateLimitTier::Default => self.config.default_requests_per_minute,
            RateLimitTier::Credentials => self.config.auth_requests_per_minute,
        };

        match self.limiter(tier).check_key(&client.to_string()) {
            Ok(snapshot) => RateLimitResult::Allowed {
                limit,
                remaining: snapshot.remaining_burst_capacity(),
            },
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                RateLimitResult::Limited {
                    limit,
                    retry_after_secs: wait.as_secs().max(1),
                }
            }
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug)]
pub enum RateLimitResult {
    /// Request is allowed.
    Allowed {
        /// Configured limit.
        limit: u32,
        /// Remaining burst capacity.
        remaining: u32,
    },
    /// Request is rate limited.
    Limited {
        /// Configured limit.
        limit: u32,
        /// Seconds until the client can retry.
        retry_after_secs: u64,
    },
}

/// Identifies the client a request is charged to.
pub(crate) fn client_key(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    let forwarded = if trust_forwarded_for {
        forwarded_for(req.headers())
    } else {
        None
    };
    forwarded
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "anonymous".to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .map(str::trim)
        .find(|hop| !hop.is_empty())
        .map(str::to_string)
}

/// Default-tier middleware.
pub async fn rate_limit_middleware(
    State(rate_limit): State<Arc<RateLimitState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    enforce(&rate_limit, RateLimitTier::Default, req, next).await
}

/// Credential-tier middleware for the public account endpoints.
pub async fn credential_rate_limit_middleware(
    State(rate_limit): State<Arc<RateLimitState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    enforce(&rate_limit, RateLimitTier::Credentials, req, next).await
}

async fn enforce(
    rate_limit: &RateLimitState,
    tier: RateLimitTier,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client = client_key(&req, rate_limit.trusts_forwarded_for());
    let endpoint = crate::metrics::endpoint_label(&req);
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map_or_else(|| "-".to_string(), |id| id.0.clone());

    match rate_limit.check(tier, &client) {
        RateLimitResult::Allowed { limit, remaining } => {
            let mut response = next.run(req).await;
            if limit > 0 {
                add_rate_limit_headers(response.headers_mut(), limit, remaining);
            }
            response
        }
        RateLimitResult::Limited {
            limit,
            retry_after_secs,
        } => {
            tracing::warn!(
                client = %client,
                endpoint = %endpoint,
                tier = ?tier,
                request_id = %request_id,
                limit = limit,
                retry_after_secs = retry_after_secs,
                "Rate limit exceeded"
            );
            crate::metrics::record_rate_limit_hit(endpoint.as_str());

            let mut response = ApiError::too_many_requests(format!(
                "Rate limit exceeded. Limit: {limit} requests per minute. Retry after {retry_after_secs} seconds."
            ))
            .with_request_id(request_id)
            .with_retry_after(retry_after_secs)
            .into_response();
            add_rate_limit_headers(response.headers_mut(), limit, 0);
            response
        }
    }
}

fn add_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert(header::HeaderName::from_static("x-ratelimit-limit"), v);
    }
    if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert(header::HeaderName::from_static("x-ratelimit-remaining"), v);
    }
}
