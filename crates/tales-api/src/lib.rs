//! # tales-api
//!
//! HTTP API for the YourTales manuscript platform.
//!
//! This crate provides the API surface, handling:
//!
//! - **Accounts**: Registration with emailed one-time passcodes, login, password reset
//! - **Authentication**: HS256 bearer tokens issued at login
//! - **Routing**: Manuscript, chapter, feedback, and notification endpoints
//! - **Side Effects**: Best-effort notifications and outbound mail
//! - **Observability**: Metrics, tracing, rate limiting, and health checks
//!
//! Persistence lives in `tales-store`; shared types and access rules in `tales-core`.
//!
//! ## Endpoints
//!
//! ```text
//! HTTP:
//!   GET  /                        - Welcome text
//!   GET  /health                  - Health check
//!   GET  /ready                   - Readiness check (database)
//!   GET  /metrics                 - Prometheus metrics
//!   GET  /openapi.json            - OpenAPI document
//!   /api/users                    - Accounts, passcodes, profiles
//!   /api/manuscripts              - Manuscripts, stats, invitations
//!   /api/chapters                 - Chapters
//!   /api/comments                 - Comments and reviews
//!   /api/notifications            - Notification inbox
//! ```
//!
//! Repeated slashes in request paths are collapsed before routing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tales_api::server::Server;
//!
//! let server = Server::builder()
//!     .http_port(8000)
//!     .jwt_hs256_secret(secret)
//!     .build()?;
//!
//! server.serve().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod mailer;
pub mod metrics;
pub(crate) mod notify;
pub mod openapi;
pub mod rate_limit;
pub mod routes;
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::RequestContext;
    pub use crate::error::{ApiError, ApiResult};
    pub use crate::mailer::{Mailer, MemoryMailer};
    pub use crate::server::{Server, ServerBuilder};
}
