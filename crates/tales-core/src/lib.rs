//! # tales-core
//!
//! Core abstractions for the YourTales manuscript platform.
//!
//! This crate provides the foundational types used across the backend:
//!
//! - **Identifiers**: Strongly-typed integer IDs for every persisted entity
//! - **Domain Model**: Users, manuscripts, chapters, collaborations, feedback, notifications
//! - **Access Rules**: Author / accepted-editor checks gating manuscript mutations
//! - **Credentials**: One-time passcodes and password hashing
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `tales-core` has no I/O. Persistence lives in `tales-store` and the HTTP
//! surface in `tales-api`.
//!
//! ## Example
//!
//! ```rust
//! use tales_core::prelude::*;
//!
//! let otp = OtpCode::generate();
//! assert_eq!(otp.as_str().len(), 5);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod access;
pub mod error;
pub mod id;
pub mod model;
pub mod observability;
pub mod otp;
pub mod password;

pub use error::{Error, Result};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::access::{
        can_edit, invitation_addressed_to, is_accepted_editor, is_author,
    };
    pub use crate::error::{Error, Result};
    pub use crate::id::{
        ChapterId, CollaborationId, CommentId, ManuscriptId, NotificationId, ReviewId, UserId,
    };
    pub use crate::model::{
        Chapter, Collaboration, CollaborationRole, CollaborationStatus, Comment, Manuscript,
        ManuscriptStatus, Notification, NotificationType, Review, User, UserRole,
    };
    pub use crate::otp::OtpCode;
}
