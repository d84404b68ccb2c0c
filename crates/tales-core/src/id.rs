//! Strongly-typed identifiers for YourTales entities.
//!
//! Every persisted row is keyed by a database-assigned integer. The newtypes
//! keep those integers from being mixed up at compile time while still
//! serializing as bare numbers on the wire.
//!
//! # Example
//!
//! ```rust
//! use tales_core::id::{ChapterId, ManuscriptId};
//!
//! let manuscript = ManuscriptId::new(7);
//! let chapter: ChapterId = "12".parse().unwrap();
//!
//! // IDs are different types - this won't compile:
//! // let wrong: ManuscriptId = chapter;
//! assert_eq!(manuscript.get(), 7);
//! assert_eq!(chapter.get(), 12);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::{Error, Result};

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database key.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw database key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                s.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|_| Error::invalid_id($label, s))
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

integer_id!(
    /// Identifies a registered account.
    UserId,
    "user id"
);
integer_id!(
    /// Identifies a manuscript.
    ManuscriptId,
    "manuscript id"
);
integer_id!(
    /// Identifies a chapter within a manuscript.
    ChapterId,
    "chapter id"
);
integer_id!(
    /// Identifies a collaboration invitation.
    CollaborationId,
    "collaboration id"
);
integer_id!(
    /// Identifies a chapter comment.
    CommentId,
    "comment id"
);
integer_id!(
    /// Identifies a chapter review.
    ReviewId,
    "review id"
);
integer_id!(
    /// Identifies an in-app notification.
    NotificationId,
    "notification id"
);
