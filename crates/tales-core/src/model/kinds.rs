//! Closed sets of roles, lifecycle states, and notification categories.
//!
//! Each enum has a stable SCREAMING_SNAKE_CASE wire form used both in JSON
//! payloads and in the database.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{Error, Result};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Returns the stable wire form.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(Error::invalid_input($label, s)),
                }
            }
        }
    };
}

wire_enum!(
    /// Platform-wide role of an account.
    #[derive(Default)]
    UserRole, "user role" {
        /// Default role for new accounts.
        #[default]
        Reader => "READER",
        /// Writes their own manuscripts.
        Writer => "WRITER",
        /// Has accepted at least one editing invitation.
        Editor => "EDITOR",
    }
);

wire_enum!(
    /// Publication lifecycle of a manuscript.
    #[derive(Default)]
    ManuscriptStatus, "manuscript status" {
        /// Work in progress; not listed publicly.
        #[default]
        Draft => "DRAFT",
        /// Circulating among collaborators.
        InReview => "IN_REVIEW",
        /// Listed in the public catalogue.
        Published => "PUBLISHED",
        /// Withdrawn.
        Archived => "ARCHIVED",
    }
);

wire_enum!(
    /// Role granted to a collaborator on one manuscript.
    #[derive(Default)]
    CollaborationRole, "collaboration role" {
        /// May edit manuscript metadata and chapters once accepted.
        Editor => "EDITOR",
        /// Reads and leaves feedback.
        Reviewer => "REVIEWER",
        /// Read-only access.
        #[default]
        Viewer => "VIEWER",
    }
);

wire_enum!(
    /// State of a collaboration invitation.
    CollaborationStatus, "collaboration status" {
        /// Awaiting a response from the invitee.
        Pending => "PENDING",
        /// Invitee joined the manuscript.
        Accepted => "ACCEPTED",
        /// Invitee refused.
        Declined => "DECLINED",
    }
);

wire_enum!(
    /// Category of an in-app notification.
    NotificationType, "notification type" {
        /// Someone commented on a chapter.
        Comment => "COMMENT",
        /// Someone reviewed a chapter.
        Review => "REVIEW",
        /// Invitation sent, accepted, or declined.
        Collaboration => "COLLABORATION",
        /// The recipient was mentioned.
        Mention => "MENTION",
        /// Activity-feed entries about the recipient's own actions.
        System => "SYSTEM",
    }
);
