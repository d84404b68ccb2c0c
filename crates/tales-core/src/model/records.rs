use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::kinds::{
    CollaborationRole, CollaborationStatus, ManuscriptStatus, NotificationType, UserRole,
};
use crate::id::{
    ChapterId, CollaborationId, CommentId, ManuscriptId, NotificationId, ReviewId, UserId,
};

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Account ID.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// Login email (unique).
    pub email: String,
    /// Argon2 PHC string; absent for accounts that never set a password.
    #[serde(skip)]
    pub password_hash: Option<String>,
    /// Platform-wide role.
    pub role: UserRole,
    /// Free-form profile text.
    pub bio: Option<String>,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
    /// Outstanding one-time passcode (verification or password reset).
    #[serde(skip)]
    pub otp_code: Option<String>,
    /// Instant after which `otp_code` is no longer accepted.
    #[serde(skip)]
    pub otp_expires_at: Option<DateTime<Utc>>,
    /// Whether the email address has been confirmed.
    pub otp_verified: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Returns true when `candidate` equals the outstanding OTP and it has not expired.
    ///
    /// Codes stored without an expiry never lapse.
    #[must_use]
    pub fn pending_otp_matches(&self, candidate: &str, now: DateTime<Utc>) -> bool {
        let Some(code) = self.otp_code.as_deref() else {
            return false;
        };
        if code != candidate.trim() {
            return false;
        }
        self.otp_expires_at.is_none_or(|expires| now <= expires)
    }

    /// Returns the public summary of this account.
    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            role: self.role,
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Directory entry for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// Account ID.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// Login email.
    pub email: String,
    /// Platform-wide role.
    pub role: UserRole,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
}

/// Author information embedded in manuscript and feedback listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    /// Account ID.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// Email, only included where the listing is collaborator-facing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
}

/// A manuscript and its publication metadata.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Manuscript {
    /// Manuscript ID.
    pub id: ManuscriptId,
    /// Owning author.
    pub author_id: UserId,
    /// Title.
    pub title: String,
    /// Optional subtitle.
    pub subtitle: Option<String>,
    /// Genre label.
    pub genre: Option<String>,
    /// Blurb.
    pub description: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Cover image URL.
    pub cover_url: Option<String>,
    /// Publication lifecycle state.
    pub status: ManuscriptStatus,
    /// Read counter.
    pub reads: i64,
    /// List price in cents.
    pub price_cents: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Bare chapter reference used in catalogue listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChapterRef {
    /// Chapter ID.
    pub id: ChapterId,
}

/// A chapter of a manuscript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// Chapter ID.
    pub id: ChapterId,
    /// Owning manuscript.
    pub manuscript_id: ManuscriptId,
    /// Chapter title.
    pub title: String,
    /// Chapter body.
    pub content: Option<String>,
    /// Sort key within the manuscript (ascending).
    pub order: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A collaboration invitation and, once answered, membership record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Collaboration {
    /// Collaboration ID.
    pub id: CollaborationId,
    /// Manuscript the invitation is for.
    pub manuscript_id: ManuscriptId,
    /// Invited address.
    pub email: String,
    /// Linked account, set when the address was registered at invite time or on accept.
    pub user_id: Option<UserId>,
    /// Granted role.
    pub role: CollaborationRole,
    /// Invitation state.
    pub status: CollaborationStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A comment on a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment ID.
    pub id: CommentId,
    /// Chapter commented on.
    pub chapter_id: ChapterId,
    /// Comment author.
    pub author_id: UserId,
    /// Comment text.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A star rating on a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Review ID.
    pub id: ReviewId,
    /// Chapter reviewed.
    pub chapter_id: ChapterId,
    /// Review author.
    pub author_id: UserId,
    /// Rating from 1 to 5.
    pub rating: u8,
    /// Optional review text.
    pub content: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An in-app notification.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification ID.
    pub id: NotificationId,
    /// Receiving account.
    pub recipient_id: UserId,
    /// Category.
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Short headline.
    pub title: String,
    /// Human-readable body.
    pub message: String,
    /// Structured payload (related ids).
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    /// Whether the recipient has read it.
    pub is_read: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
