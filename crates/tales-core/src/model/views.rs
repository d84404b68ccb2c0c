use serde::Serialize;
use utoipa::ToSchema;

use super::records::{
    AuthorSummary, ChapterRef, Collaboration, Comment, Manuscript, Review, UserSummary,
};

/// Catalogue entry for a published manuscript.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PublishedManuscript {
    /// The manuscript.
    #[serde(flatten)]
    pub manuscript: Manuscript,
    /// Author without email.
    pub author: AuthorSummary,
    /// Chapter IDs in reading order.
    pub chapters: Vec<ChapterRef>,
}

/// A manuscript the caller authors or collaborates on.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MemberManuscript {
    /// The manuscript.
    #[serde(flatten)]
    pub manuscript: Manuscript,
    /// Author with email.
    pub author: AuthorSummary,
    /// All invitations on the manuscript.
    pub collaborations: Vec<Collaboration>,
}

/// Collaboration with the linked account, when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CollaboratorEntry {
    /// The invitation.
    #[serde(flatten)]
    pub collaboration: Collaboration,
    /// Linked account.
    pub user: Option<UserSummary>,
}

/// Full manuscript page.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ManuscriptDetail {
    /// The manuscript.
    #[serde(flatten)]
    pub manuscript: Manuscript,
    /// Author with email.
    pub author: AuthorSummary,
    /// Invitations with invitee accounts.
    pub collaborations: Vec<CollaboratorEntry>,
}

/// Comment with its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CommentView {
    /// The comment.
    #[serde(flatten)]
    pub comment: Comment,
    /// Comment author without email.
    pub author: AuthorSummary,
}

/// Review with its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReviewView {
    /// The review.
    #[serde(flatten)]
    pub review: Review,
    /// Review author without email.
    pub author: AuthorSummary,
}

/// Dashboard aggregates over manuscripts a user authors or has joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Manuscripts counted.
    pub total_manuscripts: i64,
    /// Of which published.
    pub published: i64,
    /// Sum of read counters.
    pub total_reads: i64,
    /// Sum of list prices, in cents.
    pub earnings_cents: i64,
}
