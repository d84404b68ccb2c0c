//! Domain records persisted by the store and returned by the API.
//!
//! Records serialize with camelCase field names. Secret material on [`User`]
//! (password hash, pending OTP) is never serialized. Views compose a record
//! with the related rows a listing embeds.

mod kinds;
mod records;
mod views;

pub use kinds::{
    CollaborationRole, CollaborationStatus, ManuscriptStatus, NotificationType, UserRole,
};
pub use records::{
    AuthorSummary, Chapter, ChapterRef, Collaboration, Comment, Manuscript, Notification, Review,
    User, UserSummary,
};
pub use views::{
    CollaboratorEntry, CommentView, DashboardStats, ManuscriptDetail, MemberManuscript,
    PublishedManuscript, ReviewView,
};
