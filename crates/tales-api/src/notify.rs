//! In-app notification fan-out.
//!
//! Each notification is one insert with no retry and no ordering guarantee.
//! A failed insert is logged and counted but never fails the mutation that
//! triggered it.

use serde_json::json;

use tales_core::id::UserId;
use tales_core::model::{
    Chapter, Collaboration, CollaborationStatus, Comment, Manuscript, NotificationType, Review,
    User,
};
use tales_store::{NewNotification, Store, StoreResult};

const COMMENT_PREVIEW_CHARS: usize = 30;
const ANONYMOUS: &str = "Someone";

/// Name shown for an actor whose account may be gone.
pub(crate) fn display_name(user: Option<&User>) -> &str {
    user.map_or(ANONYMOUS, |user| user.full_name.as_str())
}

/// Resolves a lookup that only feeds a notification.
///
/// Runs after the primary mutation is committed, so a storage error is logged
/// and yields `None` instead of failing the request.
pub(crate) fn lookup<T>(result: StoreResult<Option<T>>, what: &'static str) -> Option<T> {
    match result {
        Ok(found) => found,
        Err(err) => {
            tracing::warn!(lookup = what, error = %err, "notification lookup failed");
            None
        }
    }
}

/// Stores `notification`, swallowing failures.
pub(crate) async fn deliver(store: &Store, notification: NewNotification) {
    let kind = notification.kind.as_str();
    let recipient = notification.recipient_id;
    match store.create_notification(notification).await {
        Ok(created) => {
            tracing::debug!(
                notification_id = created.id.get(),
                user_id = recipient.get(),
                kind,
                "notification created"
            );
            crate::metrics::record_notification(kind, true);
        }
        Err(err) => {
            tracing::warn!(
                user_id = recipient.get(),
                kind,
                error = %err,
                "notification insert failed"
            );
            crate::metrics::record_notification(kind, false);
        }
    }
}

pub(crate) fn manuscript_created(manuscript: &Manuscript) -> NewNotification {
    NewNotification {
        recipient_id: manuscript.author_id,
        kind: NotificationType::System,
        title: "Manuscript Created".to_string(),
        message: format!("You created a new manuscript: \"{}\"", manuscript.title),
        data: json!({ "manuscriptId": manuscript.id }),
    }
}

pub(crate) fn manuscript_published(actor: UserId, manuscript: &Manuscript) -> NewNotification {
    NewNotification {
        recipient_id: actor,
        kind: NotificationType::System,
        title: "Manuscript Published".to_string(),
        message: format!("You published your manuscript: \"{}\"", manuscript.title),
        data: json!({ "manuscriptId": manuscript.id }),
    }
}

pub(crate) fn collaboration_requested(
    invitee: UserId,
    sender: Option<&User>,
    manuscript: &Manuscript,
    collaboration: &Collaboration,
) -> NewNotification {
    let sender = display_name(sender);
    NewNotification {
        recipient_id: invitee,
        kind: NotificationType::Collaboration,
        title: "Collaboration Request".to_string(),
        message: format!(
            "{sender} wants to collaborate on \"{}\".",
            manuscript.title
        ),
        data: json!({
            "manuscriptId": manuscript.id,
            "collaborationId": collaboration.id,
        }),
    }
}

pub(crate) fn invitation_answered(
    responder: &User,
    manuscript: &Manuscript,
    collaboration: &Collaboration,
) -> NewNotification {
    let status = collaboration.status;
    let (title, message, data) = if status == CollaborationStatus::Accepted {
        (
            "Invitation Accepted",
            format!(
                "{} ({}) has accepted your invitation to collaborate on \"{}\" as an {}.",
                responder.full_name,
                responder.email,
                manuscript.title,
                collaboration.role.as_str().to_ascii_lowercase()
            ),
            json!({
                "manuscriptId": manuscript.id,
                "collaborationId": collaboration.id,
                "status": status,
            }),
        )
    } else {
        (
            "Invitation Declined",
            format!(
                "{} has declined your invitation to collaborate on \"{}\".",
                responder.full_name, manuscript.title
            ),
            json!({
                "manuscriptId": manuscript.id,
                "status": status,
            }),
        )
    };
    NewNotification {
        recipient_id: manuscript.author_id,
        kind: NotificationType::Collaboration,
        title: title.to_string(),
        message,
        data,
    }
}

pub(crate) fn new_comment(
    commenter: &str,
    manuscript: &Manuscript,
    chapter: &Chapter,
    comment: &Comment,
) -> NewNotification {
    let preview: String = comment.content.chars().take(COMMENT_PREVIEW_CHARS).collect();
    NewNotification {
        recipient_id: manuscript.author_id,
        kind: NotificationType::Comment,
        title: "New Comment".to_string(),
        message: format!(
            "{commenter} commented on Chapter \"{}\": \"{preview}...\"",
            chapter.title
        ),
        data: json!({
            "manuscriptId": manuscript.id,
            "chapterId": chapter.id,
            "commentId": comment.id,
        }),
    }
}

pub(crate) fn new_review(
    reviewer: &str,
    manuscript: &Manuscript,
    chapter: &Chapter,
    review: &Review,
) -> NewNotification {
    NewNotification {
        recipient_id: manuscript.author_id,
        kind: NotificationType::Review,
        title: "New Review".to_string(),
        message: format!(
            "{reviewer} gave a {}-star review on Chapter \"{}\".",
            review.rating, chapter.title
        ),
        data: json!({
            "manuscriptId": manuscript.id,
            "chapterId": chapter.id,
            "reviewId": review.id,
        }),
    }
}
