//! Permission predicates for manuscript workflows.
//!
//! Every check is a pure function over at most two related records. Handlers
//! load the records, call the predicate, and map `false` to `403 Forbidden`
//! (or `404` where existence must not leak).

use crate::id::UserId;
use crate::model::{Collaboration, CollaborationRole, CollaborationStatus, Manuscript, User};

/// Returns true when `user` wrote the manuscript.
///
/// Authors alone may delete manuscripts and chapters and invite collaborators.
#[must_use]
pub fn is_author(manuscript: &Manuscript, user: UserId) -> bool {
    manuscript.author_id == user
}

/// Returns true when `user` holds an accepted `EDITOR` collaboration among `collaborations`.
#[must_use]
pub fn is_accepted_editor(collaborations: &[Collaboration], user: UserId) -> bool {
    collaborations.iter().any(|c| {
        c.user_id == Some(user)
            && c.role == CollaborationRole::Editor
            && c.status == CollaborationStatus::Accepted
    })
}

/// Returns true when `user` may modify the manuscript or its chapters.
#[must_use]
pub fn can_edit(manuscript: &Manuscript, collaborations: &[Collaboration], user: UserId) -> bool {
    is_author(manuscript, user) || is_accepted_editor(collaborations, user)
}

/// Returns true when the invitation targets `user`, by email or by linked account.
#[must_use]
pub fn invitation_addressed_to(collaboration: &Collaboration, user: &User) -> bool {
    collaboration.email.eq_ignore_ascii_case(&user.email) || collaboration.user_id == Some(user.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{CollaborationId, ManuscriptId};
    use crate::model::{ManuscriptStatus, UserRole};
    use chrono::Utc;

    fn manuscript(author: i64) -> Manuscript {
        let now = Utc::now();
        Manuscript {
            id: ManuscriptId::new(1),
            author_id: UserId::new(author),
            title: "The Long Night".to_string(),
            subtitle: None,
            genre: None,
            description: None,
            tags: vec![],
            cover_url: None,
            status: ManuscriptStatus::Draft,
            reads: 0,
            price_cents: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn collaboration(
        user: Option<i64>,
        role: CollaborationRole,
        status: CollaborationStatus,
    ) -> Collaboration {
        let now = Utc::now();
        Collaboration {
            id: CollaborationId::new(1),
            manuscript_id: ManuscriptId::new(1),
            email: "editor@example.com".to_string(),
            user_id: user.map(UserId::new),
            role,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn user(id: i64, email: &str) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(id),
            full_name: "Someone".to_string(),
            email: email.to_string(),
            password_hash: None,
            role: UserRole::Reader,
            bio: None,
            avatar_url: None,
            otp_code: None,
            otp_expires_at: None,
            otp_verified: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn author_can_edit_without_collaborations() {
        assert!(can_edit(&manuscript(1), &[], UserId::new(1)));
        assert!(!can_edit(&manuscript(1), &[], UserId::new(2)));
    }

    #[test]
    fn accepted_editor_can_edit() {
        let collabs = [collaboration(
            Some(2),
            CollaborationRole::Editor,
            CollaborationStatus::Accepted,
        )];
        assert!(can_edit(&manuscript(1), &collabs, UserId::new(2)));
        assert!(!is_author(&manuscript(1), UserId::new(2)));
    }

    #[test]
    fn pending_or_non_editor_collaborators_cannot_edit() {
        let collabs = [
            collaboration(Some(2), CollaborationRole::Editor, CollaborationStatus::Pending),
            collaboration(Some(3), CollaborationRole::Reviewer, CollaborationStatus::Accepted),
            collaboration(Some(4), CollaborationRole::Editor, CollaborationStatus::Declined),
        ];
        for id in 2..=4 {
            assert!(!can_edit(&manuscript(1), &collabs, UserId::new(id)));
        }
    }

    #[test]
    fn invitation_matches_email_or_linked_account() {
        let invite = collaboration(None, CollaborationRole::Viewer, CollaborationStatus::Pending);
        assert!(invitation_addressed_to(&invite, &user(9, "Editor@Example.com")));
        assert!(!invitation_addressed_to(&invite, &user(9, "other@example.com")));

        let linked = collaboration(Some(9), CollaborationRole::Viewer, CollaborationStatus::Pending);
        assert!(invitation_addressed_to(&linked, &user(9, "renamed@example.com")));
    }
}
