//! Collaboration invitations and the accept/decline workflow.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tales_core::id::{CollaborationId, ManuscriptId, UserId};
use tales_core::model::{
    Collaboration, CollaborationRole, CollaborationStatus, CollaboratorEntry, UserRole,
    UserSummary,
};

use super::{now_millis, parsed, timestamp};
use crate::Store;
use crate::error::{StoreError, StoreResult};

const COLLABORATION_COLUMNS: &str =
    "c.id, c.manuscript_id, c.email, c.user_id, c.role, c.status, c.created_at, c.updated_at";

/// Input for [`Store::create_collaboration`].
#[derive(Debug, Clone)]
pub struct NewCollaboration {
    /// Manuscript the invitation is for.
    pub manuscript_id: ManuscriptId,
    /// Invited address.
    pub email: String,
    /// Account already registered under `email`, if any.
    pub user_id: Option<UserId>,
    /// Granted role.
    pub role: CollaborationRole,
}

fn map_collaboration(row: &Row<'_>) -> rusqlite::Result<Collaboration> {
    Ok(Collaboration {
        id: CollaborationId::new(row.get("id")?),
        manuscript_id: ManuscriptId::new(row.get("manuscript_id")?),
        email: row.get("email")?,
        user_id: row.get::<_, Option<i64>>("user_id")?.map(UserId::new),
        role: parsed(row, "role")?,
        status: parsed(row, "status")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn get_collaboration(conn: &Connection, id: CollaborationId) -> StoreResult<Option<Collaboration>> {
    let sql = format!("SELECT {COLLABORATION_COLUMNS} FROM collaborations c WHERE c.id = ?1;");
    Ok(conn
        .query_row(&sql, params![id.get()], map_collaboration)
        .optional()?)
}

pub(crate) fn collaborations_for(
    conn: &Connection,
    manuscript: ManuscriptId,
) -> StoreResult<Vec<Collaboration>> {
    let sql = format!(
        "SELECT {COLLABORATION_COLUMNS} FROM collaborations c
         WHERE c.manuscript_id = ?1
         ORDER BY c.id ASC;"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![manuscript.get()], map_collaboration)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn collaborators_for(
    conn: &Connection,
    manuscript: ManuscriptId,
) -> StoreResult<Vec<CollaboratorEntry>> {
    let sql = format!(
        "SELECT {COLLABORATION_COLUMNS},
                u.full_name AS user_name, u.email AS user_email,
                u.role AS user_role, u.avatar_url AS user_avatar
         FROM collaborations c
         LEFT JOIN users u ON u.id = c.user_id
         WHERE c.manuscript_id = ?1
         ORDER BY c.id ASC;"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![manuscript.get()], |row| {
        let collaboration = map_collaboration(row)?;
        let user = match (collaboration.user_id, row.get::<_, Option<String>>("user_name")?) {
            (Some(id), Some(full_name)) => Some(UserSummary {
                id,
                full_name,
                email: row.get("user_email")?,
                role: parsed(row, "user_role")?,
                avatar_url: row.get("user_avatar")?,
            }),
            _ => None,
        };
        Ok(CollaboratorEntry {
            collaboration,
            user,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

impl Store {
    /// Records a `PENDING` invitation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the address was already invited to this manuscript.
    pub async fn create_collaboration(&self, new: NewCollaboration) -> StoreResult<Collaboration> {
        self.run("create_collaboration", move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO collaborations
                    (manuscript_id, email, user_id, role, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);",
                params![
                    new.manuscript_id.get(),
                    new.email.trim(),
                    new.user_id.map(UserId::get),
                    new.role.as_str(),
                    CollaborationStatus::Pending.as_str(),
                    now,
                ],
            )?;
            let id = CollaborationId::new(conn.last_insert_rowid());
            get_collaboration(conn, id)?.ok_or_else(|| StoreError::not_found("collaboration", id))
        })
        .await
    }

    /// Looks up an invitation.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn find_collaboration(
        &self,
        id: CollaborationId,
    ) -> StoreResult<Option<Collaboration>> {
        self.run("find_collaboration", move |conn| get_collaboration(conn, id))
            .await
    }

    /// Looks up the invitation of `email` to `manuscript`, case-insensitively.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn find_collaboration_by_email(
        &self,
        manuscript: ManuscriptId,
        email: &str,
    ) -> StoreResult<Option<Collaboration>> {
        let email = email.trim().to_string();
        self.run("find_collaboration_by_email", move |conn| {
            let sql = format!(
                "SELECT {COLLABORATION_COLUMNS} FROM collaborations c
                 WHERE c.manuscript_id = ?1 AND c.email = ?2;"
            );
            Ok(conn
                .query_row(&sql, params![manuscript.get(), email], map_collaboration)
                .optional()?)
        })
        .await
    }

    /// Lists every invitation on a manuscript, oldest first.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn list_collaborations(
        &self,
        manuscript: ManuscriptId,
    ) -> StoreResult<Vec<Collaboration>> {
        self.run("list_collaborations", move |conn| {
            collaborations_for(conn, manuscript)
        })
        .await
    }

    /// Answers a pending invitation on behalf of `responder`.
    ///
    /// Runs in one transaction. Accepting links the invitation to `responder`
    /// and promotes a `READER` to `EDITOR`; other roles are left alone.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidData`] if `status` is `PENDING`.
    /// - [`StoreError::NotFound`] for an unknown invitation.
    /// - [`StoreError::Conflict`] if the invitation was already answered.
    pub async fn respond_to_collaboration(
        &self,
        id: CollaborationId,
        responder: UserId,
        status: CollaborationStatus,
    ) -> StoreResult<Collaboration> {
        if status == CollaborationStatus::Pending {
            return Err(StoreError::InvalidData(
                "response must be ACCEPTED or DECLINED".to_string(),
            ));
        }
        self.run("respond_to_collaboration", move |conn| {
            let tx = conn.transaction()?;
            let now = now_millis();
            let accepted = status == CollaborationStatus::Accepted;
            let changed = tx.execute(
                "UPDATE collaborations
                 SET status = ?2,
                     user_id = CASE WHEN ?3 THEN ?4 ELSE user_id END,
                     updated_at = ?5
                 WHERE id = ?1 AND status = ?6;",
                params![
                    id.get(),
                    status.as_str(),
                    accepted,
                    responder.get(),
                    now,
                    CollaborationStatus::Pending.as_str(),
                ],
            )?;
            if changed == 0 {
                return match get_collaboration(&tx, id)? {
                    Some(_) => Err(StoreError::Conflict(format!(
                        "collaboration {id} has already been answered"
                    ))),
                    None => Err(StoreError::not_found("collaboration", id)),
                };
            }
            if accepted {
                tx.execute(
                    "UPDATE users SET role = ?2, updated_at = ?4 WHERE id = ?1 AND role = ?3;",
                    params![
                        responder.get(),
                        UserRole::Editor.as_str(),
                        UserRole::Reader.as_str(),
                        now,
                    ],
                )?;
            }
            let updated = get_collaboration(&tx, id)?
                .ok_or_else(|| StoreError::not_found("collaboration", id))?;
            tx.commit()?;
            tracing::info!(
                collaboration_id = id.get(),
                user_id = responder.get(),
                status = %status,
                "collaboration answered"
            );
            Ok(updated)
        })
        .await
    }
}
