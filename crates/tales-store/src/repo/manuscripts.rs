//! Manuscript persistence and the listings built around it.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tales_core::id::{ChapterId, ManuscriptId, UserId};
use tales_core::model::{
    AuthorSummary, ChapterRef, Manuscript, ManuscriptDetail, ManuscriptStatus, MemberManuscript,
    PublishedManuscript,
};

use super::collaborations::{collaborations_for, collaborators_for};
use super::{json_column, now_millis, parsed, timestamp};
use crate::Store;
use crate::error::{StoreError, StoreResult};

const MANUSCRIPT_COLUMNS: &str = "m.id, m.author_id, m.title, m.subtitle, m.genre, \
     m.description, m.tags, m.cover_url, m.status, m.reads, m.price_cents, m.created_at, \
     m.updated_at, u.full_name AS author_name, u.email AS author_email, \
     u.avatar_url AS author_avatar";

/// Input for [`Store::create_manuscript`].
#[derive(Debug, Clone)]
pub struct NewManuscript {
    /// Owning author.
    pub author_id: UserId,
    /// Title.
    pub title: String,
    /// Subtitle.
    pub subtitle: Option<String>,
    /// Genre label.
    pub genre: Option<String>,
    /// Blurb.
    pub description: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Cover image URL.
    pub cover_url: Option<String>,
    /// List price in cents.
    pub price_cents: i64,
}

impl NewManuscript {
    /// Creates a draft with only a title.
    pub fn new(author_id: UserId, title: impl Into<String>) -> Self {
        Self {
            author_id,
            title: title.into(),
            subtitle: None,
            genre: None,
            description: None,
            tags: Vec::new(),
            cover_url: None,
            price_cents: 0,
        }
    }
}

/// Partial manuscript update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ManuscriptPatch {
    /// New title.
    pub title: Option<String>,
    /// New subtitle.
    pub subtitle: Option<String>,
    /// New genre.
    pub genre: Option<String>,
    /// New blurb.
    pub description: Option<String>,
    /// Replacement tag list.
    pub tags: Option<Vec<String>>,
    /// New cover URL.
    pub cover_url: Option<String>,
    /// New lifecycle state.
    pub status: Option<ManuscriptStatus>,
    /// New list price in cents.
    pub price_cents: Option<i64>,
}

impl ManuscriptPatch {
    fn apply(self, manuscript: &mut Manuscript) {
        if let Some(title) = self.title {
            manuscript.title = title;
        }
        if let Some(subtitle) = self.subtitle {
            manuscript.subtitle = Some(subtitle);
        }
        if let Some(genre) = self.genre {
            manuscript.genre = Some(genre);
        }
        if let Some(description) = self.description {
            manuscript.description = Some(description);
        }
        if let Some(tags) = self.tags {
            manuscript.tags = tags;
        }
        if let Some(cover_url) = self.cover_url {
            manuscript.cover_url = Some(cover_url);
        }
        if let Some(status) = self.status {
            manuscript.status = status;
        }
        if let Some(price_cents) = self.price_cents {
            manuscript.price_cents = price_cents;
        }
    }
}

fn map_manuscript(row: &Row<'_>) -> rusqlite::Result<Manuscript> {
    Ok(Manuscript {
        id: ManuscriptId::new(row.get("id")?),
        author_id: UserId::new(row.get("author_id")?),
        title: row.get("title")?,
        subtitle: row.get("subtitle")?,
        genre: row.get("genre")?,
        description: row.get("description")?,
        tags: json_column(row, "tags")?,
        cover_url: row.get("cover_url")?,
        status: parsed(row, "status")?,
        reads: row.get("reads")?,
        price_cents: row.get("price_cents")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn map_with_author(
    row: &Row<'_>,
    with_email: bool,
) -> rusqlite::Result<(Manuscript, AuthorSummary)> {
    let manuscript = map_manuscript(row)?;
    let author = AuthorSummary {
        id: manuscript.author_id,
        full_name: row.get("author_name")?,
        email: if with_email {
            Some(row.get("author_email")?)
        } else {
            None
        },
        avatar_url: row.get("author_avatar")?,
    };
    Ok((manuscript, author))
}

pub(crate) fn get_manuscript(conn: &Connection, id: ManuscriptId) -> StoreResult<Option<Manuscript>> {
    let sql = format!(
        "SELECT {MANUSCRIPT_COLUMNS} FROM manuscripts m
         JOIN users u ON u.id = m.author_id
         WHERE m.id = ?1;"
    );
    Ok(conn
        .query_row(&sql, params![id.get()], map_manuscript)
        .optional()?)
}

fn require_manuscript(conn: &Connection, id: ManuscriptId) -> StoreResult<Manuscript> {
    get_manuscript(conn, id)?.ok_or_else(|| StoreError::not_found("manuscript", id))
}

fn chapter_refs(conn: &Connection, id: ManuscriptId) -> StoreResult<Vec<ChapterRef>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM chapters WHERE manuscript_id = ?1 ORDER BY position ASC, id ASC;",
    )?;
    let rows = stmt.query_map(params![id.get()], |row| {
        Ok(ChapterRef {
            id: ChapterId::new(row.get(0)?),
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn write_manuscript(conn: &Connection, manuscript: &Manuscript, now: i64) -> StoreResult<()> {
    conn.execute(
        "UPDATE manuscripts
         SET title = ?2, subtitle = ?3, genre = ?4, description = ?5, tags = ?6,
             cover_url = ?7, status = ?8, price_cents = ?9, updated_at = ?10
         WHERE id = ?1;",
        params![
            manuscript.id.get(),
            manuscript.title,
            manuscript.subtitle,
            manuscript.genre,
            manuscript.description,
            serde_json::to_string(&manuscript.tags)?,
            manuscript.cover_url,
            manuscript.status.as_str(),
            manuscript.price_cents,
            now,
        ],
    )?;
    Ok(())
}

impl Store {
    /// Creates a `DRAFT` manuscript.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] if the author does not exist.
    pub async fn create_manuscript(&self, new: NewManuscript) -> StoreResult<Manuscript> {
        self.run("create_manuscript", move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO manuscripts
                    (author_id, title, subtitle, genre, description, tags, cover_url, status,
                     reads, price_cents, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?10);",
                params![
                    new.author_id.get(),
                    new.title,
                    new.subtitle,
                    new.genre,
                    new.description,
                    serde_json::to_string(&new.tags)?,
                    new.cover_url,
                    ManuscriptStatus::Draft.as_str(),
                    new.price_cents,
                    now,
                ],
            )?;
            require_manuscript(conn, ManuscriptId::new(conn.last_insert_rowid()))
        })
        .await
    }

    /// Looks up a manuscript.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn find_manuscript(&self, id: ManuscriptId) -> StoreResult<Option<Manuscript>> {
        self.run("find_manuscript", move |conn| get_manuscript(conn, id))
            .await
    }

    /// Lists published manuscripts, most recently updated first.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn list_published(&self) -> StoreResult<Vec<PublishedManuscript>> {
        self.run("list_published", |conn| {
            let sql = format!(
                "SELECT {MANUSCRIPT_COLUMNS} FROM manuscripts m
                 JOIN users u ON u.id = m.author_id
                 WHERE m.status = ?1
                 ORDER BY m.updated_at DESC, m.id DESC;"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![ManuscriptStatus::Published.as_str()], |row| {
                    map_with_author(row, false)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(manuscript, author)| {
                    let chapters = chapter_refs(conn, manuscript.id)?;
                    Ok(PublishedManuscript {
                        manuscript,
                        author,
                        chapters,
                    })
                })
                .collect()
        })
        .await
    }

    /// Lists manuscripts `user` authors or has any invitation linked to,
    /// most recently updated first.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn list_for_member(&self, user: UserId) -> StoreResult<Vec<MemberManuscript>> {
        self.run("list_for_member", move |conn| {
            let sql = format!(
                "SELECT {MANUSCRIPT_COLUMNS} FROM manuscripts m
                 JOIN users u ON u.id = m.author_id
                 WHERE m.author_id = ?1
                    OR EXISTS (
                        SELECT 1 FROM collaborations c
                        WHERE c.manuscript_id = m.id AND c.user_id = ?1
                    )
                 ORDER BY m.updated_at DESC, m.id DESC;"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user.get()], |row| map_with_author(row, true))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(manuscript, author)| {
                    let collaborations = collaborations_for(conn, manuscript.id)?;
                    Ok(MemberManuscript {
                        manuscript,
                        author,
                        collaborations,
                    })
                })
                .collect()
        })
        .await
    }

    /// Loads a manuscript with its author and collaborators.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn manuscript_detail(
        &self,
        id: ManuscriptId,
    ) -> StoreResult<Option<ManuscriptDetail>> {
        self.run("manuscript_detail", move |conn| {
            let sql = format!(
                "SELECT {MANUSCRIPT_COLUMNS} FROM manuscripts m
                 JOIN users u ON u.id = m.author_id
                 WHERE m.id = ?1;"
            );
            let Some((manuscript, author)) = conn
                .query_row(&sql, params![id.get()], |row| map_with_author(row, true))
                .optional()?
            else {
                return Ok(None);
            };
            let collaborations = collaborators_for(conn, id)?;
            Ok(Some(ManuscriptDetail {
                manuscript,
                author,
                collaborations,
            }))
        })
        .await
    }

    /// Applies a partial update and returns the stored result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown manuscript.
    pub async fn update_manuscript(
        &self,
        id: ManuscriptId,
        patch: ManuscriptPatch,
    ) -> StoreResult<Manuscript> {
        self.run("update_manuscript", move |conn| {
            let tx = conn.transaction()?;
            let mut manuscript = require_manuscript(&tx, id)?;
            patch.apply(&mut manuscript);
            let now = now_millis();
            write_manuscript(&tx, &manuscript, now)?;
            let stored = require_manuscript(&tx, id)?;
            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    /// Deletes a manuscript with its chapters, invitations, and feedback.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown manuscript.
    pub async fn delete_manuscript(&self, id: ManuscriptId) -> StoreResult<()> {
        self.run("delete_manuscript", move |conn| {
            let changed =
                conn.execute("DELETE FROM manuscripts WHERE id = ?1;", params![id.get()])?;
            if changed == 0 {
                return Err(StoreError::not_found("manuscript", id));
            }
            Ok(())
        })
        .await
    }

    /// Increments the read counter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown manuscript.
    pub async fn record_read(&self, id: ManuscriptId) -> StoreResult<()> {
        self.run("record_read", move |conn| {
            let changed = conn.execute(
                "UPDATE manuscripts SET reads = reads + 1 WHERE id = ?1;",
                params![id.get()],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("manuscript", id));
            }
            Ok(())
        })
        .await
    }
}
