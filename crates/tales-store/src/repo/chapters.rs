//! Chapter persistence.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tales_core::id::{ChapterId, ManuscriptId};
use tales_core::model::Chapter;

use super::{now_millis, timestamp};
use crate::Store;
use crate::error::{StoreError, StoreResult};

const CHAPTER_COLUMNS: &str =
    "id, manuscript_id, title, content, position, created_at, updated_at";

/// Input for [`Store::create_chapter`].
#[derive(Debug, Clone)]
pub struct NewChapter {
    /// Owning manuscript.
    pub manuscript_id: ManuscriptId,
    /// Chapter title.
    pub title: String,
    /// Chapter body.
    pub content: Option<String>,
    /// Sort key; defaults to 0.
    pub order: Option<i64>,
}

/// Partial chapter update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ChapterPatch {
    /// New title.
    pub title: Option<String>,
    /// New body.
    pub content: Option<String>,
    /// New sort key.
    pub order: Option<i64>,
}

fn map_chapter(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: ChapterId::new(row.get("id")?),
        manuscript_id: ManuscriptId::new(row.get("manuscript_id")?),
        title: row.get("title")?,
        content: row.get("content")?,
        order: row.get("position")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn get_chapter(conn: &Connection, id: ChapterId) -> StoreResult<Option<Chapter>> {
    let sql = format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = ?1;");
    Ok(conn
        .query_row(&sql, params![id.get()], map_chapter)
        .optional()?)
}

fn require_chapter(conn: &Connection, id: ChapterId) -> StoreResult<Chapter> {
    get_chapter(conn, id)?.ok_or_else(|| StoreError::not_found("chapter", id))
}

impl Store {
    /// Adds a chapter to a manuscript.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] if the manuscript does not exist.
    pub async fn create_chapter(&self, new: NewChapter) -> StoreResult<Chapter> {
        self.run("create_chapter", move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO chapters
                    (manuscript_id, title, content, position, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5);",
                params![
                    new.manuscript_id.get(),
                    new.title,
                    new.content,
                    new.order.unwrap_or(0),
                    now,
                ],
            )?;
            require_chapter(conn, ChapterId::new(conn.last_insert_rowid()))
        })
        .await
    }

    /// Looks up a chapter.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn find_chapter(&self, id: ChapterId) -> StoreResult<Option<Chapter>> {
        self.run("find_chapter", move |conn| get_chapter(conn, id)).await
    }

    /// Lists a manuscript's chapters by `order`, then by creation.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn list_chapters(&self, manuscript: ManuscriptId) -> StoreResult<Vec<Chapter>> {
        self.run("list_chapters", move |conn| {
            let sql = format!(
                "SELECT {CHAPTER_COLUMNS} FROM chapters
                 WHERE manuscript_id = ?1
                 ORDER BY position ASC, id ASC;"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![manuscript.get()], map_chapter)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown chapter.
    pub async fn update_chapter(&self, id: ChapterId, patch: ChapterPatch) -> StoreResult<Chapter> {
        self.run("update_chapter", move |conn| {
            let now = now_millis();
            let changed = conn.execute(
                "UPDATE chapters
                 SET title = COALESCE(?2, title),
                     content = COALESCE(?3, content),
                     position = COALESCE(?4, position),
                     updated_at = ?5
                 WHERE id = ?1;",
                params![id.get(), patch.title, patch.content, patch.order, now],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("chapter", id));
            }
            require_chapter(conn, id)
        })
        .await
    }

    /// Deletes a chapter with its comments and reviews.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown chapter.
    pub async fn delete_chapter(&self, id: ChapterId) -> StoreResult<()> {
        self.run("delete_chapter", move |conn| {
            let changed = conn.execute("DELETE FROM chapters WHERE id = ?1;", params![id.get()])?;
            if changed == 0 {
                return Err(StoreError::not_found("chapter", id));
            }
            Ok(())
        })
        .await
    }
}
