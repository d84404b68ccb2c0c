//! Chapter comments and reviews.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tales_core::id::{ChapterId, CommentId, ReviewId, UserId};
use tales_core::model::{AuthorSummary, Comment, CommentView, Review, ReviewView};

use super::{now_millis, timestamp};
use crate::Store;
use crate::error::{StoreError, StoreResult};

/// Lowest accepted review rating.
pub const MIN_RATING: u8 = 1;
/// Highest accepted review rating.
pub const MAX_RATING: u8 = 5;

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: CommentId::new(row.get("id")?),
        chapter_id: ChapterId::new(row.get("chapter_id")?),
        author_id: UserId::new(row.get("author_id")?),
        content: row.get("content")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn map_review(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: ReviewId::new(row.get("id")?),
        chapter_id: ChapterId::new(row.get("chapter_id")?),
        author_id: UserId::new(row.get("author_id")?),
        rating: row.get("rating")?,
        content: row.get("content")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn map_author(row: &Row<'_>, author_id: UserId) -> rusqlite::Result<AuthorSummary> {
    Ok(AuthorSummary {
        id: author_id,
        full_name: row.get("author_name")?,
        email: None,
        avatar_url: row.get("author_avatar")?,
    })
}

fn get_comment(conn: &Connection, id: CommentId) -> StoreResult<Option<Comment>> {
    Ok(conn
        .query_row(
            "SELECT id, chapter_id, author_id, content, created_at FROM comments WHERE id = ?1;",
            params![id.get()],
            map_comment,
        )
        .optional()?)
}

fn get_review(conn: &Connection, id: ReviewId) -> StoreResult<Option<Review>> {
    Ok(conn
        .query_row(
            "SELECT id, chapter_id, author_id, rating, content, created_at
             FROM reviews WHERE id = ?1;",
            params![id.get()],
            map_review,
        )
        .optional()?)
}

impl Store {
    /// Adds a comment to a chapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] if the chapter or author does not exist.
    pub async fn create_comment(
        &self,
        chapter: ChapterId,
        author: UserId,
        content: String,
    ) -> StoreResult<Comment> {
        self.run("create_comment", move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO comments (chapter_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4);",
                params![chapter.get(), author.get(), content, now],
            )?;
            let id = CommentId::new(conn.last_insert_rowid());
            get_comment(conn, id)?.ok_or_else(|| StoreError::not_found("comment", id))
        })
        .await
    }

    /// Looks up a comment.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn find_comment(&self, id: CommentId) -> StoreResult<Option<Comment>> {
        self.run("find_comment", move |conn| get_comment(conn, id)).await
    }

    /// Lists a chapter's comments, oldest first.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn list_comments(&self, chapter: ChapterId) -> StoreResult<Vec<CommentView>> {
        self.run("list_comments", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.chapter_id, c.author_id, c.content, c.created_at,
                        u.full_name AS author_name, u.avatar_url AS author_avatar
                 FROM comments c
                 JOIN users u ON u.id = c.author_id
                 WHERE c.chapter_id = ?1
                 ORDER BY c.created_at ASC, c.id ASC;",
            )?;
            let rows = stmt.query_map(params![chapter.get()], |row| {
                let comment = map_comment(row)?;
                let author = map_author(row, comment.author_id)?;
                Ok(CommentView { comment, author })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Deletes a comment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown comment.
    pub async fn delete_comment(&self, id: CommentId) -> StoreResult<()> {
        self.run("delete_comment", move |conn| {
            let changed = conn.execute("DELETE FROM comments WHERE id = ?1;", params![id.get()])?;
            if changed == 0 {
                return Err(StoreError::not_found("comment", id));
            }
            Ok(())
        })
        .await
    }

    /// Adds a star review to a chapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] for a rating outside 1..=5 or a
    /// missing chapter or author.
    pub async fn create_review(
        &self,
        chapter: ChapterId,
        author: UserId,
        rating: u8,
        content: Option<String>,
    ) -> StoreResult<Review> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(StoreError::InvalidData(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
            )));
        }
        self.run("create_review", move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO reviews (chapter_id, author_id, rating, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![chapter.get(), author.get(), rating, content, now],
            )?;
            let id = ReviewId::new(conn.last_insert_rowid());
            get_review(conn, id)?.ok_or_else(|| StoreError::not_found("review", id))
        })
        .await
    }

    /// Lists a chapter's reviews, newest first.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn list_reviews(&self, chapter: ChapterId) -> StoreResult<Vec<ReviewView>> {
        self.run("list_reviews", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.chapter_id, r.author_id, r.rating, r.content, r.created_at,
                        u.full_name AS author_name, u.avatar_url AS author_avatar
                 FROM reviews r
                 JOIN users u ON u.id = r.author_id
                 WHERE r.chapter_id = ?1
                 ORDER BY r.created_at DESC, r.id DESC;",
            )?;
            let rows = stmt.query_map(params![chapter.get()], |row| {
                let review = map_review(row)?;
                let author = map_author(row, review.author_id)?;
                Ok(ReviewView { review, author })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}
