//! In-app notifications.
//!
//! Every read or write is scoped to a recipient. A notification that belongs
//! to someone else is indistinguishable from one that does not exist.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tales_core::id::{NotificationId, UserId};
use tales_core::model::{Notification, NotificationType};

use super::{json_column, now_millis, parsed, timestamp};
use crate::Store;
use crate::error::{StoreError, StoreResult};

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, type, title, message, data, is_read, created_at";

/// Input for [`Store::create_notification`].
#[derive(Debug, Clone)]
pub struct NewNotification {
    /// Receiving account.
    pub recipient_id: UserId,
    /// Category.
    pub kind: NotificationType,
    /// Headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Related ids; must be a JSON object.
    pub data: serde_json::Value,
}

/// Optional filters for [`Store::list_notifications`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    /// Only this category.
    pub kind: Option<NotificationType>,
    /// Only read (`true`) or unread (`false`) entries.
    pub is_read: Option<bool>,
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: NotificationId::new(row.get("id")?),
        recipient_id: UserId::new(row.get("recipient_id")?),
        kind: parsed(row, "type")?,
        title: row.get("title")?,
        message: row.get("message")?,
        data: json_column(row, "data")?,
        is_read: row.get("is_read")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn get_owned(
    conn: &Connection,
    id: NotificationId,
    recipient: UserId,
) -> StoreResult<Option<Notification>> {
    let sql = format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1 AND recipient_id = ?2;"
    );
    Ok(conn
        .query_row(&sql, params![id.get(), recipient.get()], map_notification)
        .optional()?)
}

impl Store {
    /// Stores a notification.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] if `data` is not an object or the
    /// recipient does not exist.
    pub async fn create_notification(&self, new: NewNotification) -> StoreResult<Notification> {
        if !new.data.is_object() {
            return Err(StoreError::InvalidData(
                "notification data must be a JSON object".to_string(),
            ));
        }
        self.run("create_notification", move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO notifications
                    (recipient_id, type, title, message, data, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6);",
                params![
                    new.recipient_id.get(),
                    new.kind.as_str(),
                    new.title,
                    new.message,
                    serde_json::to_string(&new.data)?,
                    now,
                ],
            )?;
            let id = NotificationId::new(conn.last_insert_rowid());
            get_owned(conn, id, new.recipient_id)?
                .ok_or_else(|| StoreError::not_found("notification", id))
        })
        .await
    }

    /// Fetches a notification owned by `recipient`.
    #[cfg(test)]
    pub(crate) async fn find_notification(
        &self,
        id: NotificationId,
        recipient: UserId,
    ) -> StoreResult<Option<Notification>> {
        self.run("find_notification", move |conn| get_owned(conn, id, recipient))
            .await
    }

    /// Lists a recipient's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn list_notifications(
        &self,
        recipient: UserId,
        filter: NotificationFilter,
    ) -> StoreResult<Vec<Notification>> {
        self.run("list_notifications", move |conn| {
            let mut sql =
                format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE recipient_id = ?");
            let mut binds = vec![Value::Integer(recipient.get())];
            if let Some(kind) = filter.kind {
                sql.push_str(" AND type = ?");
                binds.push(Value::Text(kind.as_str().to_string()));
            }
            if let Some(is_read) = filter.is_read {
                sql.push_str(" AND is_read = ?");
                binds.push(Value::Integer(i64::from(is_read)));
            }
            sql.push_str(" ORDER BY created_at DESC, id DESC;");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(binds), map_notification)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Counts a recipient's unread notifications.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn unread_count(&self, recipient: UserId) -> StoreResult<i64> {
        self.run("unread_count", move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0;",
                params![recipient.get()],
                |row| row.get(0),
            )?)
        })
        .await
    }

    /// Marks one of `recipient`'s notifications read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the notification is missing or not theirs.
    pub async fn mark_notification_read(
        &self,
        id: NotificationId,
        recipient: UserId,
    ) -> StoreResult<Notification> {
        self.run("mark_notification_read", move |conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2;",
                params![id.get(), recipient.get()],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("notification", id));
            }
            get_owned(conn, id, recipient)?.ok_or_else(|| StoreError::not_found("notification", id))
        })
        .await
    }

    /// Marks every unread notification of `recipient` read; returns how many changed.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn mark_all_read(&self, recipient: UserId) -> StoreResult<usize> {
        self.run("mark_all_read", move |conn| {
            Ok(conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0;",
                params![recipient.get()],
            )?)
        })
        .await
    }

    /// Deletes one of `recipient`'s notifications.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the notification is missing or not theirs.
    pub async fn delete_notification(
        &self,
        id: NotificationId,
        recipient: UserId,
    ) -> StoreResult<()> {
        self.run("delete_notification", move |conn| {
            let changed = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND recipient_id = ?2;",
                params![id.get(), recipient.get()],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("notification", id));
            }
            Ok(())
        })
        .await
    }
}
