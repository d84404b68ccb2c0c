//! Dashboard aggregates.

use rusqlite::params;
use tales_core::id::UserId;
use tales_core::model::{CollaborationStatus, DashboardStats, ManuscriptStatus};

use crate::Store;
use crate::error::StoreResult;

impl Store {
    /// Aggregates over manuscripts `user` authors or holds an accepted collaboration on.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn dashboard_stats(&self, user: UserId) -> StoreResult<DashboardStats> {
        self.run("dashboard_stats", move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN m.status = ?2 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(m.reads), 0),
                        COALESCE(SUM(m.price_cents), 0)
                 FROM manuscripts m
                 WHERE m.author_id = ?1
                    OR EXISTS (
                        SELECT 1 FROM collaborations c
                        WHERE c.manuscript_id = m.id AND c.user_id = ?1 AND c.status = ?3
                    );",
                params![
                    user.get(),
                    ManuscriptStatus::Published.as_str(),
                    CollaborationStatus::Accepted.as_str(),
                ],
                |row| {
                    Ok(DashboardStats {
                        total_manuscripts: row.get(0)?,
                        published: row.get(1)?,
                        total_reads: row.get(2)?,
                        earnings_cents: row.get(3)?,
                    })
                },
            )?)
        })
        .await
    }
}
