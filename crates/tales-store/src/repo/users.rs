//! Account persistence: registration, credentials, OTP state, and profiles.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tales_core::id::UserId;
use tales_core::model::{User, UserRole, UserSummary};

use super::{now_millis, optional_timestamp, parsed, timestamp};
use crate::Store;
use crate::error::{StoreError, StoreResult};

const USER_COLUMNS: &str = "id, full_name, email, password_hash, role, bio, avatar_url, \
     otp_code, otp_expires_at, otp_verified, created_at, updated_at";

/// Input for [`Store::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display name.
    pub full_name: String,
    /// Login email; must be unused.
    pub email: String,
    /// Argon2 PHC hash.
    pub password_hash: Option<String>,
    /// Initial platform role.
    pub role: UserRole,
    /// Verification code to store with the account.
    pub otp_code: Option<String>,
    /// Expiry of `otp_code`.
    pub otp_expires_at: Option<DateTime<Utc>>,
}

/// Profile fields a user may change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    /// New display name.
    pub full_name: Option<String>,
    /// New bio.
    pub bio: Option<String>,
    /// New avatar URL.
    pub avatar_url: Option<String>,
}

pub(crate) fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get("id")?),
        full_name: row.get("full_name")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        role: parsed(row, "role")?,
        bio: row.get("bio")?,
        avatar_url: row.get("avatar_url")?,
        otp_code: row.get("otp_code")?,
        otp_expires_at: optional_timestamp(row, "otp_expires_at")?,
        otp_verified: row.get("otp_verified")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub(crate) fn get_user(conn: &Connection, id: UserId) -> StoreResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1;");
    Ok(conn
        .query_row(&sql, params![id.get()], map_user)
        .optional()?)
}

fn get_user_by_email(conn: &Connection, email: &str) -> StoreResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1;");
    Ok(conn
        .query_row(&sql, params![email.trim()], map_user)
        .optional()?)
}

fn require_user(conn: &Connection, id: UserId) -> StoreResult<User> {
    get_user(conn, id)?.ok_or_else(|| StoreError::not_found("user", id))
}

fn ensure_changed(changed: usize, id: UserId) -> StoreResult<()> {
    if changed == 0 {
        return Err(StoreError::not_found("user", id));
    }
    Ok(())
}

impl Store {
    /// Registers an unverified account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the email is taken.
    pub async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        self.run("create_user", move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO users
                    (full_name, email, password_hash, role, otp_code, otp_expires_at,
                     otp_verified, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7);",
                params![
                    new.full_name,
                    new.email.trim(),
                    new.password_hash,
                    new.role.as_str(),
                    new.otp_code,
                    new.otp_expires_at.map(|at| at.timestamp_millis()),
                    now,
                ],
            )?;
            require_user(conn, UserId::new(conn.last_insert_rowid()))
        })
        .await
    }

    /// Looks up an account by ID.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.run("find_user", move |conn| get_user(conn, id)).await
    }

    /// Looks up an account by email, case-insensitively.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_string();
        self.run("find_user_by_email", move |conn| {
            get_user_by_email(conn, &email)
        })
        .await
    }

    /// Lists every account as a directory entry, oldest first.
    ///
    /// # Errors
    ///
    /// Fails only on storage errors.
    pub async fn list_users(&self) -> StoreResult<Vec<UserSummary>> {
        self.run("list_users", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, full_name, email, role, avatar_url FROM users ORDER BY id ASC;",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(UserSummary {
                    id: UserId::new(row.get("id")?),
                    full_name: row.get("full_name")?,
                    email: row.get("email")?,
                    role: parsed(row, "role")?,
                    avatar_url: row.get("avatar_url")?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Applies the provided profile fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown account.
    pub async fn update_profile(&self, id: UserId, patch: ProfilePatch) -> StoreResult<User> {
        self.run("update_profile", move |conn| {
            let now = now_millis();
            let changed = conn.execute(
                "UPDATE users
                 SET full_name = COALESCE(?2, full_name),
                     bio = COALESCE(?3, bio),
                     avatar_url = COALESCE(?4, avatar_url),
                     updated_at = ?5
                 WHERE id = ?1;",
                params![id.get(), patch.full_name, patch.bio, patch.avatar_url, now],
            )?;
            ensure_changed(changed, id)?;
            require_user(conn, id)
        })
        .await
    }

    /// Replaces the password hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown account.
    pub async fn set_password_hash(&self, id: UserId, hash: String) -> StoreResult<()> {
        self.run("set_password_hash", move |conn| {
            let now = now_millis();
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1;",
                params![id.get(), hash, now],
            )?;
            ensure_changed(changed, id)
        })
        .await
    }

    /// Stores a fresh OTP, replacing any outstanding one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown account.
    pub async fn set_otp(
        &self,
        id: UserId,
        code: String,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.run("set_otp", move |conn| {
            let now = now_millis();
            let changed = conn.execute(
                "UPDATE users SET otp_code = ?2, otp_expires_at = ?3, updated_at = ?4 WHERE id = ?1;",
                params![id.get(), code, expires_at.timestamp_millis(), now],
            )?;
            ensure_changed(changed, id)
        })
        .await
    }

    /// Marks the email verified and consumes the OTP.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown account.
    pub async fn mark_verified(&self, id: UserId) -> StoreResult<()> {
        self.run("mark_verified", move |conn| {
            let now = now_millis();
            let changed = conn.execute(
                "UPDATE users
                 SET otp_verified = 1, otp_code = NULL, otp_expires_at = NULL, updated_at = ?2
                 WHERE id = ?1;",
                params![id.get(), now],
            )?;
            ensure_changed(changed, id)
        })
        .await
    }

    /// Sets a new password hash and consumes the OTP.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown account.
    pub async fn reset_password(&self, id: UserId, hash: String) -> StoreResult<()> {
        self.run("reset_password", move |conn| {
            let now = now_millis();
            let changed = conn.execute(
                "UPDATE users
                 SET password_hash = ?2, otp_code = NULL, otp_expires_at = NULL, updated_at = ?3
                 WHERE id = ?1;",
                params![id.get(), hash, now],
            )?;
            ensure_changed(changed, id)
        })
        .await
    }

    /// Changes the platform role.
    #[cfg(test)]
    pub(crate) async fn set_role(&self, id: UserId, role: UserRole) -> StoreResult<()> {
        self.run("set_role", move |conn| {
            let now = now_millis();
            let changed = conn.execute(
                "UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1;",
                params![id.get(), role.as_str(), now],
            )?;
            ensure_changed(changed, id)
        })
        .await
    }

    /// Deletes the account together with its manuscripts, feedback, and notifications.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown account.
    pub async fn delete_user(&self, id: UserId) -> StoreResult<()> {
        self.run("delete_user", move |conn| {
            let changed = conn.execute("DELETE FROM users WHERE id = ?1;", params![id.get()])?;
            ensure_changed(changed, id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::fixtures;
    use chrono::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            full_name: "Mira Quill".to_string(),
            email: email.to_string(),
            password_hash: Some("$argon2id$hash".to_string()),
            role: UserRole::default(),
            otp_code: Some("12345".to_string()),
            otp_expires_at: Some(Utc::now() + Duration::minutes(10)),
        }
    }

    #[tokio::test]
    async fn create_user_defaults_to_unverified_reader() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        let user = store.create_user(new_user("mira@example.com")).await?;
        assert_eq!(user.role, UserRole::Reader);
        assert!(!user.otp_verified);
        assert_eq!(user.otp_code.as_deref(), Some("12345"));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        store.create_user(new_user("mira@example.com")).await?;
        let err = store
            .create_user(new_user("MIRA@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        Ok(())
    }

    #[tokio::test]
    async fn email_lookup_ignores_case() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        let created = store.create_user(new_user("mira@example.com")).await?;
        let found = store.find_user_by_email("Mira@Example.COM").await?;
        assert_eq!(found.map(|u| u.id), Some(created.id));
        assert!(store.find_user_by_email("nobody@example.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn verification_consumes_otp() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        let user = store.create_user(new_user("mira@example.com")).await?;
        store.mark_verified(user.id).await?;
        let user = store.find_user(user.id).await?.unwrap();
        assert!(user.otp_verified);
        assert!(user.otp_code.is_none());
        assert!(user.otp_expires_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_replaces_hash_and_clears_otp() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        let user = store.create_user(new_user("mira@example.com")).await?;
        let expires = Utc::now() + Duration::minutes(10);
        store.set_otp(user.id, "54321".to_string(), expires).await?;
        store.reset_password(user.id, "$argon2id$new".to_string()).await?;
        let user = store.find_user(user.id).await?.unwrap();
        assert_eq!(user.password_hash.as_deref(), Some("$argon2id$new"));
        assert!(user.otp_code.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn profile_patch_only_touches_provided_fields() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        let user = store.create_user(new_user("mira@example.com")).await?;
        let updated = store
            .update_profile(
                user.id,
                ProfilePatch {
                    bio: Some("Writes at night.".to_string()),
                    ..ProfilePatch::default()
                },
            )
            .await?;
        assert_eq!(updated.full_name, "Mira Quill");
        assert_eq!(updated.bio.as_deref(), Some("Writes at night."));
        Ok(())
    }

    #[tokio::test]
    async fn delete_user_cascades_manuscripts() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        let author = fixtures::user(&store, "Author").await?;
        let manuscript = fixtures::manuscript(&store, author, "Gone").await?;
        store.delete_user(author).await?;
        assert!(store.find_manuscript(manuscript).await?.is_none());
        let err = store.delete_user(author).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn list_users_returns_summaries() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        fixtures::user(&store, "Ann").await?;
        fixtures::user(&store, "Ben").await?;
        let users = store.list_users().await?;
        let names: Vec<_> = users.iter().map(|u| u.full_name.as_str()).collect();
        assert_eq!(names, ["Ann", "Ben"]);
        Ok(())
    }
}
