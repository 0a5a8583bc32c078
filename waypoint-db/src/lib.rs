mod error;
mod models;

pub use error::{DbError, Result};
pub use models::{
  DiscordProfileFields, NewUser, User, VERIFICATION_PIN_TTL_MS, make_fake_discord_email,
};

use models::{roles_from_column, roles_to_column};
use std::path::Path;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{OptionalExtension, Row, params};
use tracing::{debug, info};

const USER_COLUMNS: &str = "id, name, email, password, has_verified_email, verification_pin, \
                            verification_pin_sent_at, roles, current_server_address, \
                            current_session, discord_id, discord_username, \
                            discord_discriminator, discord_avatar, created_at, updated_at";

fn map_user(row: &Row<'_>) -> tokio_rusqlite::rusqlite::Result<User> {
  Ok(User {
    id: row.get(0)?,
    name: row.get(1)?,
    email: row.get(2)?,
    password_hash: row.get(3)?,
    has_verified_email: row.get(4)?,
    verification_pin_hash: row.get(5)?,
    verification_pin_sent_at: row.get(6)?,
    roles: roles_from_column(&row.get::<_, String>(7)?),
    current_server_address: row.get(8)?,
    current_session: row.get(9)?,
    discord_id: row.get(10)?,
    discord_username: row.get(11)?,
    discord_discriminator: row.get(12)?,
    discord_avatar: row.get(13)?,
    created_at: row.get(14)?,
    updated_at: row.get(15)?,
  })
}

/// User store for all Waypoint account operations.
///
/// Everything time-sensitive goes through conditional updates whose WHERE
/// clause re-checks the precondition fields; callers learn about lost races
/// from the affected-row count, never from a held lock.
#[derive(Clone)]
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create a database at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Create an in-memory database (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Initialize the database schema.
  async fn initialize(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        // Enable WAL mode for better concurrent read/write performance
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute_batch(
          r#"
          CREATE TABLE IF NOT EXISTS users (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL UNIQUE,
              email TEXT NOT NULL UNIQUE,
              password TEXT NOT NULL,
              has_verified_email INTEGER NOT NULL DEFAULT 0,
              verification_pin TEXT,
              verification_pin_sent_at INTEGER,
              roles TEXT NOT NULL DEFAULT 'user',
              current_server_address TEXT,
              current_session TEXT,
              discord_id TEXT,
              discord_username TEXT,
              discord_discriminator TEXT,
              discord_avatar TEXT,
              created_at INTEGER NOT NULL,
              updated_at INTEGER NOT NULL
          );

          -- Exact-match session ticket resolution
          CREATE INDEX IF NOT EXISTS idx_users_session
              ON users(current_server_address, current_session);
          "#,
        )?;
        Ok(())
      })
      .await?;

    info!("database initialized");
    Ok(())
  }

  // ========================================================================
  // Creation & key lookups
  // ========================================================================

  /// Create a new account.
  /// Fails with [`DbError::EmailTaken`] / [`DbError::NameTaken`] on duplicates.
  pub async fn create_user(&self, new: NewUser, now: i64) -> Result<User> {
    let user = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let email_exists: bool = tx
          .prepare_cached("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)")?
          .query_row(params![&new.email], |row| row.get(0))?;
        if email_exists {
          return Ok(Err(DbError::EmailTaken));
        }

        let name_exists: bool = tx
          .prepare_cached("SELECT EXISTS(SELECT 1 FROM users WHERE name = ?1)")?
          .query_row(params![&new.name], |row| row.get(0))?;
        if name_exists {
          return Ok(Err(DbError::NameTaken));
        }

        let (discord_id, discord_username, discord_discriminator, discord_avatar) =
          match &new.discord {
            Some(d) => (
              Some(d.discord_id.clone()),
              d.username.clone(),
              d.discriminator.clone(),
              d.avatar.clone(),
            ),
            None => (None, None, None, None),
          };

        tx.prepare_cached(
          "INSERT INTO users (name, email, password, has_verified_email, verification_pin, \
           verification_pin_sent_at, roles, discord_id, discord_username, \
           discord_discriminator, discord_avatar, created_at, updated_at) \
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?
        .execute(params![
          &new.name,
          &new.email,
          &new.password_hash,
          new.has_verified_email,
          &new.verification_pin_hash,
          now,
          &roles_to_column(&["user".to_string()]),
          discord_id,
          discord_username,
          discord_discriminator,
          discord_avatar,
          now,
          now,
        ])?;

        let user = tx
          .prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))?
          .query_row(params![&new.email], map_user)?;

        tx.commit()?;
        Ok(Ok(user))
      })
      .await??;

    debug!(user.id, %user.name, "created user");
    Ok(user)
  }

  /// Look up a user by id.
  pub async fn user_by_id(&self, id: i64) -> Result<Option<User>> {
    let user = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?
          .query_row(params![id], map_user)
          .optional()
      })
      .await?;

    Ok(user)
  }

  /// Look up a user by e-mail.
  pub async fn user_by_email(&self, email: String) -> Result<Option<User>> {
    let user = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))?
          .query_row(params![&email], map_user)
          .optional()
      })
      .await?;

    Ok(user)
  }

  /// Look up a user by e-mail and password hash (password login).
  pub async fn user_by_credentials(
    &self,
    email: String,
    password_hash: String,
  ) -> Result<Option<User>> {
    let user = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1 AND password = ?2"
          ))?
          .query_row(params![&email, &password_hash], map_user)
          .optional()
      })
      .await?;

    Ok(user)
  }

  /// Look up a user by the exact claim triple carried in a bearer token.
  ///
  /// A changed e-mail or revoked verification makes this return `None`,
  /// which invalidates every outstanding token without a blocklist.
  pub async fn user_by_claims(
    &self,
    id: i64,
    email: String,
    has_verified_email: bool,
  ) -> Result<Option<User>> {
    let user = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE id = ?1 AND email = ?2 AND has_verified_email = ?3"
          ))?
          .query_row(params![id, &email, has_verified_email], map_user)
          .optional()
      })
      .await?;

    Ok(user)
  }

  /// Resolve a session ticket by exact (server address, session) match.
  pub async fn user_by_session(
    &self,
    server_address: String,
    session: String,
  ) -> Result<Option<User>> {
    let user = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE current_server_address = ?1 AND current_session = ?2"
          ))?
          .query_row(params![&server_address, &session], map_user)
          .optional()
      })
      .await?;

    Ok(user)
  }

  // ========================================================================
  // Conditional updates
  // ========================================================================

  /// Flip `has_verified_email` if every precondition still holds:
  /// id, PIN hash, optionally the password hash, and not-yet-verified.
  /// Returns whether a row was affected.
  pub async fn confirm_verification(
    &self,
    id: i64,
    pin_hash: String,
    password_hash: Option<String>,
    now: i64,
  ) -> Result<bool> {
    let affected = self
      .conn
      .call(move |conn| {
        let affected = match &password_hash {
          Some(password_hash) => conn
            .prepare_cached(
              "UPDATE users SET has_verified_email = 1, updated_at = ?1 \
               WHERE id = ?2 AND verification_pin = ?3 AND password = ?4 \
               AND has_verified_email = 0",
            )?
            .execute(params![now, id, &pin_hash, password_hash])?,
          None => conn
            .prepare_cached(
              "UPDATE users SET has_verified_email = 1, updated_at = ?1 \
               WHERE id = ?2 AND verification_pin = ?3 AND has_verified_email = 0",
            )?
            .execute(params![now, id, &pin_hash])?,
        };
        Ok(affected > 0)
      })
      .await?;

    debug!(id, affected, "confirm verification");
    Ok(affected)
  }

  /// Store a freshly issued PIN, but only while the account is unverified.
  /// Returns whether a row was affected.
  pub async fn rotate_verification_pin(
    &self,
    id: i64,
    pin_hash: String,
    now: i64,
  ) -> Result<bool> {
    let affected = self
      .conn
      .call(move |conn| {
        let affected = conn
          .prepare_cached(
            "UPDATE users SET verification_pin = ?1, verification_pin_sent_at = ?2, \
             updated_at = ?2 WHERE id = ?3 AND has_verified_email = 0",
          )?
          .execute(params![&pin_hash, now, id])?;
        Ok(affected > 0)
      })
      .await?;

    debug!(id, affected, "rotate verification pin");
    Ok(affected)
  }

  /// Change the password for a verified account. When `old_password_hash` is
  /// given it becomes part of the precondition. Returns whether a row was
  /// affected.
  pub async fn reset_password(
    &self,
    email: String,
    old_password_hash: Option<String>,
    new_password_hash: String,
    now: i64,
  ) -> Result<bool> {
    let affected = self
      .conn
      .call(move |conn| {
        let affected = match &old_password_hash {
          Some(old) => conn
            .prepare_cached(
              "UPDATE users SET password = ?1, updated_at = ?2 \
               WHERE email = ?3 AND password = ?4 AND has_verified_email = 1",
            )?
            .execute(params![&new_password_hash, now, &email, old])?,
          None => conn
            .prepare_cached(
              "UPDATE users SET password = ?1, updated_at = ?2 \
               WHERE email = ?3 AND has_verified_email = 1",
            )?
            .execute(params![&new_password_hash, now, &email])?,
        };
        Ok(affected > 0)
      })
      .await?;

    debug!(affected, "reset password");
    Ok(affected)
  }

  /// Overwrite the user's (server address, session ticket) pair.
  /// The previous pair is discarded whether or not it was ever resolved.
  pub async fn set_session(
    &self,
    id: i64,
    server_address: String,
    session: String,
    now: i64,
  ) -> Result<()> {
    let result = self
      .conn
      .call(move |conn| {
        let affected = conn
          .prepare_cached(
            "UPDATE users SET current_server_address = ?1, current_session = ?2, \
             updated_at = ?3 WHERE id = ?4",
          )?
          .execute(params![&server_address, &session, now, id])?;

        if affected == 0 {
          return Ok(Err(DbError::UserNotFound));
        }
        Ok(Ok(()))
      })
      .await??;

    debug!(id, "bound session ticket");
    Ok(result)
  }

  /// Refresh the mutable Discord profile fields unconditionally.
  pub async fn update_discord_profile(
    &self,
    id: i64,
    profile: DiscordProfileFields,
    now: i64,
  ) -> Result<()> {
    let result = self
      .conn
      .call(move |conn| {
        let affected = conn
          .prepare_cached(
            "UPDATE users SET discord_id = ?1, discord_username = ?2, \
             discord_discriminator = ?3, discord_avatar = ?4, updated_at = ?5 \
             WHERE id = ?6",
          )?
          .execute(params![
            &profile.discord_id,
            &profile.username,
            &profile.discriminator,
            &profile.avatar,
            now,
            id,
          ])?;

        if affected == 0 {
          return Ok(Err(DbError::UserNotFound));
        }
        Ok(Ok(()))
      })
      .await??;

    debug!(id, "updated discord profile");
    Ok(result)
  }
}
