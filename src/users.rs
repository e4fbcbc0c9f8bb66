//! User and invite-record persistence.
//!
//! Users are keyed by their Telegram user ID and carry an invite code and a
//! remaining-count balance used by the quota limiter. Invite records link an
//! inviter to the user who joined through their code.

use std::sync::Arc;

use rand::RngExt;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{RelayError, Result};

/// Invite codes are exactly this many ASCII letters.
pub const INVITE_CODE_LEN: usize = 10;

const INVITE_CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A bot user.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: i64,
    pub invite_code: String,
    pub remain_count: i64,
}

/// One accepted invitation, seen from the user who joined.
#[derive(Debug, Clone)]
pub struct InviteRecord {
    /// The inviter.
    pub user_id: i64,
}

/// Generate a random invite code of [`INVITE_CODE_LEN`] letters.
pub fn generate_invite_code() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; INVITE_CODE_LEN];
    rng.fill(&mut bytes[..]);
    bytes
        .iter()
        .map(|b| INVITE_CODE_ALPHABET[*b as usize % INVITE_CODE_ALPHABET.len()] as char)
        .collect()
}

/// Whether `code` has the shape of an invite code.
pub fn is_invite_code(code: &str) -> bool {
    code.len() == INVITE_CODE_LEN && code.chars().all(|c| c.is_ascii_alphabetic())
}

// ---------------------------------------------------------------------------
// User repository
// ---------------------------------------------------------------------------

pub struct UserRepository {
    db: Arc<Mutex<Connection>>,
    initial_count: i64,
}

const USER_COLUMNS: &str = "user_id, invite_code, remain_count";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        invite_code: row.get(1)?,
        remain_count: row.get(2)?,
    })
}

impl UserRepository {
    pub fn new(db: Arc<Mutex<Connection>>, initial_count: i64) -> Self {
        Self { db, initial_count }
    }

    #[cfg(test)]
    pub async fn get(&self, user_id: i64) -> Result<Option<User>> {
        let db = self.db.lock().await;
        Self::get_sync(&db, user_id)
    }

    fn get_sync(db: &Connection, user_id: i64) -> Result<Option<User>> {
        let user = db
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                [user_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub async fn get_by_invite_code(&self, code: &str) -> Result<Option<User>> {
        let db = self.db.lock().await;
        let user = db
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE invite_code = ?1"),
                [code],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Create the user if missing and return the stored row.
    pub async fn get_or_init(&self, user_id: i64, user_name: &str) -> Result<User> {
        let db = self.db.lock().await;
        if let Some(user) = Self::get_sync(&db, user_id)? {
            return Ok(user);
        }

        // Retry on the (unlikely) invite code collision.
        for _ in 0..5 {
            let code = generate_invite_code();
            let inserted = db.execute(
                "INSERT OR IGNORE INTO users (user_id, user_name, invite_code, remain_count)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, user_name, code, self.initial_count],
            )?;
            if inserted > 0 {
                info!(user_id, "user created");
                break;
            }
            warn!(user_id, "invite code collision, regenerating");
        }

        Self::get_sync(&db, user_id)?
            .ok_or_else(|| RelayError::Command(format!("failed to create user {user_id}")))
    }

    pub async fn count(&self) -> Result<i64> {
        let db = self.db.lock().await;
        Ok(db.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }

    pub async fn all_user_ids(&self) -> Result<Vec<i64>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT user_id FROM users ORDER BY created_at")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Credit `amount` to a user's remaining count.
    pub async fn add_count(&self, user_id: i64, amount: i64) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE users SET remain_count = remain_count + ?2, updated_at = datetime('now')
             WHERE user_id = ?1",
            rusqlite::params![user_id, amount],
        )?;
        Ok(())
    }

    /// Overwrite a user's remaining count. Errors if the user does not exist.
    pub async fn set_count(&self, user_id: i64, count: i64) -> Result<()> {
        let db = self.db.lock().await;
        let n = db.execute(
            "UPDATE users SET remain_count = ?2, updated_at = datetime('now') WHERE user_id = ?1",
            rusqlite::params![user_id, count],
        )?;
        if n == 0 {
            return Err(RelayError::Command(format!("no such user: {user_id}")));
        }
        Ok(())
    }

    /// Take one unit from the user's balance. Returns false when nothing was
    /// left to take.
    pub async fn consume_one(&self, user_id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let n = db.execute(
            "UPDATE users SET remain_count = remain_count - 1, updated_at = datetime('now')
             WHERE user_id = ?1 AND remain_count > 0",
            [user_id],
        )?;
        Ok(n > 0)
    }
}

// ---------------------------------------------------------------------------
// Invite record repository
// ---------------------------------------------------------------------------

pub struct InviteRepository {
    db: Arc<Mutex<Connection>>,
}

impl InviteRepository {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub async fn insert(&self, user_id: i64, invite_user_id: i64) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO user_invite_records (user_id, invite_user_id) VALUES (?1, ?2)",
            [user_id, invite_user_id],
        )?;
        info!(user_id, invite_user_id, "invite recorded");
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let db = self.db.lock().await;
        Ok(db.query_row("SELECT COUNT(*) FROM user_invite_records", [], |row| row.get(0))?)
    }

    pub async fn count_by_user(&self, user_id: i64) -> Result<i64> {
        let db = self.db.lock().await;
        Ok(db.query_row(
            "SELECT COUNT(*) FROM user_invite_records WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?)
    }

    /// The record for the user who joined, if they were ever invited.
    pub async fn get_by_invite_user(&self, invite_user_id: i64) -> Result<Option<InviteRecord>> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                "SELECT user_id FROM user_invite_records WHERE invite_user_id = ?1",
                [invite_user_id],
                |row| Ok(InviteRecord { user_id: row.get(0)? }),
            )
            .optional()?;
        Ok(record)
    }
}
