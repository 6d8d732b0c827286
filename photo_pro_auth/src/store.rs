//! Auth Store - SQLite persistence for users, sessions, codes and history
//!
//! Every timestamp is written as a fixed-width RFC 3339 UTC string, so plain
//! text comparison in SQL orders the same way as time does.

use std::path::Path;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::policy::{SubscriptionStatus, TrialAccess};

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT UNIQUE NOT NULL,
        created_at TEXT NOT NULL,
        last_login TEXT,
        images_processed_count INTEGER NOT NULL DEFAULT 0,
        is_admin INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'active',
        trial_started_at TEXT NOT NULL,
        trial_images_used INTEGER NOT NULL DEFAULT 0,
        subscription_status TEXT NOT NULL DEFAULT 'trial'
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        token_hash TEXT UNIQUE NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS auth_codes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL,
        code TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        used INTEGER NOT NULL DEFAULT 0,
        used_at TEXT,
        attempts INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS processing_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        filename TEXT NOT NULL,
        original_size INTEGER,
        processing_time_ms INTEGER,
        method TEXT NOT NULL DEFAULT 'filters',
        processed_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
    CREATE INDEX IF NOT EXISTS idx_sessions_token ON sessions(token_hash);
    CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
    CREATE INDEX IF NOT EXISTS idx_auth_codes_email ON auth_codes(email);
    CREATE INDEX IF NOT EXISTS idx_processing_history_user ON processing_history(user_id);
"#;

const USER_COLUMNS: &str = "id, email, created_at, last_login, images_processed_count, \
     is_admin, status, trial_started_at, trial_images_used, subscription_status";

/// Canonical text form of a timestamp
pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_ts(idx, &text)
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_ts(idx, &t)).transpose()
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub images_processed_count: u32,
    pub is_admin: bool,
    pub status: String,
    pub trial_started_at: DateTime<Utc>,
    pub trial_images_used: u32,
    pub subscription_status: SubscriptionStatus,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            created_at: ts_col(row, 2)?,
            last_login: opt_ts_col(row, 3)?,
            images_processed_count: row.get(4)?,
            is_admin: row.get(5)?,
            status: row.get(6)?,
            trial_started_at: ts_col(row, 7)?,
            trial_images_used: row.get(8)?,
            subscription_status: row.get(9)?,
        })
    }

    pub fn trial_access(&self) -> TrialAccess {
        TrialAccess {
            is_admin: self.is_admin,
            subscription_status: self.subscription_status,
            trial_started_at: self.trial_started_at,
            trial_images_used: self.trial_images_used,
        }
    }
}

/// One processed image
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRecord {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    pub original_size: Option<u64>,
    pub processing_time_ms: Option<u64>,
    pub method: String,
    pub processed_at: DateTime<Utc>,
}

/// Aggregate totals for the admin dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalStats {
    pub total_users: u64,
    pub total_images_processed: u64,
    pub active_users_30_days: u64,
}

/// Outcome of checking a submitted verification code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Accepted,
    Mismatch { attempts_left: u32 },
    TooManyAttempts,
    NotFound,
}

/// SQLite-backed store
pub struct AuthStore {
    conn: Mutex<Connection>,
}

impl AuthStore {
    /// Open (or create) the database file
    pub fn open<P: AsRef<Path>>(path: P) -> AuthResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AuthError::Database(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path.as_ref())?;
        Self::init(conn)
    }

    /// Throwaway database (tests, dry runs)
    pub fn open_in_memory() -> AuthResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> AuthResult<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("auth store schema ready");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // USERS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn create_user(&self, email: &str, now: DateTime<Utc>) -> AuthResult<User> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (email, created_at, trial_started_at) VALUES (?1, ?2, ?2)",
            params![email, ts(now)],
        )?;
        let id = conn.last_insert_rowid();

        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            User::from_row,
        )
        .map_err(AuthError::from)
    }

    pub fn user_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            User::from_row,
        )
        .optional()
        .map_err(AuthError::from)
    }

    pub fn user_by_id(&self, id: i64) -> AuthResult<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            User::from_row,
        )
        .optional()
        .map_err(AuthError::from)
    }

    pub fn touch_last_login(&self, user_id: i64, now: DateTime<Utc>) -> AuthResult<()> {
        self.conn.lock().execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![ts(now), user_id],
        )?;
        Ok(())
    }

    /// Count one finished image against the lifetime counter
    pub fn increment_image_count(&self, user_id: i64) -> AuthResult<()> {
        let changed = self.conn.lock().execute(
            "UPDATE users SET images_processed_count = images_processed_count + 1 WHERE id = ?1",
            params![user_id],
        )?;

        if changed == 0 {
            return Err(AuthError::UserNotFound(user_id.to_string()));
        }
        Ok(())
    }

    /// Take one trial slot in a single conditional update.
    ///
    /// Admins and active subscribers always get a slot. Trial accounts need
    /// `trial_images_used < limit` and a trial that started after `trial_start_cutoff`.
    /// Returns false when no slot was taken.
    pub fn reserve_trial_image(
        &self,
        user_id: i64,
        limit: u32,
        trial_start_cutoff: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE users SET trial_images_used = trial_images_used + 1 \
             WHERE id = ?1 AND (is_admin = 1 OR subscription_status = 'active' \
             OR (subscription_status = 'trial' AND trial_images_used < ?2 AND trial_started_at > ?3))",
            params![user_id, limit, ts(trial_start_cutoff)],
        )?;
        Ok(changed > 0)
    }

    /// Give back a slot taken by [`AuthStore::reserve_trial_image`]
    pub fn release_trial_image(&self, user_id: i64) -> AuthResult<()> {
        self.conn.lock().execute(
            "UPDATE users SET trial_images_used = MAX(trial_images_used - 1, 0) WHERE id = ?1",
            params![user_id],
        )?;
        Ok(())
    }

    pub fn set_subscription_status(
        &self,
        user_id: i64,
        status: SubscriptionStatus,
    ) -> AuthResult<()> {
        let changed = self.conn.lock().execute(
            "UPDATE users SET subscription_status = ?1 WHERE id = ?2",
            params![status, user_id],
        )?;

        if changed == 0 {
            return Err(AuthError::UserNotFound(user_id.to_string()));
        }
        Ok(())
    }

    /// Grant admin rights, creating the account if needed. Returns true when created.
    pub fn set_admin(&self, email: &str, now: DateTime<Utc>) -> AuthResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users SET is_admin = 1 WHERE email = ?1",
            params![email],
        )?;

        if changed > 0 {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO users (email, created_at, trial_started_at, is_admin) VALUES (?1, ?2, ?2, 1)",
            params![email, ts(now)],
        )?;
        Ok(true)
    }

    /// All users, newest first
    pub fn list_users(&self) -> AuthResult<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
        ))?;
        let users = stmt
            .query_map([], User::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn total_stats(&self, now: DateTime<Utc>) -> AuthResult<TotalStats> {
        let active_since = ts(now - Duration::days(30));
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(images_processed_count), 0), \
             COUNT(CASE WHEN last_login > ?1 THEN 1 END) \
             FROM users WHERE status = 'active'",
            params![active_since],
            |row| {
                Ok(TotalStats {
                    total_users: row.get(0)?,
                    total_images_processed: row.get(1)?,
                    active_users_30_days: row.get(2)?,
                })
            },
        )
        .map_err(AuthError::from)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SESSIONS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn create_session(
        &self,
        user_id: i64,
        token_hash: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        self.conn.lock().execute(
            "INSERT INTO sessions (user_id, token_hash, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, token_hash, ts(now), ts(expires_at)],
        )?;
        Ok(())
    }

    /// User owning a live session
    pub fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> AuthResult<Option<User>> {
        let columns = USER_COLUMNS
            .split(", ")
            .map(|c| format!("u.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");

        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {columns} FROM sessions s JOIN users u ON s.user_id = u.id \
                 WHERE s.token_hash = ?1 AND s.expires_at > ?2"
            ),
            params![token_hash, ts(now)],
            User::from_row,
        )
        .optional()
        .map_err(AuthError::from)
    }

    pub fn delete_session(&self, token_hash: &str) -> AuthResult<bool> {
        let removed = self.conn.lock().execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(removed > 0)
    }

    pub fn delete_expired_sessions(&self, now: DateTime<Utc>) -> AuthResult<usize> {
        let removed = self.conn.lock().execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![ts(now)],
        )?;
        Ok(removed)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // VERIFICATION CODES
    // ═══════════════════════════════════════════════════════════════════════

    /// Store a new code; any earlier unused code for the email stops working
    pub fn create_auth_code(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE auth_codes SET used = 1 WHERE email = ?1 AND used = 0",
            params![email],
        )?;
        tx.execute(
            "INSERT INTO auth_codes (email, code, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![email, code, ts(now), ts(expires_at)],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Check a submitted code and burn it on success or after too many misses
    pub fn consume_auth_code(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> AuthResult<CodeCheck> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let candidate: Option<(i64, String, u32)> = tx
            .query_row(
                "SELECT id, code, attempts FROM auth_codes \
                 WHERE email = ?1 AND used = 0 AND expires_at > ?2 \
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![email, ts(now)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((id, stored, attempts)) = candidate else {
            return Ok(CodeCheck::NotFound);
        };

        let check = if stored == code {
            tx.execute(
                "UPDATE auth_codes SET used = 1, used_at = ?1 WHERE id = ?2",
                params![ts(now), id],
            )?;
            CodeCheck::Accepted
        } else {
            let attempts = attempts + 1;
            if attempts >= max_attempts {
                tx.execute(
                    "UPDATE auth_codes SET attempts = ?1, used = 1 WHERE id = ?2",
                    params![attempts, id],
                )?;
                CodeCheck::TooManyAttempts
            } else {
                tx.execute(
                    "UPDATE auth_codes SET attempts = ?1 WHERE id = ?2",
                    params![attempts, id],
                )?;
                CodeCheck::Mismatch {
                    attempts_left: max_attempts - attempts,
                }
            }
        };

        tx.commit()?;
        Ok(check)
    }

    /// Drop codes that can never be accepted again
    pub fn delete_stale_auth_codes(&self, now: DateTime<Utc>) -> AuthResult<usize> {
        let removed = self.conn.lock().execute(
            "DELETE FROM auth_codes WHERE used = 1 OR expires_at <= ?1",
            params![ts(now)],
        )?;
        Ok(removed)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PROCESSING HISTORY
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_processing_record(
        &self,
        user_id: i64,
        filename: &str,
        original_size: u64,
        processing_time_ms: u64,
        method: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        self.conn.lock().execute(
            "INSERT INTO processing_history \
             (user_id, filename, original_size, processing_time_ms, method, processed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, filename, original_size, processing_time_ms, method, ts(now)],
        )?;
        Ok(())
    }

    /// Most recent records first
    pub fn processing_history(&self, user_id: i64, limit: usize) -> AuthResult<Vec<ProcessingRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, filename, original_size, processing_time_ms, method, processed_at \
             FROM processing_history WHERE user_id = ?1 \
             ORDER BY processed_at DESC, id DESC LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok(ProcessingRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    filename: row.get(2)?,
                    original_size: row.get(3)?,
                    processing_time_ms: row.get(4)?,
                    method: row.get(5)?,
                    processed_at: ts_col(row, 6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}
