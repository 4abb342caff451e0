//! Session ledger: company-scoped login sessions with an order ceiling.
//!
//! Each session row carries `TotalOrders` (the ceiling) and `UsedOrders`
//! (spent so far). The ledger guarantees `0 <= UsedOrders <= TotalOrders`
//! after every successful mutation: an update that would break it is
//! rejected and leaves the row unchanged, never clamped.
//!
//! Mutations are single conditional `UPDATE` statements whose `WHERE`
//! clause carries the ceiling check, executed under a per-session lock.
//! The table's `CHECK` constraint backs the same invariant in the database.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{info, warn};

use crate::error::SessionError;
use crate::locks::KeyLocks;

const CREATE_SESSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS Sessions (
    SessionId   TEXT PRIMARY KEY,
    CompanyId   TEXT NOT NULL,
    Token       TEXT UNIQUE NOT NULL,
    LoginTime   TEXT NOT NULL,
    Status      TEXT NOT NULL,
    TotalOrders INTEGER NOT NULL DEFAULT 0 CHECK (TotalOrders >= 0),
    UsedOrders  INTEGER NOT NULL DEFAULT 0 CHECK (UsedOrders >= 0 AND UsedOrders <= TotalOrders)
)";

/// Status given to sessions created without one.
pub const DEFAULT_STATUS: &str = "Active";

/// A persisted session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct Session {
    #[sqlx(rename = "SessionId")]
    pub session_id: String,
    #[sqlx(rename = "CompanyId")]
    pub company_id: String,
    #[sqlx(rename = "Token")]
    pub token: String,
    #[sqlx(rename = "LoginTime")]
    pub login_time: DateTime<Utc>,
    #[sqlx(rename = "Status")]
    pub status: String,
    #[sqlx(rename = "TotalOrders")]
    pub total_orders: u32,
    #[sqlx(rename = "UsedOrders")]
    pub used_orders: u32,
}

/// Parameters for a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub company_id: String,
    /// Must be unique across all sessions.
    pub token: String,
    pub status: String,
    pub total_orders: u32,
    pub used_orders: u32,
}

impl NewSession {
    /// An `Active` session with no orders.
    #[must_use]
    pub fn new(company_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            token: token.into(),
            status: DEFAULT_STATUS.to_owned(),
            total_orders: 0,
            used_orders: 0,
        }
    }

    #[must_use]
    pub fn with_orders(mut self, total: u32, used: u32) -> Self {
        self.total_orders = total;
        self.used_orders = used;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

/// Columns a session search may match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionColumn {
    SessionId,
    CompanyId,
    Token,
    LoginTime,
    Status,
}

impl SessionColumn {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::SessionId => "SessionId",
            Self::CompanyId => "CompanyId",
            Self::Token => "Token",
            Self::LoginTime => "LoginTime",
            Self::Status => "Status",
        }
    }
}

impl std::str::FromStr for SessionColumn {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "").as_str() {
            "sessionid" => Ok(Self::SessionId),
            "companyid" => Ok(Self::CompanyId),
            "token" => Ok(Self::Token),
            "logintime" => Ok(Self::LoginTime),
            "status" => Ok(Self::Status),
            _ => Err(SessionError::UnknownColumn { name: s.to_owned() }),
        }
    }
}

/// SQLite-backed session ledger.
pub struct SessionLedger {
    pool: SqlitePool,
    locks: KeyLocks,
}

impl SessionLedger {
    /// The underlying pool, for other tables kept in the same database.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wrap an existing pool. Call [`migrate`](Self::migrate) before use.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: KeyLocks::new(),
        }
    }

    /// Open (creating if needed) the database file at `path` and ensure the
    /// table exists.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Database`] if the file cannot be opened or
    /// the table cannot be created.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let ledger = Self::new(pool);
        ledger.migrate().await?;
        info!(path = %path.as_ref().display(), "session ledger opened");
        Ok(ledger)
    }

    /// Create the `Sessions` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Database`] on failure.
    pub async fn migrate(&self) -> Result<(), SessionError> {
        sqlx::query(CREATE_SESSIONS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a new session and return its id.
    ///
    /// # Errors
    ///
    /// - [`SessionError::CeilingViolation`] if `used_orders > total_orders`.
    /// - [`SessionError::Conflict`] if the token is already in use.
    /// - [`SessionError::Database`] on other database failures.
    pub async fn create(&self, new: NewSession) -> Result<String, SessionError> {
        if new.used_orders > new.total_orders {
            return Err(SessionError::CeilingViolation {
                used: new.used_orders,
                total: new.total_orders,
            });
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r"INSERT INTO Sessions
              (SessionId, CompanyId, Token, LoginTime, Status, TotalOrders, UsedOrders)
              VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session_id)
        .bind(&new.company_id)
        .bind(&new.token)
        .bind(Utc::now())
        .bind(&new.status)
        .bind(new.total_orders)
        .bind(new.used_orders)
        .execute(&self.pool)
        .await?;

        info!(
            session_id = %session_id,
            company_id = %new.company_id,
            total_orders = new.total_orders,
            "session created"
        );
        Ok(session_id)
    }

    /// Set `UsedOrders` to `new_used`.
    ///
    /// Returns `Ok(false)` and leaves the row unchanged if `new_used`
    /// exceeds `TotalOrders`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if the session does not exist.
    /// - [`SessionError::Database`] on database failure.
    pub async fn set_used(&self, session_id: &str, new_used: u32) -> Result<bool, SessionError> {
        let _guard = self.locks.acquire(session_id).await;

        let updated = sqlx::query(
            "UPDATE Sessions SET UsedOrders = ? WHERE SessionId = ? AND TotalOrders >= ?",
        )
        .bind(new_used)
        .bind(session_id)
        .bind(new_used)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(true);
        }

        let session = self.find_by_session_id(session_id).await?;
        warn!(
            session_id,
            requested = new_used,
            total_orders = session.total_orders,
            "used orders update rejected by ceiling"
        );
        Ok(false)
    }

    /// Add one to `UsedOrders`.
    ///
    /// Returns `Ok(false)` and leaves the row unchanged if the session is
    /// already at `TotalOrders`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if the session does not exist.
    /// - [`SessionError::Database`] on database failure.
    pub async fn increment_used(&self, session_id: &str) -> Result<bool, SessionError> {
        let _guard = self.locks.acquire(session_id).await;

        let updated = sqlx::query(
            "UPDATE Sessions SET UsedOrders = UsedOrders + 1 \
             WHERE SessionId = ? AND UsedOrders + 1 <= TotalOrders",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(true);
        }

        let session = self.find_by_session_id(session_id).await?;
        warn!(
            session_id,
            used_orders = session.used_orders,
            total_orders = session.total_orders,
            "order increment rejected by ceiling"
        );
        Ok(false)
    }

    /// Remove a session.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if the session does not exist.
    /// - [`SessionError::Database`] on database failure.
    pub async fn delete(&self, session_id: &str) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(session_id).await;

        let deleted = sqlx::query("DELETE FROM Sessions WHERE SessionId = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(SessionError::NotFound {
                lookup: format!("id {session_id}"),
            });
        }
        info!(session_id, "session deleted");
        Ok(())
    }

    /// Whether the session can take at least one more order.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if the session does not exist.
    /// - [`SessionError::Database`] on database failure.
    pub async fn has_capacity(&self, session_id: &str) -> Result<bool, SessionError> {
        let session = self.find_by_session_id(session_id).await?;
        Ok(session.used_orders < session.total_orders)
    }

    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if the session does not exist.
    /// - [`SessionError::Database`] on database failure.
    pub async fn find_by_session_id(&self, session_id: &str) -> Result<Session, SessionError> {
        sqlx::query_as::<_, Session>("SELECT * FROM Sessions WHERE SessionId = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| SessionError::NotFound {
                lookup: format!("id {session_id}"),
            })
    }

    /// Fetch a session by its login token.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if no session has this token.
    /// - [`SessionError::Database`] on database failure.
    pub async fn find_by_token(&self, token: &str) -> Result<Session, SessionError> {
        sqlx::query_as::<_, Session>("SELECT * FROM Sessions WHERE Token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| SessionError::NotFound {
                lookup: "token".to_owned(),
            })
    }

    /// Sessions whose `column` contains `keyword` as a substring.
    ///
    /// `%` and `_` in `keyword` match literally. Read-only.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Database`] on database failure.
    pub async fn search(
        &self,
        column: SessionColumn,
        keyword: &str,
    ) -> Result<Vec<Session>, SessionError> {
        let sql = format!(
            "SELECT * FROM Sessions WHERE {} LIKE ? ESCAPE '\\' ORDER BY LoginTime",
            column.as_sql()
        );
        let pattern = format!("%{}%", escape_like(keyword));

        let sessions = sqlx::query_as::<_, Session>(&sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(sessions)
    }
}

impl std::fmt::Debug for SessionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLedger").finish_non_exhaustive()
    }
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
