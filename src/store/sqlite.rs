//! SQLite implementation of the TokenStore trait
//!
//! This module provides a durable, SQLite-based implementation of the token
//! store using rusqlite and tokio-rusqlite for async operations. All calls on
//! one connection are serialized onto a single worker thread, so `consume`'s
//! lookup-decrement-delete runs as one atomic step per token id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use super::TokenStore;
use crate::error::StoreError;
use crate::models::{AuthSubject, TokenRecord};

/// SQL statement to create the token schema
///
/// Timestamps are stored as unix milliseconds so expiry comparisons are plain
/// integer comparisons.
const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    username TEXT NOT NULL,
    roles TEXT NOT NULL,
    user_groups TEXT NOT NULL,
    issued_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    remaining_uses INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tokens_expires ON tokens(expires_at);
"#;

/// SQLite token store
pub struct SqliteTokenStore {
    conn: Connection,
}

impl SqliteTokenStore {
    /// Open a store at the given path
    ///
    /// Use `:memory:` for an in-memory database or a file path for persistent
    /// storage.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create an in-memory store (useful for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:").await
    }

    /// Number of live records (for maintenance logging and tests)
    pub async fn count(&self) -> Result<u64, StoreError> {
        self.conn
            .call(|conn| {
                let count: u64 =
                    conn.query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn insert(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let id = record.id.clone();
        let user_id = record.subject.user_id.clone();
        let username = record.subject.username.clone();
        let roles = serde_json::to_string(&record.subject.roles)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let groups = serde_json::to_string(&record.subject.groups)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let issued_at = record.issued_at.timestamp_millis();
        let expires_at = record.expires_at.timestamp_millis();
        let remaining_uses = record.remaining_uses as i64;

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO tokens
                    (id, user_id, username, roles, user_groups, issued_at, expires_at, remaining_uses)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    rusqlite::params![
                        id,
                        user_id,
                        username,
                        roles,
                        groups,
                        issued_at,
                        expires_at,
                        remaining_uses
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        let id = token_id.to_string();

        self.conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        r#"
                        SELECT id, user_id, username, roles, user_groups,
                               issued_at, expires_at, remaining_uses
                        FROM tokens
                        WHERE id = ?1
                        "#,
                        [&id],
                        row_to_record,
                    )
                    .optional()?;

                Ok(row)
            })
            .await
            .map_err(Into::into)
    }

    async fn consume(&self, token_id: &str) -> Result<TokenRecord, StoreError> {
        let id = token_id.to_string();
        let now = Utc::now().timestamp_millis();

        let consumed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let row = tx
                    .query_row(
                        r#"
                        SELECT id, user_id, username, roles, user_groups,
                               issued_at, expires_at, remaining_uses
                        FROM tokens
                        WHERE id = ?1
                        "#,
                        [&id],
                        row_to_record,
                    )
                    .optional()?;

                let Some(mut record) = row else {
                    tx.commit()?;
                    return Ok(None);
                };

                // Expired or already-drained records are removed on sight;
                // callers see plain not-found.
                if record.expires_at.timestamp_millis() <= now || record.remaining_uses == 0 {
                    tx.execute("DELETE FROM tokens WHERE id = ?1", [&id])?;
                    tx.commit()?;
                    return Ok(None);
                }

                record.remaining_uses -= 1;
                if record.remaining_uses == 0 {
                    tx.execute("DELETE FROM tokens WHERE id = ?1", [&id])?;
                } else {
                    tx.execute(
                        "UPDATE tokens SET remaining_uses = ?2 WHERE id = ?1",
                        rusqlite::params![id, record.remaining_uses as i64],
                    )?;
                }
                tx.commit()?;

                Ok(Some(record))
            })
            .await?;

        consumed.ok_or(StoreError::NotFound)
    }

    async fn revoke(&self, token_id: &str) -> Result<(), StoreError> {
        let id = token_id.to_string();

        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM tokens WHERE id = ?1", [&id])?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now().timestamp_millis();

        self.conn
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM tokens WHERE expires_at <= ?1", [now])?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Into::into)
    }
}

/// Map a tokens row to a TokenRecord
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TokenRecord> {
    let roles: String = row.get(3)?;
    let groups: String = row.get(4)?;
    let issued_at: i64 = row.get(5)?;
    let expires_at: i64 = row.get(6)?;
    let remaining_uses: i64 = row.get(7)?;

    Ok(TokenRecord {
        id: row.get(0)?,
        subject: AuthSubject {
            user_id: row.get(1)?,
            username: row.get(2)?,
            roles: serde_json::from_str(&roles).unwrap_or_default(),
            groups: serde_json::from_str(&groups).unwrap_or_default(),
        },
        issued_at: millis_to_datetime(issued_at),
        expires_at: millis_to_datetime(expires_at),
        remaining_uses: remaining_uses.max(0) as u32,
    })
}

/// Convert stored unix milliseconds back to a DateTime
///
/// An out-of-range value maps to the epoch, which reads as long-expired.
fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}
