//! # SQLite Ticket State Store
//!
//! Durable [`TicketStateStore`] built on sqlx with SQLite. Writes are
//! conditional on the stored `version` column, so a stale writer gets a
//! [`RedirectError::StateConflict`] instead of silently overwriting a
//! concurrent redirect.
//!
//! ## Quick Start
//!
//! ```rust
//! use deskcall_redirect_engine::database::SqliteTicketStore;
//! use deskcall_redirect_engine::ticket::{TicketRedirectState, TicketStateStore};
//!
//! # tokio_test::block_on(async {
//! let store = SqliteTicketStore::new_in_memory().await.unwrap();
//! let state = store
//!     .insert(TicketRedirectState::new("T-100".into(), "alice", 3))
//!     .await
//!     .unwrap();
//!
//! let saved = store.save(&state).await.unwrap();
//! assert_eq!(saved.version, state.version + 1);
//! # });
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::{RedirectError, Result};
use crate::ticket::{
    CallStatus, RedirectHistoryEntry, TicketId, TicketRedirectState, TicketStateStore,
};

/// Ticket state persisted in SQLite
#[derive(Clone)]
pub struct SqliteTicketStore {
    pool: SqlitePool,
}

impl SqliteTicketStore {
    /// Open (or create) the database and run migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("🗄️ Opening ticket state store: {}", database_url);

        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // every in-memory connection is its own database, keep exactly one alive
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✅ Ticket state store ready");
        Ok(Self { pool })
    }

    /// In-memory database for tests and replays
    pub async fn new_in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn state_from_row(row: &SqliteRow) -> Result<TicketRedirectState> {
        let history: String = row.try_get("redirect_history")?;
        let redirect_history: Vec<RedirectHistoryEntry> = serde_json::from_str(&history)?;
        let call_status: String = row.try_get("call_status")?;

        Ok(TicketRedirectState {
            ticket_id: TicketId(row.try_get("ticket_id")?),
            redirect_count: to_u32(row.try_get("redirect_count")?, "redirect_count")?,
            max_redirects: to_u32(row.try_get("max_redirects")?, "max_redirects")?,
            redirect_history,
            call_status: CallStatus::parse(&call_status)?,
            current_assignee: row.try_get("current_assignee")?,
            requires_human_review: row.try_get("requires_human_review")?,
            version: u64::try_from(row.try_get::<i64, _>("version")?)
                .map_err(|_| RedirectError::storage("negative version column"))?,
        })
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| RedirectError::storage(format!("{} out of range: {}", column, value)))
}

fn version_param(version: u64) -> Result<i64> {
    i64::try_from(version).map_err(|_| RedirectError::storage("version overflow"))
}

#[async_trait]
impl TicketStateStore for SqliteTicketStore {
    async fn insert(&self, state: TicketRedirectState) -> Result<TicketRedirectState> {
        let history = serde_json::to_string(&state.redirect_history)?;
        let result = sqlx::query(
            "INSERT INTO ticket_redirect_state
                (ticket_id, redirect_count, max_redirects, redirect_history, call_status,
                 current_assignee, requires_human_review, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(ticket_id) DO NOTHING",
        )
        .bind(state.ticket_id.as_str())
        .bind(i64::from(state.redirect_count))
        .bind(i64::from(state.max_redirects))
        .bind(history)
        .bind(state.call_status.as_str())
        .bind(&state.current_assignee)
        .bind(state.requires_human_review)
        .bind(version_param(state.version)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RedirectError::state_conflict(format!(
                "ticket {} already exists",
                state.ticket_id
            )));
        }
        debug!(ticket = %state.ticket_id, "ticket state inserted");
        Ok(state)
    }

    async fn load(&self, ticket_id: &TicketId) -> Result<TicketRedirectState> {
        let row = sqlx::query(
            "SELECT ticket_id, redirect_count, max_redirects, redirect_history, call_status,
                    current_assignee, requires_human_review, version
             FROM ticket_redirect_state
             WHERE ticket_id = ?",
        )
        .bind(ticket_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RedirectError::not_found(format!("ticket {}", ticket_id)))?;

        Self::state_from_row(&row)
    }

    async fn save(&self, state: &TicketRedirectState) -> Result<TicketRedirectState> {
        let history = serde_json::to_string(&state.redirect_history)?;
        let expected = version_param(state.version)?;

        let result = sqlx::query(
            "UPDATE ticket_redirect_state
             SET redirect_count = ?, max_redirects = ?, redirect_history = ?, call_status = ?,
                 current_assignee = ?, requires_human_review = ?, version = version + 1,
                 updated_at = ?
             WHERE ticket_id = ? AND version = ?",
        )
        .bind(i64::from(state.redirect_count))
        .bind(i64::from(state.max_redirects))
        .bind(history)
        .bind(state.call_status.as_str())
        .bind(&state.current_assignee)
        .bind(state.requires_human_review)
        .bind(Utc::now())
        .bind(state.ticket_id.as_str())
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // tell a missing ticket apart from a stale version
            let current = self.load(&state.ticket_id).await?;
            return Err(RedirectError::state_conflict(format!(
                "ticket {} is at version {}, write was based on {}",
                state.ticket_id, current.version, state.version
            )));
        }

        let mut next = state.clone();
        next.version += 1;
        debug!(ticket = %state.ticket_id, version = next.version, "ticket state saved");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn persists_history_and_flags() {
        let store = SqliteTicketStore::new_in_memory().await.unwrap();
        let mut state = store
            .insert(TicketRedirectState::new("T-1".into(), "alice", 3))
            .await
            .unwrap();

        state.record_redirect("bob", "database performance").unwrap();
        state.call_status = CallStatus::Initiated;
        state.requires_human_review = true;
        store.save(&state).await.unwrap();

        let loaded = store.load(&"T-1".into()).await.unwrap();
        assert_eq!(loaded.redirect_count, 1);
        assert_eq!(loaded.current_assignee, "bob");
        assert_eq!(loaded.redirect_history[0].from_employee, "alice");
        assert_eq!(loaded.redirect_history[0].reason, "database performance");
        assert_eq!(loaded.call_status, CallStatus::Initiated);
        assert!(loaded.requires_human_review);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    #[serial]
    async fn stale_version_is_rejected() {
        let store = SqliteTicketStore::new_in_memory().await.unwrap();
        let state = store
            .insert(TicketRedirectState::new("T-2".into(), "alice", 3))
            .await
            .unwrap();

        store.save(&state).await.unwrap();
        let err = store.save(&state).await.unwrap_err();
        assert!(matches!(err, RedirectError::StateConflict(_)));

        let missing = TicketRedirectState::new("nope".into(), "alice", 3);
        assert!(matches!(store.save(&missing).await, Err(RedirectError::NotFound(_))));
    }

    #[tokio::test]
    #[serial]
    async fn duplicate_insert_conflicts() {
        let store = SqliteTicketStore::new_in_memory().await.unwrap();
        store
            .insert(TicketRedirectState::new("T-3".into(), "alice", 3))
            .await
            .unwrap();
        let err = store
            .insert(TicketRedirectState::new("T-3".into(), "bob", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, RedirectError::StateConflict(_)));
    }
}
