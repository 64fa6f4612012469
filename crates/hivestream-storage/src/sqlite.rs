//! SQLite storage backend.
//!
//! Persists the resume cursor, scheduled actions, routed transfers and
//! custom JSON, and the contract audit log in a single SQLite file. Uses
//! `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use hivestream_storage::sqlite::SqliteAdapter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteAdapter::open("./hivestream.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteAdapter::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use hivestream_core::action::ScheduledAction;
use hivestream_core::adapter::{ContractEvent, PersistenceAdapter, StreamState};
use hivestream_core::envelope::{CustomJsonMeta, PayloadEnvelope, TransferMeta};
use hivestream_core::error::StreamerError;
use hivestream_core::types::{CustomJsonOp, TransferOp};

fn storage(e: impl ToString) -> StreamerError {
    StreamerError::Storage(e.to_string())
}

/// SQLite-backed persistence adapter.
pub struct SqliteAdapter {
    pool: SqlitePool,
}

impl SqliteAdapter {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./hivestream.db"`) or a full
    /// SQLite URL (`"sqlite:./hivestream.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, StreamerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage)?;
        let adapter = Self { pool };
        adapter.init_schema().await?;
        Ok(adapter)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, StreamerError> {
        // Every connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;

        let adapter = Self { pool };
        adapter.init_schema().await?;
        Ok(adapter)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), StreamerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        // Single-row cursor table
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stream_state (
                id                INTEGER PRIMARY KEY CHECK (id = 1),
                last_block_number INTEGER NOT NULL,
                updated_at        TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS actions (
                id        TEXT    PRIMARY KEY,
                position  INTEGER NOT NULL,
                body_json TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transfers (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                sender          TEXT NOT NULL,
                receiver        TEXT NOT NULL,
                amount          TEXT NOT NULL,
                contract_name   TEXT NOT NULL,
                contract_action TEXT NOT NULL,
                payload_json    TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS custom_json (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                custom_json_id  TEXT    NOT NULL,
                sender          TEXT    NOT NULL,
                is_active       INTEGER NOT NULL,
                contract_name   TEXT    NOT NULL,
                contract_action TEXT    NOT NULL,
                payload_json    TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                date          TEXT NOT NULL,
                contract_name TEXT NOT NULL,
                action        TEXT NOT NULL,
                payload_json  TEXT NOT NULL,
                data_json     TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_contract ON events (contract_name);")
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        Ok(())
    }

    // ─── Audit queries ──────────────────────────────────────────────────────

    /// Audit log entries for `contract_name`, oldest first.
    pub async fn events_for(&self, contract_name: &str) -> Result<Vec<ContractEvent>, StreamerError> {
        let rows = sqlx::query(
            "SELECT date, contract_name, action, payload_json, data_json
             FROM events WHERE contract_name = ? ORDER BY id",
        )
        .bind(contract_name)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let date: String = row.get("date");
            let payload: String = row.get("payload_json");
            let data: String = row.get("data_json");
            events.push(ContractEvent {
                date: DateTime::parse_from_rfc3339(&date)
                    .map_err(storage)?
                    .with_timezone(&Utc),
                contract_name: row.get("contract_name"),
                action: row.get("action"),
                payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
            });
        }
        Ok(events)
    }

    /// Number of routed transfers recorded.
    pub async fn transfer_count(&self) -> Result<u64, StreamerError> {
        self.count("SELECT COUNT(*) as cnt FROM transfers").await
    }

    /// Number of routed custom JSON operations recorded.
    pub async fn custom_json_count(&self) -> Result<u64, StreamerError> {
        self.count("SELECT COUNT(*) as cnt FROM custom_json").await
    }

    async fn count(&self, sql: &str) -> Result<u64, StreamerError> {
        let row = sqlx::query(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── PersistenceAdapter impl ─────────────────────────────────────────────────

#[async_trait]
impl PersistenceAdapter for SqliteAdapter {
    async fn destroy(&self) -> Result<(), StreamerError> {
        self.pool.close().await;
        Ok(())
    }

    async fn load_state(&self) -> Result<Option<StreamState>, StreamerError> {
        let cursor = sqlx::query("SELECT last_block_number FROM stream_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        let actions = self.load_actions().await?;

        match cursor {
            Some(row) => Ok(Some(StreamState {
                last_block_number: row.get::<i64, _>("last_block_number") as u64,
                actions,
            })),
            None if !actions.is_empty() => Ok(Some(StreamState {
                last_block_number: 0,
                actions,
            })),
            None => Ok(None),
        }
    }

    async fn load_actions(&self) -> Result<Vec<ScheduledAction>, StreamerError> {
        let rows = sqlx::query("SELECT body_json FROM actions ORDER BY position")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        rows.iter()
            .map(|row| {
                let body: String = row.get("body_json");
                serde_json::from_str(&body).map_err(storage)
            })
            .collect()
    }

    async fn save_state(&self, state: &StreamState) -> Result<(), StreamerError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query(
            "INSERT OR REPLACE INTO stream_state (id, last_block_number, updated_at)
             VALUES (1, ?, ?)",
        )
        .bind(state.last_block_number as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query("DELETE FROM actions")
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        for (position, action) in state.actions.iter().enumerate() {
            let body = serde_json::to_string(action).map_err(storage)?;
            sqlx::query("INSERT INTO actions (id, position, body_json) VALUES (?, ?, ?)")
                .bind(&action.id)
                .bind(position as i64)
                .bind(&body)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;

        debug!(block = state.last_block_number, actions = state.actions.len(), "state saved");
        Ok(())
    }

    async fn process_transfer(
        &self,
        op: &TransferOp,
        envelope: &PayloadEnvelope,
        meta: &TransferMeta,
    ) -> Result<(), StreamerError> {
        let payload = serde_json::to_string(&envelope.payload).map_err(storage)?;
        sqlx::query(
            "INSERT INTO transfers (sender, receiver, amount, contract_name, contract_action, payload_json)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&meta.sender)
        .bind(&op.to)
        .bind(&meta.amount)
        .bind(&envelope.name)
        .bind(&envelope.action)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn process_custom_json(
        &self,
        _op: &CustomJsonOp,
        envelope: &PayloadEnvelope,
        meta: &CustomJsonMeta,
    ) -> Result<(), StreamerError> {
        let payload = serde_json::to_string(&envelope.payload).map_err(storage)?;
        sqlx::query(
            "INSERT INTO custom_json (custom_json_id, sender, is_active, contract_name, contract_action, payload_json)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&meta.id)
        .bind(&meta.sender)
        .bind(meta.is_signed_with_active_key)
        .bind(&envelope.name)
        .bind(&envelope.action)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn add_event(&self, event: ContractEvent) -> Result<(), StreamerError> {
        let payload = serde_json::to_string(&event.payload).map_err(storage)?;
        let data = serde_json::to_string(&event.data).map_err(storage)?;
        sqlx::query(
            "INSERT INTO events (date, contract_name, action, payload_json, data_json)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.date.to_rfc3339())
        .bind(&event.contract_name)
        .bind(&event.action)
        .bind(&payload)
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        debug!(contract = %event.contract_name, action = %event.action, "event stored");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
