//! Durable claim-record storage.
//!
//! One row per claim, keyed by a fixed prefix + claim id, holding the
//! serialized `ClaimRecord`. This is the channel's source of truth; the
//! live broadcast path is only an accelerant on top of it.

use std::sync::Arc;

use sqlx::{Pool, Row, Sqlite, sqlite::SqlitePoolOptions};
use tokio::sync::Mutex;

use crate::errors::ClaimError;
use crate::record::{ClaimRecord, ClaimStatusUpdate};

pub type Db = Pool<Sqlite>;

/// Key prefix for persisted records.
pub const RECORD_KEY_PREFIX: &str = "claim_status_";

pub fn record_key(claim_id: &str) -> String {
    format!("{RECORD_KEY_PREFIX}{claim_id}")
}

#[derive(Clone)]
pub struct ClaimStore {
    db: Db,
    // Serializes the read-modify-write append within this process. Appends
    // are commutative; the lock only prevents a lost update when two local
    // contexts write the same record at once.
    write_lock: Arc<Mutex<()>>,
}

impl ClaimStore {
    pub async fn connect(db_url: &str) -> Result<Self, ClaimError> {
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .map_err(|e| ClaimError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// An ephemeral store for tests and throwaway sessions.
    ///
    /// Single connection: every clone of the pool sees the same in-memory
    /// database. Schema is already initialized.
    pub async fn connect_in_memory() -> Result<Self, ClaimError> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| ClaimError::Storage(e.to_string()))?;

        let store = Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn init_schema(&self) -> Result<(), ClaimError> {
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS claim_records (
  key TEXT PRIMARY KEY,
  claim_id TEXT NOT NULL,
  record_json TEXT NOT NULL,
  last_updated TEXT NOT NULL
);
"#,
        )
        .execute(&self.db)
        .await
        .map_err(|e| ClaimError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Append an update to the claim's log, creating the record if absent.
    ///
    /// Returns the merged record.
    pub async fn append(&self, update: &ClaimStatusUpdate) -> Result<ClaimRecord, ClaimError> {
        let _guard = self.write_lock.lock().await;

        let mut record = self
            .record(&update.claim_id)
            .await?
            .unwrap_or_else(|| ClaimRecord::new(&update.claim_id));
        record.apply(update.clone());

        let record_json = serde_json::to_string(&record)
            .map_err(|e| ClaimError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"INSERT OR REPLACE INTO claim_records (key, claim_id, record_json, last_updated)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(record_key(&record.claim_id))
        .bind(&record.claim_id)
        .bind(record_json)
        .bind(record.last_updated.to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(|e| ClaimError::Storage(e.to_string()))?;

        Ok(record)
    }

    pub async fn record(&self, claim_id: &str) -> Result<Option<ClaimRecord>, ClaimError> {
        let row = sqlx::query(r#"SELECT record_json FROM claim_records WHERE key = ?"#)
            .bind(record_key(claim_id))
            .fetch_optional(&self.db)
            .await
            .map_err(|e| ClaimError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let record_json: String = row.get(0);
        let record = serde_json::from_str(&record_json)
            .map_err(|e| ClaimError::Serialization(e.to_string()))?;
        Ok(Some(record))
    }

    /// All records, most recently updated first.
    pub async fn list_records(&self) -> Result<Vec<ClaimRecord>, ClaimError> {
        let rows = sqlx::query(r#"SELECT record_json FROM claim_records ORDER BY last_updated DESC"#)
            .fetch_all(&self.db)
            .await
            .map_err(|e| ClaimError::Storage(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record_json: String = row.get(0);
            let record: ClaimRecord = serde_json::from_str(&record_json)
                .map_err(|e| ClaimError::Serialization(e.to_string()))?;
            out.push(record);
        }

        Ok(out)
    }

    /// Purge every record. Explicit full reset only.
    pub async fn clear_all(&self) -> Result<(), ClaimError> {
        sqlx::query(r#"DELETE FROM claim_records"#)
            .execute(&self.db)
            .await
            .map_err(|e| ClaimError::Storage(e.to_string()))?;
        Ok(())
    }
}
