//! Audit trail of completed guest logins
//!
//! The router only appends; the table layout matches what earlier
//! deployments of the portal already have on disk.

use crate::models::AuditRecord;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

pub const DB_FILE: &str = "unifi-guest-portal.db";

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS user_sessions (
        cache_id TEXT PRIMARY KEY,
        id TEXT,
        ap TEXT,
        name TEXT,
        email TEXT,
        duration INTEGER,
        created_at TEXT
    )";

const INSERT_SESSION: &str = "
    INSERT INTO user_sessions (cache_id, id, ap, name, email, duration, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)";

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit write failed: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("cannot prepare audit directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only sink for completed authorizations
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    /// Open (or create) `<dir>/unifi-guest-portal.db`.
    pub async fn open(dir: &Path) -> Result<Self, AuditError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(DB_FILE);
        tracing::info!("Audit database: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, AuditError> {
        Self::connect(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, AuditError> {
        // One connection: an in-memory database is per-connection, and the
        // write rate is a handful of guests per minute.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        sqlx::query(INSERT_SESSION)
            .bind(&record.token)
            .bind(&record.device_id)
            .bind(&record.ap_id)
            .bind(&record.display_name)
            .bind(&record.email)
            .bind(record.duration_minutes)
            .bind(record.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        tracing::debug!("Recorded guest session {}", record.token);
        Ok(())
    }
}
