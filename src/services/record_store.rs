//! Structured storage for inspection records.
//!
//! `RecordStore` is the capability the pipeline writes through.
//! `SqliteRecordStore` keeps records in a local SQLite database; the
//! PostgREST-backed implementation lives in `services::supabase`.

use crate::models::inspection::InspectionRecord;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{path::Path, time::Duration};
use thiserror::Error;
use uuid::Uuid;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("record store rejected insert ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("record store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("record store call timed out after {0:?}")]
    Timeout(Duration),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Append-only sink for inspection records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one record.
    async fn insert(&self, record: &InspectionRecord) -> PersistenceResult<()>;

    /// Cheap connectivity check used by the readiness probe.
    async fn ping(&self) -> PersistenceResult<()>;

    /// Short backend name for logs and readiness output.
    fn backend(&self) -> &'static str;
}

/// SQLite-backed record store.
#[derive(Clone, Debug)]
pub struct SqliteRecordStore {
    db: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Connect to `database_url`, creating the database file and its parent
    /// directory when missing.
    pub async fn connect(database_url: &str) -> PersistenceResult<Self> {
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        let in_memory = db_path.starts_with(":memory:");

        if !in_memory {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
                    tracing::info!("Created missing directory {:?}", parent);
                }
            }
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(db_path)
                .map_err(sqlx::Error::Io)?;
        }

        // an in-memory database only lives as long as its single connection
        let max_connections = if in_memory { 1 } else { 5 };
        let db = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(db))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> PersistenceResult<()> {
        let statements = MIGRATION_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            tracing::debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&self.db).await?;
        }
        Ok(())
    }

    /// Number of stored records.
    pub async fn count(&self) -> PersistenceResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM inspections")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &InspectionRecord) -> PersistenceResult<()> {
        sqlx::query(
            "INSERT INTO inspections
                (id, filename, image_url, prediction, defect_type, confidence,
                 user_id, device_name, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.filename)
        .bind(&record.image_url)
        .bind(&record.prediction)
        .bind(&record.defect_type)
        .bind(record.confidence)
        .bind(&record.user_id)
        .bind(&record.device_name)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> PersistenceResult<()> {
        let value = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.db)
            .await?;
        if value != 1 {
            return Err(PersistenceError::Sqlx(sqlx::Error::Protocol(format!(
                "unexpected result: {}",
                value
            ))));
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
