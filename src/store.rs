//! Bookkeeping store: which content fingerprints have already been ingested.
//!
//! The [`ProcessedStore`] trait is the pipeline's only view of the
//! `processed_files` table. [`PgProcessedStore`] is the production backend;
//! [`MemoryProcessedStore`] honours the same contract for tests and dry local
//! runs.
//!
//! Uniqueness of fingerprints is enforced by the storage itself (a unique
//! index plus `ON CONFLICT` upsert), never by application-level locking.
//!
//! Every Postgres query except [`ProcessedStore::ping`] is retried on
//! transient failures with a bounded jittered backoff. The health probe
//! reports the first failure as-is.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::models::{BookkeepingSummary, ProcessedFileRecord};

/// Attempts after the first for a transient Postgres failure.
pub(crate) const PG_RETRIES: usize = 3;

#[async_trait]
pub trait ProcessedStore: Send + Sync {
    /// Whether a record exists for this fingerprint.
    async fn has_been_processed(&self, fingerprint: &str) -> IngestResult<bool>;

    /// Insert a record, or update path, point count and timestamp in place.
    async fn record_processed(
        &self,
        path: &str,
        fingerprint: &str,
        collection: &str,
        point_count: usize,
    ) -> IngestResult<()>;

    async fn fetch(&self, fingerprint: &str) -> IngestResult<Option<ProcessedFileRecord>>;

    async fn summary(&self) -> IngestResult<BookkeepingSummary>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> IngestResult<()>;
}

// ============ Postgres ============

pub struct PgProcessedStore {
    pool: PgPool,
}

impl PgProcessedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists_once(&self, fingerprint: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM processed_files WHERE source_hash = $1)")
            .bind(fingerprint)
            .fetch_one(&self.pool)
            .await
    }

    async fn upsert_once(
        &self,
        path: &str,
        fingerprint: &str,
        collection: &str,
        points: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO processed_files (file_path, source_hash, collection, points_count, processed_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (source_hash) DO UPDATE SET
                file_path = EXCLUDED.file_path,
                points_count = EXCLUDED.points_count,
                processed_at = EXCLUDED.processed_at
            "#,
        )
        .bind(path)
        .bind(fingerprint)
        .bind(collection)
        .bind(points)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_once(
        &self,
        fingerprint: &str,
    ) -> Result<Option<ProcessedFileRecord>, sqlx::Error> {
        let row: Option<(String, String, String, i32, DateTime<Utc>)> = sqlx::query_as(
            "SELECT file_path, source_hash, collection, points_count, processed_at FROM processed_files WHERE source_hash = $1",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(file_path, source_hash, collection, points_count, processed_at)| {
                ProcessedFileRecord {
                    file_path,
                    source_hash,
                    collection,
                    points_count: i64::from(points_count),
                    processed_at,
                }
            },
        ))
    }

    async fn summary_once(&self) -> Result<BookkeepingSummary, sqlx::Error> {
        let (files, points, empty_files, last_processed_at): (
            i64,
            i64,
            i64,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(points_count), 0)::BIGINT,
                COUNT(*) FILTER (WHERE points_count = 0),
                MAX(processed_at)
            FROM processed_files
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(BookkeepingSummary {
            files,
            points,
            empty_files,
            last_processed_at,
        })
    }
}

/// Jittered exponential backoff shared by bookkeeping and lock round trips.
pub(crate) fn pg_backoff() -> impl Iterator<Item = Duration> {
    // 100ms, 200ms, 400ms before jitter.
    ExponentialBackoff::from_millis(2)
        .factor(50)
        .max_delay(Duration::from_secs(2))
        .map(jitter)
        .take(PG_RETRIES)
}

pub(crate) fn is_transient(err: &sqlx::Error) -> bool {
    let transient = matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Protocol(_)
    );
    if transient {
        debug!(error = %err, "transient Postgres failure");
    }
    transient
}

#[async_trait]
impl ProcessedStore for PgProcessedStore {
    async fn has_been_processed(&self, fingerprint: &str) -> IngestResult<bool> {
        let exists = RetryIf::start(
            pg_backoff(),
            || self.exists_once(fingerprint),
            is_transient,
        )
        .await?;
        Ok(exists)
    }

    async fn record_processed(
        &self,
        path: &str,
        fingerprint: &str,
        collection: &str,
        point_count: usize,
    ) -> IngestResult<()> {
        let points = i32::try_from(point_count).map_err(|_| {
            IngestError::Bookkeeping(format!("point count {} out of range", point_count))
        })?;
        RetryIf::start(
            pg_backoff(),
            || self.upsert_once(path, fingerprint, collection, points),
            is_transient,
        )
        .await?;
        Ok(())
    }

    async fn fetch(&self, fingerprint: &str) -> IngestResult<Option<ProcessedFileRecord>> {
        let record = RetryIf::start(
            pg_backoff(),
            || self.fetch_once(fingerprint),
            is_transient,
        )
        .await?;
        Ok(record)
    }

    async fn summary(&self) -> IngestResult<BookkeepingSummary> {
        let summary = RetryIf::start(pg_backoff(), || self.summary_once(), is_transient).await?;
        Ok(summary)
    }

    async fn ping(&self) -> IngestResult<()> {
        sqlx::query("SELECT 1 FROM processed_files LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }
}

// ============ In-memory ============

/// `HashMap` keyed by fingerprint behind a `RwLock`.
#[derive(Default)]
pub struct MemoryProcessedStore {
    rows: RwLock<HashMap<String, ProcessedFileRecord>>,
}

impl MemoryProcessedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> IngestError {
    IngestError::Bookkeeping("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl ProcessedStore for MemoryProcessedStore {
    async fn has_been_processed(&self, fingerprint: &str) -> IngestResult<bool> {
        Ok(self.rows.read().map_err(poisoned)?.contains_key(fingerprint))
    }

    async fn record_processed(
        &self,
        path: &str,
        fingerprint: &str,
        collection: &str,
        point_count: usize,
    ) -> IngestResult<()> {
        let now = Utc::now();
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.entry(fingerprint.to_string())
            .and_modify(|row| {
                row.file_path = path.to_string();
                row.points_count = point_count as i64;
                row.processed_at = now;
            })
            .or_insert_with(|| ProcessedFileRecord {
                file_path: path.to_string(),
                source_hash: fingerprint.to_string(),
                collection: collection.to_string(),
                points_count: point_count as i64,
                processed_at: now,
            });
        Ok(())
    }

    async fn fetch(&self, fingerprint: &str) -> IngestResult<Option<ProcessedFileRecord>> {
        Ok(self.rows.read().map_err(poisoned)?.get(fingerprint).cloned())
    }

    async fn summary(&self) -> IngestResult<BookkeepingSummary> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(BookkeepingSummary {
            files: rows.len() as i64,
            points: rows.values().map(|r| r.points_count).sum(),
            empty_files: rows.values().filter(|r| r.points_count == 0).count() as i64,
            last_processed_at: rows.values().map(|r| r.processed_at).max(),
        })
    }

    async fn ping(&self) -> IngestResult<()> {
        Ok(())
    }
}
