//! Cluster-wide mutual exclusion for ingestion runs.
//!
//! A [`LockBackend`] hands out at most one [`HeldLock`] per key across every
//! process sharing the backend. The handle is an owned resource: the run that
//! acquired it is the only thing that can release it, and releasing consumes
//! it. A handle that is dropped without being released still frees the key,
//! mirroring what happens to a Postgres session lock when its connection dies.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::error::{IngestError, IngestResult};
use crate::store::{is_transient, pg_backoff};

#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Non-blocking. `None` means another holder owns `key` right now.
    async fn try_acquire(&self, key: i64) -> IngestResult<Option<Box<dyn HeldLock>>>;

    /// Reachability probe for health checks.
    async fn ping(&self) -> IngestResult<()>;
}

/// A lock that is currently held.
#[async_trait]
pub trait HeldLock: Send {
    fn key(&self) -> i64;

    /// Release the lock. Returns whether the backend still considered it held.
    async fn release(self: Box<Self>) -> IngestResult<bool>;
}

// ============ Postgres advisory lock ============

/// Session-level `pg_try_advisory_lock` on a connection dedicated to the hold.
///
/// Every round trip (connect, lock, unlock, close) is capped at `timeout`.
/// Timeouts and connection failures are retried with jittered exponential
/// backoff, so a stalled database costs a run a bounded wait and then a lock error.
pub struct PgAdvisoryLock {
    options: PgConnectOptions,
    timeout: Duration,
}

impl PgAdvisoryLock {
    pub fn new(options: PgConnectOptions, timeout: Duration) -> Self {
        Self { options, timeout }
    }

    async fn connect(&self) -> Result<PgConnection, LockFailure> {
        bounded(self.timeout, "connect", self.options.connect()).await
    }

    /// One connect-and-lock attempt. The connection is dropped, and with it
    /// any lock the server granted, when the attempt fails.
    async fn acquire_once(&self, key: i64) -> Result<Option<PgConnection>, LockFailure> {
        let mut conn = self.connect().await?;
        let acquired: bool = bounded(
            self.timeout,
            "pg_try_advisory_lock",
            sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
                .bind(key)
                .fetch_one(&mut conn),
        )
        .await?;

        if acquired {
            return Ok(Some(conn));
        }
        debug!(key, "advisory lock held elsewhere");
        close(conn, self.timeout, key).await;
        Ok(None)
    }
}

/// Owns the session the advisory lock lives on.
struct PgLockHandle {
    key: i64,
    conn: PgConnection,
    timeout: Duration,
}

/// Why a single lock round trip failed.
#[derive(Debug)]
enum LockFailure {
    TimedOut {
        step: &'static str,
        after: Duration,
    },
    Sql {
        step: &'static str,
        source: sqlx::Error,
    },
}

impl LockFailure {
    fn is_transient(&self) -> bool {
        match self {
            LockFailure::TimedOut { .. } => true,
            LockFailure::Sql { source, .. } => is_transient(source),
        }
    }
}

impl fmt::Display for LockFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockFailure::TimedOut { step, after } => {
                write!(f, "{} timed out after {:?}", step, after)
            }
            LockFailure::Sql { step, source } => write!(f, "{} failed: {}", step, source),
        }
    }
}

impl From<LockFailure> for IngestError {
    fn from(failure: LockFailure) -> Self {
        IngestError::Lock(failure.to_string())
    }
}

async fn bounded<T, F>(limit: Duration, step: &'static str, fut: F) -> Result<T, LockFailure>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(LockFailure::Sql { step, source }),
        Err(_) => Err(LockFailure::TimedOut { step, after: limit }),
    }
}

/// Close the session; a close that fails or stalls just drops the socket,
/// which ends the session server-side all the same.
async fn close(conn: PgConnection, limit: Duration, key: i64) {
    if let Err(e) = bounded(limit, "close", conn.close()).await {
        warn!(key, error = %e, "failed to close lock connection");
    }
}

fn log_retry(failure: &LockFailure) -> bool {
    let transient = failure.is_transient();
    if transient {
        warn!(error = %failure, "retrying lock round trip");
    }
    transient
}

#[async_trait]
impl LockBackend for PgAdvisoryLock {
    async fn try_acquire(&self, key: i64) -> IngestResult<Option<Box<dyn HeldLock>>> {
        let conn = RetryIf::start(pg_backoff(), || self.acquire_once(key), log_retry).await?;
        Ok(conn.map(|conn| {
            Box::new(PgLockHandle {
                key,
                conn,
                timeout: self.timeout,
            }) as Box<dyn HeldLock>
        }))
    }

    async fn ping(&self) -> IngestResult<()> {
        let conn = self.connect().await?;
        bounded(self.timeout, "close", conn.close()).await?;
        Ok(())
    }
}

#[async_trait]
impl HeldLock for PgLockHandle {
    fn key(&self) -> i64 {
        self.key
    }

    async fn release(self: Box<Self>) -> IngestResult<bool> {
        let PgLockHandle {
            key,
            mut conn,
            timeout,
        } = *self;

        // The unlock has to run on the session that holds the lock, so retries
        // reuse the connection instead of going through `acquire_once`.
        let mut delays = pg_backoff();
        let unlocked = loop {
            let attempt = bounded(
                timeout,
                "pg_advisory_unlock",
                sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
                    .bind(key)
                    .fetch_one(&mut conn),
            )
            .await;
            match attempt {
                Err(failure) if log_retry(&failure) => match delays.next() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => break Err(failure),
                },
                other => break other,
            }
        };

        // Closing the session frees the lock even if the unlock query failed.
        close(conn, timeout, key).await;

        Ok(unlocked?)
    }
}

// ============ In-process ============

/// Lock table shared by every clone, standing in for the cluster.
#[derive(Clone, Default)]
pub struct MemoryLock {
    held: Arc<Mutex<HashSet<i64>>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, key: i64) -> bool {
        self.held.lock().map(|h| h.contains(&key)).unwrap_or(false)
    }
}

struct MemoryLockHandle {
    key: i64,
    held: Arc<Mutex<HashSet<i64>>>,
    released: bool,
}

impl MemoryLockHandle {
    fn unlock(&mut self) -> bool {
        self.released = true;
        match self.held.lock() {
            Ok(mut held) => held.remove(&self.key),
            Err(poisoned) => poisoned.into_inner().remove(&self.key),
        }
    }
}

impl Drop for MemoryLockHandle {
    fn drop(&mut self) {
        if !self.released {
            self.unlock();
        }
    }
}

#[async_trait]
impl LockBackend for MemoryLock {
    async fn try_acquire(&self, key: i64) -> IngestResult<Option<Box<dyn HeldLock>>> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| IngestError::Lock("lock table poisoned".to_string()))?;
        if !held.insert(key) {
            return Ok(None);
        }
        Ok(Some(Box::new(MemoryLockHandle {
            key,
            held: self.held.clone(),
            released: false,
        })))
    }

    async fn ping(&self) -> IngestResult<()> {
        Ok(())
    }
}

#[async_trait]
impl HeldLock for MemoryLockHandle {
    fn key(&self) -> i64 {
        self.key
    }

    async fn release(self: Box<Self>) -> IngestResult<bool> {
        let mut handle = self;
        Ok(handle.unlock())
    }
}
