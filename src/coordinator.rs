//! Guarded runs.
//!
//! Every trigger (HTTP, scheduler, CLI) funnels through
//! [`RunCoordinator::run_guarded`]. It takes the cluster-wide lock without
//! waiting, runs the batch, and releases the lock on every exit path,
//! including a panic inside the batch. Contention is reported as
//! [`RunStatus::Locked`], not as an error.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::UploadsConfig;
use crate::error::IngestResult;
use crate::lock::LockBackend;
use crate::models::{BatchResult, RunStatus};
use crate::pipeline::Pipeline;
use crate::scan::{list_files, resolve_paths};

/// Which documents a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestTarget {
    /// Every visible file under the uploads root.
    All,
    /// Explicit paths; relative ones resolve against the uploads root.
    Paths(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub target: IngestTarget,
    /// Embedding model for this run only.
    pub model: Option<String>,
}

impl RunRequest {
    pub fn all() -> Self {
        Self {
            target: IngestTarget::All,
            model: None,
        }
    }

    pub fn paths(paths: Vec<PathBuf>) -> Self {
        Self {
            target: IngestTarget::Paths(paths),
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

pub struct RunCoordinator {
    lock: Arc<dyn LockBackend>,
    lock_key: i64,
    pipeline: Arc<Pipeline>,
    uploads: UploadsConfig,
}

impl RunCoordinator {
    pub fn new(
        lock: Arc<dyn LockBackend>,
        lock_key: i64,
        pipeline: Arc<Pipeline>,
        uploads: UploadsConfig,
    ) -> Self {
        Self {
            lock,
            lock_key,
            pipeline,
            uploads,
        }
    }

    pub async fn run_guarded(&self, request: &RunRequest) -> RunStatus {
        let held = match self.lock.try_acquire(self.lock_key).await {
            Ok(Some(held)) => held,
            Ok(None) => {
                info!(key = self.lock_key, "ingest already running elsewhere");
                return RunStatus::locked();
            }
            Err(e) => {
                error!(key = self.lock_key, error = %e, "could not acquire ingest lock");
                return RunStatus::Error {
                    error: e.to_string(),
                };
            }
        };
        info!(key = self.lock_key, "ingest lock acquired");

        let outcome = AssertUnwindSafe(self.run_locked(request))
            .catch_unwind()
            .await;

        match held.release().await {
            Ok(true) => info!(key = self.lock_key, "ingest lock released"),
            Ok(false) => warn!(key = self.lock_key, "ingest lock was no longer held at release"),
            Err(e) => error!(key = self.lock_key, error = %e, "failed to release ingest lock"),
        }

        match outcome {
            Ok(Ok(results)) => RunStatus::Finished { results },
            Ok(Err(e)) => {
                error!(error = %e, "ingest run failed");
                RunStatus::Error {
                    error: e.to_string(),
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(error = %message, "ingest run panicked");
                RunStatus::Error { error: message }
            }
        }
    }

    async fn run_locked(&self, request: &RunRequest) -> IngestResult<BatchResult> {
        let files = match &request.target {
            IngestTarget::All => list_files(&self.uploads)?,
            IngestTarget::Paths(paths) => resolve_paths(&self.uploads.root, paths),
        };
        let model = self.pipeline.model(request.model.as_deref());
        info!(files = files.len(), model, "starting ingest run");
        self.pipeline.process_batch(&files, model).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic during ingest run".to_string()
    }
}
