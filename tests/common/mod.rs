#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Semaphore;

use ingest_guard::config::UploadsConfig;
use ingest_guard::coordinator::RunCoordinator;
use ingest_guard::embedding::EmbeddingProvider;
use ingest_guard::error::{IngestError, IngestResult};
use ingest_guard::extract::PlainTextExtractor;
use ingest_guard::index::VectorIndex;
use ingest_guard::lock::MemoryLock;
use ingest_guard::models::{BookkeepingSummary, Point, ProcessedFileRecord};
use ingest_guard::pipeline::{Pipeline, PipelineSettings};
use ingest_guard::store::{MemoryProcessedStore, ProcessedStore};

pub const LOCK_KEY: i64 = 987_654_321;

/// Embeds text as `[len, 1.0]`. Fails on text containing `POISON`, panics on
/// text containing `PANIC`, and waits on `gate` when one is set.
#[derive(Default)]
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
    pub models: Mutex<Vec<String>>,
    pub gate: Option<Arc<Semaphore>>,
}

impl FakeEmbedder {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, model: &str, text: &str) -> IngestResult<Vec<f32>> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.models.lock().unwrap().push(model.to_string());
        if text.contains("PANIC") {
            panic!("embedder exploded");
        }
        if text.contains("POISON") {
            return Err(IngestError::Status {
                backend: "ollama",
                status: 500,
                body: "model crashed".to_string(),
            });
        }
        Ok(vec![text.len() as f32, 1.0])
    }

    async fn ensure_model(&self, _model: &str) -> IngestResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeIndex {
    pub points: Mutex<Vec<Point>>,
    pub batches: AtomicUsize,
}

impl FakeIndex {
    pub fn point_count(&self) -> usize {
        self.points.lock().unwrap().len()
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn ensure_collection(&self, _: &str, _: usize, _: &str) -> IngestResult<()> {
        Ok(())
    }

    async fn upsert_points(&self, _collection: &str, points: &[Point]) -> IngestResult<()> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.points.lock().unwrap().extend_from_slice(points);
        Ok(())
    }
}

/// Bookkeeping that accepts zero-point records but fails every other write.
#[derive(Default)]
pub struct BrokenWriteStore {
    pub inner: MemoryProcessedStore,
}

#[async_trait]
impl ProcessedStore for BrokenWriteStore {
    async fn has_been_processed(&self, fingerprint: &str) -> IngestResult<bool> {
        self.inner.has_been_processed(fingerprint).await
    }

    async fn record_processed(
        &self,
        path: &str,
        fingerprint: &str,
        collection: &str,
        point_count: usize,
    ) -> IngestResult<()> {
        if point_count > 0 {
            return Err(IngestError::Bookkeeping("connection reset".to_string()));
        }
        self.inner
            .record_processed(path, fingerprint, collection, point_count)
            .await
    }

    async fn fetch(&self, fingerprint: &str) -> IngestResult<Option<ProcessedFileRecord>> {
        self.inner.fetch(fingerprint).await
    }

    async fn summary(&self) -> IngestResult<BookkeepingSummary> {
        self.inner.summary().await
    }

    async fn ping(&self) -> IngestResult<()> {
        Ok(())
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        collection: "test_docs".to_string(),
        max_chars: 200,
        overlap: 20,
        batch_size: 2,
        concurrency: 2,
        default_model: "nomic-embed-text".to_string(),
    }
}

/// A coordinator wired to in-process backends, plus handles to inspect them.
pub struct Harness {
    pub uploads: TempDir,
    pub lock: MemoryLock,
    pub store: Arc<dyn ProcessedStore>,
    pub embedder: Arc<FakeEmbedder>,
    pub index: Arc<FakeIndex>,
    pub coordinator: Arc<RunCoordinator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Arc::new(MemoryProcessedStore::new()), FakeEmbedder::default())
    }

    pub fn with(store: Arc<dyn ProcessedStore>, embedder: FakeEmbedder) -> Self {
        let uploads = TempDir::new().unwrap();
        let lock = MemoryLock::new();
        let embedder = Arc::new(embedder);
        let index = Arc::new(FakeIndex::default());

        let pipeline = Pipeline::new(
            store.clone(),
            Arc::new(PlainTextExtractor),
            embedder.clone(),
            index.clone(),
            settings(),
        );
        let coordinator = Arc::new(RunCoordinator::new(
            Arc::new(lock.clone()),
            LOCK_KEY,
            Arc::new(pipeline),
            UploadsConfig {
                root: uploads.path().to_path_buf(),
                exclude_globs: Vec::new(),
            },
        ));

        Self {
            uploads,
            lock,
            store,
            embedder,
            index,
            coordinator,
        }
    }

    pub fn root(&self) -> &Path {
        self.uploads.path()
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}
