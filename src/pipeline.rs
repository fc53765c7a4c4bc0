//! Per-document ingestion pipeline.
//!
//! [`Pipeline::process_one`] drives a single document through, in order:
//!
//! 1. fingerprint the raw bytes
//! 2. skip if the fingerprint is already recorded (no backend is touched)
//! 3. extract text; blank text is recorded with zero points
//! 4. chunk
//! 5. embed every chunk and build its point
//! 6. upsert points in `batch_size` batches
//! 7. record the fingerprint with the point count
//!
//! The bookkeeping row is written only after every batch is durable, so a
//! document that fails midway is redone from scratch on the next run.
//!
//! [`Pipeline::process_batch`] collects per-document failures and keeps
//! going. The one exception is [`IngestError::Unrecorded`]: points reached
//! the index but the row did not, and the batch stops there.

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{IngestError, IngestResult};
use crate::extract::TextExtractor;
use crate::fingerprint::fingerprint;
use crate::index::VectorIndex;
use crate::models::{
    BatchResult, Chunk, Document, FailedFile, Outcome, Point, PointPayload, ProcessedFile,
    SkippedFile,
};
use crate::store::ProcessedStore;

/// Tunables for one pipeline, taken from config.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub collection: String,
    pub max_chars: usize,
    pub overlap: usize,
    pub batch_size: usize,
    pub concurrency: usize,
    pub default_model: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.index.collection.clone(),
            max_chars: config.chunking.max_chars,
            overlap: config.chunking.overlap,
            batch_size: config.index.batch_size,
            concurrency: config.embedding.concurrency,
            default_model: config.embedding.model.clone(),
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn ProcessedStore>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ProcessedStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            extractor,
            embedder,
            index,
            settings,
        }
    }

    /// `override_model` if given, otherwise the configured model.
    pub fn model<'a>(&'a self, override_model: Option<&'a str>) -> &'a str {
        override_model.unwrap_or(&self.settings.default_model)
    }

    pub async fn process_one(&self, doc: &Document, model: &str) -> Outcome {
        match self.try_process(doc, model).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed(e),
        }
    }

    pub async fn process_path(&self, path: &Path, model: &str) -> Outcome {
        match Document::read(path).await {
            Ok(doc) => self.process_one(&doc, model).await,
            Err(e) => Outcome::Failed(e),
        }
    }

    /// Run every path through the pipeline, in order.
    ///
    /// Returns `Err` only for an invariant violation; every other failure
    /// lands in `BatchResult::errors`.
    pub async fn process_batch(&self, paths: &[PathBuf], model: &str) -> IngestResult<BatchResult> {
        let mut result = BatchResult::default();

        for path in paths {
            let path_str = path.display().to_string();
            match self.process_path(path, model).await {
                Outcome::Skipped => result.skipped.push(SkippedFile { path: path_str }),
                Outcome::Completed(points) => result.processed.push(ProcessedFile {
                    path: path_str,
                    points,
                }),
                Outcome::Failed(e) if e.is_invariant_violation() => {
                    error!(path = %path_str, error = %e, "aborting batch");
                    return Err(e);
                }
                Outcome::Failed(e) => {
                    warn!(path = %path_str, error = %e, "document failed");
                    result.errors.push(FailedFile {
                        path: path_str,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            processed = result.processed.len(),
            skipped = result.skipped.len(),
            errors = result.errors.len(),
            points = result.points(),
            "batch finished"
        );
        Ok(result)
    }

    async fn try_process(&self, doc: &Document, model: &str) -> IngestResult<Outcome> {
        let path = doc.path_str();
        let fingerprint = fingerprint(&doc.bytes);
        let collection = self.settings.collection.as_str();

        if self.store.has_been_processed(&fingerprint).await? {
            info!(path = %path, fingerprint = %fingerprint, "already ingested, skipping");
            return Ok(Outcome::Skipped);
        }

        let text = self.extractor.extract(&doc.bytes).await?;
        let chunks = if text.trim().is_empty() {
            Vec::new()
        } else {
            chunk_text(&text, self.settings.max_chars, self.settings.overlap)
        };

        if chunks.is_empty() {
            warn!(path = %path, fingerprint = %fingerprint, "no text extracted, recording 0 points");
            self.store
                .record_processed(&path, &fingerprint, collection, 0)
                .await?;
            return Ok(Outcome::Completed(0));
        }
        debug!(path = %path, chunks = chunks.len(), "chunked");

        let points = self.embed_chunks(&path, &fingerprint, model, chunks).await?;

        for batch in points.chunks(self.settings.batch_size.max(1)) {
            self.index.upsert_points(collection, batch).await?;
        }

        let count = points.len();
        self.store
            .record_processed(&path, &fingerprint, collection, count)
            .await
            .map_err(|e| IngestError::Unrecorded {
                path: path.clone(),
                fingerprint: fingerprint.clone(),
                points: count,
                reason: e.to_string(),
            })?;

        info!(path = %path, fingerprint = %fingerprint, points = count, "ingested");
        Ok(Outcome::Completed(count))
    }

    /// Embed chunks with up to `concurrency` requests in flight. Output keeps
    /// chunk order.
    async fn embed_chunks(
        &self,
        path: &str,
        fingerprint: &str,
        model: &str,
        chunks: Vec<Chunk>,
    ) -> IngestResult<Vec<Point>> {
        let ingested_at = Utc::now().to_rfc3339();
        let ingested_at = ingested_at.as_str();
        let embedder = self.embedder.as_ref();

        stream::iter(chunks)
            .map(|chunk| async move {
                let vector = embedder.embed(model, &chunk.text).await?;
                Ok::<_, IngestError>(Point {
                    id: Uuid::new_v4(),
                    vector,
                    payload: PointPayload {
                        source_file: path.to_string(),
                        source_hash: fingerprint.to_string(),
                        chunk_index: chunk.index,
                        text: chunk.text,
                        ingested_at: ingested_at.to_string(),
                    },
                })
            })
            .buffered(self.settings.concurrency.max(1))
            .try_collect()
            .await
    }
}
