//! Core data types that flow through the ingestion pipeline.
//!
//! A [`Document`] is read from disk once per run, split into [`Chunk`]s,
//! turned into [`Point`]s for the vector index, and finally acknowledged by a
//! [`ProcessedFileRecord`] in the bookkeeping table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::IngestResult;

/// Raw bytes read from a path. Identity is the fingerprint, not the path.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    pub async fn read(path: &Path) -> IngestResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(path, bytes))
    }

    pub fn path_str(&self) -> String {
        self.path.display().to_string()
    }
}

/// A bounded, overlapping segment of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Metadata stored next to every vector.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PointPayload {
    pub source_file: String,
    pub source_hash: String,
    #[serde(rename = "chunkIndex")]
    pub chunk_index: usize,
    pub text: String,
    pub ingested_at: String,
}

/// One vector-index record: a chunk's embedding plus its payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A row of the `processed_files` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFileRecord {
    pub file_path: String,
    pub source_hash: String,
    pub collection: String,
    pub points_count: i64,
    pub processed_at: DateTime<Utc>,
}

/// Aggregate view of the bookkeeping table, used by `ingestd stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BookkeepingSummary {
    pub files: i64,
    pub points: i64,
    pub empty_files: i64,
    pub last_processed_at: Option<DateTime<Utc>>,
}

/// Terminal state of a single document.
#[derive(Debug)]
pub enum Outcome {
    /// Identical content was ingested before; no backend was touched.
    Skipped,
    /// Points written and recorded. Zero when extraction found no text.
    Completed(usize),
    Failed(crate::error::IngestError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProcessedFile {
    pub path: String,
    pub points: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedFile {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

/// Per-document outcomes of one batch, split by kind.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BatchResult {
    pub processed: Vec<ProcessedFile>,
    pub skipped: Vec<SkippedFile>,
    pub errors: Vec<FailedFile>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.errors.len()
    }

    pub fn points(&self) -> usize {
        self.processed.iter().map(|p| p.points).sum()
    }
}

/// Result of a guarded run, serialized as `{"status": ..., ...}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    /// Another run holds the ingestion lock. Not an error.
    Locked { message: String },
    Finished { results: BatchResult },
    Error { error: String },
}

impl RunStatus {
    pub fn locked() -> Self {
        RunStatus::Locked {
            message: "Another ingest is currently running".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_wire_names() {
        let point = Point {
            id: Uuid::nil(),
            vector: vec![0.5, 0.25],
            payload: PointPayload {
                source_file: "/data/uploads/a.txt".to_string(),
                source_hash: "abc".to_string(),
                chunk_index: 2,
                text: "hello".to_string(),
                ingested_at: "2026-01-01T00:00:00+00:00".to_string(),
            },
        };
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["payload"]["chunkIndex"], 2);
        assert_eq!(json["payload"]["source_hash"], "abc");
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn run_status_is_tagged() {
        let json = serde_json::to_value(RunStatus::locked()).unwrap();
        assert_eq!(json["status"], "locked");

        let json = serde_json::to_value(RunStatus::Finished {
            results: BatchResult::default(),
        })
        .unwrap();
        assert_eq!(json["status"], "finished");
        assert!(json["results"]["processed"].as_array().unwrap().is_empty());
    }

    #[test]
    fn batch_totals() {
        let result = BatchResult {
            processed: vec![
                ProcessedFile {
                    path: "a".to_string(),
                    points: 3,
                },
                ProcessedFile {
                    path: "b".to_string(),
                    points: 0,
                },
            ],
            skipped: vec![SkippedFile {
                path: "c".to_string(),
            }],
            errors: vec![],
        };
        assert_eq!(result.total(), 3);
        assert_eq!(result.points(), 3);
    }
}
