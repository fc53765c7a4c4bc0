//! Vector index backend (Qdrant REST API).

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::info;

use crate::error::{IngestError, IngestResult};
use crate::http::RetryingClient;
use crate::models::Point;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection unless it already exists.
    async fn ensure_collection(
        &self,
        collection: &str,
        vector_size: usize,
        distance: &str,
    ) -> IngestResult<()>;

    /// Write points. Returns once the backend has persisted them.
    async fn upsert_points(&self, collection: &str, points: &[Point]) -> IngestResult<()>;
}

pub struct QdrantIndex {
    http: RetryingClient,
    base_url: String,
}

impl QdrantIndex {
    pub fn new(http: RetryingClient, url: &str) -> Self {
        Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/collections/{}", self.base_url, collection)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(
        &self,
        collection: &str,
        vector_size: usize,
        distance: &str,
    ) -> IngestResult<()> {
        let url = self.collection_url(collection);

        let existing = self.http.send_raw("qdrant", |c| c.get(&url)).await?;
        match existing.status() {
            s if s.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            status => {
                let body = existing.text().await.unwrap_or_default();
                return Err(IngestError::Status {
                    backend: "qdrant",
                    status: status.as_u16(),
                    body,
                });
            }
        }

        let body = serde_json::json!({
            "vectors": { "size": vector_size, "distance": distance }
        });
        let created = self
            .http
            .send_raw("qdrant", |c| c.put(&url).json(&body))
            .await?;
        match created.status() {
            s if s.is_success() => {
                info!(collection, vector_size, distance, "created vector collection");
                Ok(())
            }
            // Another instance created it between our check and create.
            StatusCode::CONFLICT => Ok(()),
            status => {
                let body = created.text().await.unwrap_or_default();
                Err(IngestError::Status {
                    backend: "qdrant",
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn upsert_points(&self, collection: &str, points: &[Point]) -> IngestResult<()> {
        let url = format!("{}/points?wait=true", self.collection_url(collection));
        let body = serde_json::json!({ "points": points });
        self.http
            .send("qdrant", |c| c.put(&url).json(&body))
            .await?;
        Ok(())
    }
}
