//! Embedding backend.
//!
//! [`EmbeddingProvider`] is the pipeline's view of an embedding service:
//! one text in, one vector out, for a model chosen per call. The production
//! implementation talks to Ollama (`POST /api/embed`).
//!
//! # Response shapes
//!
//! Ollama versions and proxies in front of it disagree on the response
//! body. The parser classifies it into exactly one of:
//!
//! | Shape | Example |
//! |-------|---------|
//! | single vector | `[0.1, 0.2]` or `{"embedding": [0.1, 0.2]}` |
//! | nested single vector | `{"embeddings": [[0.1, 0.2]]}` |
//! | multi result | `[{"embeddings": [[0.1, 0.2]]}, ...]` (first result wins) |
//!
//! Anything else, including empty vectors, is
//! [`IngestError::MalformedResponse`].

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::error::{IngestError, IngestResult};
use crate::http::RetryingClient;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text with the given model.
    async fn embed(&self, model: &str, text: &str) -> IngestResult<Vec<f32>>;

    /// Make sure `model` is available, pulling it when it is not.
    async fn ensure_model(&self, model: &str) -> IngestResult<()>;
}

// ============ Response parsing ============

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VectorField {
    Nested(Vec<Vec<f32>>),
    Flat(Vec<f32>),
}

#[derive(Debug, Deserialize)]
struct EmbedResult {
    #[serde(alias = "embedding")]
    embeddings: VectorField,
}

/// The three accepted response bodies.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Bare(Vec<f32>),
    Single(EmbedResult),
    Multi(Vec<EmbedResult>),
}

/// Which shape a response was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmbedShape {
    SingleVector,
    NestedSingleVector,
    MultiResult,
}

impl EmbedResponse {
    fn parse(body: &[u8]) -> IngestResult<Self> {
        serde_json::from_slice(body).map_err(|e| {
            let preview: String = String::from_utf8_lossy(body).chars().take(200).collect();
            IngestError::MalformedResponse(format!("{} (body: {})", e, preview))
        })
    }

    fn shape(&self) -> EmbedShape {
        match self {
            EmbedResponse::Bare(_) => EmbedShape::SingleVector,
            EmbedResponse::Single(EmbedResult {
                embeddings: VectorField::Flat(_),
            }) => EmbedShape::SingleVector,
            EmbedResponse::Single(EmbedResult {
                embeddings: VectorField::Nested(_),
            }) => EmbedShape::NestedSingleVector,
            EmbedResponse::Multi(_) => EmbedShape::MultiResult,
        }
    }

    fn into_vector(self) -> IngestResult<Vec<f32>> {
        let vector = match self {
            EmbedResponse::Bare(v) => v,
            EmbedResponse::Single(result) => result.embeddings.into_first()?,
            EmbedResponse::Multi(results) => results
                .into_iter()
                .next()
                .ok_or_else(|| IngestError::MalformedResponse("empty result list".to_string()))?
                .embeddings
                .into_first()?,
        };
        if vector.is_empty() {
            return Err(IngestError::MalformedResponse(
                "embedding vector is empty".to_string(),
            ));
        }
        Ok(vector)
    }
}

impl VectorField {
    fn into_first(self) -> IngestResult<Vec<f32>> {
        match self {
            VectorField::Flat(v) => Ok(v),
            VectorField::Nested(vs) => vs
                .into_iter()
                .next()
                .ok_or_else(|| IngestError::MalformedResponse("empty embeddings list".to_string())),
        }
    }
}

// ============ Ollama ============

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    #[serde(default)]
    name: String,
}

/// Ollama embedding client.
pub struct OllamaEmbedder {
    http: RetryingClient,
    base_url: String,
    pull_timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(http: RetryingClient, config: &EmbeddingConfig) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            pull_timeout: Duration::from_secs(config.pull_timeout_secs),
        }
    }

    async fn list_models(&self) -> IngestResult<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.http.send("ollama", |c| c.get(&url)).await?;
        let tags: TagsResponse = response.json().await.map_err(|e| IngestError::Backend {
            backend: "ollama",
            message: format!("invalid /api/tags response: {}", e),
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// `nomic-embed-text` matches `nomic-embed-text:latest`.
pub fn model_is_listed(available: &[String], model: &str) -> bool {
    available
        .iter()
        .any(|name| name == model || name.starts_with(model))
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, model: &str, text: &str) -> IngestResult<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = serde_json::json!({ "model": model, "input": text });

        let response = self
            .http
            .send("ollama", |c| c.post(&url).json(&body))
            .await?;
        let bytes = response.bytes().await.map_err(|e| IngestError::Backend {
            backend: "ollama",
            message: format!("failed to read response body: {}", e),
        })?;

        let parsed = EmbedResponse::parse(&bytes)?;
        debug!(model, shape = ?parsed.shape(), "embedding response");
        parsed.into_vector()
    }

    async fn ensure_model(&self, model: &str) -> IngestResult<()> {
        match self.list_models().await {
            Ok(available) if model_is_listed(&available, model) => {
                info!(model, "embedding model already available");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => warn!(model, error = %e, "could not list Ollama models"),
        }

        info!(model, "pulling embedding model, this may take several minutes");
        let url = format!("{}/api/pull", self.base_url);
        let body = serde_json::json!({ "model": model, "stream": false });
        self.http
            .send("ollama", |c| c.post(&url).json(&body).timeout(self.pull_timeout))
            .await?;
        info!(model, "embedding model pulled");
        Ok(())
    }
}
