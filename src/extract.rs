//! Text extraction backends.
//!
//! Extraction turns raw document bytes into plain, NFC-normalized UTF-8
//! text. Quality of the extraction is the backend's business; the pipeline
//! only distinguishes "some text", "no text" and "error".

use std::borrow::Cow;

use async_trait::async_trait;
use chardetng::EncodingDetector;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::config::ExtractionConfig;
use crate::error::{IngestError, IngestResult};
use crate::http::RetryingClient;

#[async_trait]
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, bytes: &[u8]) -> IngestResult<String>;

    /// Reachability probe for health checks.
    async fn ping(&self) -> IngestResult<()>;
}

/// Decode bytes of unknown encoding, then NFC.
///
/// Valid UTF-8 is taken as is. Anything else is decoded with the encoding
/// `chardetng` finds most likely; bytes that encoding cannot map become
/// U+FFFD.
pub fn decode_text(bytes: &[u8]) -> String {
    let decoded = match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            let encoding = detector.guess(None, false);
            debug!(encoding = encoding.name(), "not UTF-8, decoding with detected charset");
            encoding.decode(bytes).0
        }
    };
    normalize_text(&decoded)
}

/// Strip a leading BOM and compose to NFC.
fn normalize_text(text: &str) -> String {
    text.trim_start_matches('\u{feff}').nfc().collect()
}

/// Whether the response names its charset in `Content-Type`.
fn declares_charset(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(';')
                .skip(1)
                .any(|param| param.trim().to_ascii_lowercase().starts_with("charset="))
        })
        .unwrap_or(false)
}

// ============ Apache Tika ============

/// Sends bytes to a Tika server (`PUT /tika`, `Accept: text/plain`).
pub struct TikaExtractor {
    http: RetryingClient,
    url: String,
}

impl TikaExtractor {
    pub fn new(http: RetryingClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TextExtractor for TikaExtractor {
    fn name(&self) -> &str {
        "tika"
    }

    async fn extract(&self, bytes: &[u8]) -> IngestResult<String> {
        let response = self
            .http
            .send("tika", |c| {
                c.put(&self.url)
                    .header(ACCEPT, "text/plain")
                    .body(bytes.to_vec())
            })
            .await?;

        let read_failed = |e: reqwest::Error| IngestError::Backend {
            backend: "tika",
            message: format!("failed to read response body: {}", e),
        };

        if declares_charset(response.headers()) {
            let text = response.text().await.map_err(read_failed)?;
            return Ok(normalize_text(&text));
        }
        let body = response.bytes().await.map_err(read_failed)?;
        Ok(decode_text(&body))
    }

    async fn ping(&self) -> IngestResult<()> {
        self.http.send("tika", |c| c.get(&self.url)).await?;
        Ok(())
    }
}

// ============ Local plain text ============

/// Treats the document bytes themselves as the text.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "plain"
    }

    async fn extract(&self, bytes: &[u8]) -> IngestResult<String> {
        Ok(decode_text(bytes))
    }

    async fn ping(&self) -> IngestResult<()> {
        Ok(())
    }
}

/// Build the extractor selected by `[extraction].provider`.
pub fn create_extractor(
    config: &ExtractionConfig,
    http: RetryingClient,
) -> IngestResult<Box<dyn TextExtractor>> {
    match config.provider.as_str() {
        "tika" => Ok(Box::new(TikaExtractor::new(http, config.url.clone()))),
        "plain" => Ok(Box::new(PlainTextExtractor)),
        other => Err(IngestError::Config(format!(
            "Unknown extraction provider: {}",
            other
        ))),
    }
}
