//! # Ingest Guard
//!
//! Idempotent, content-addressed document ingestion into a vector index,
//! with at most one run active across every instance of the service.
//!
//! ## Architecture
//!
//! ```text
//!  HTTP / scheduler / CLI
//!            │
//!            ▼
//!   ┌─────────────────┐  try_acquire   ┌──────────────────┐
//!   │ RunCoordinator  │───────────────▶│ Postgres advisory │
//!   └────────┬────────┘◀── release ───│ lock              │
//!            │                         └──────────────────┘
//!            ▼
//!   ┌─────────────────┐   ┌───────┐   ┌────────┐   ┌────────┐
//!   │    Pipeline     │──▶│ Tika  │──▶│ Ollama │──▶│ Qdrant │
//!   └────────┬────────┘   └───────┘   └────────┘   └────────┘
//!            ▼
//!   processed_files (fingerprint → path, collection, points)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Library error type |
//! | [`logging`] | Tracing subscriber setup |
//! | [`models`] | Core data types |
//! | [`chunk`] | Text normalization and chunking |
//! | [`fingerprint`] | Content fingerprints |
//! | [`db`] | Postgres connection |
//! | [`migrate`] | Bookkeeping schema |
//! | [`store`] | Processed-file bookkeeping |
//! | [`lock`] | Cluster-wide run lock |
//! | [`http`] | Retrying HTTP client shared by the backends |
//! | [`extract`] | Text extraction backends |
//! | [`embedding`] | Embedding backend |
//! | [`index`] | Vector index backend |
//! | [`scan`] | Upload directory enumeration |
//! | [`pipeline`] | Per-document ingestion |
//! | [`coordinator`] | Guarded runs |
//! | [`scheduler`] | Periodic runs |
//! | [`health`] | Dependency reachability |
//! | [`server`] | HTTP trigger surface |
//! | [`stats`] | Bookkeeping overview |

pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod health;
pub mod http;
pub mod index;
pub mod lock;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod scan;
pub mod scheduler;
pub mod server;
pub mod stats;
pub mod store;
