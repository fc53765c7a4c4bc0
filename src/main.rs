//! # Ingest daemon CLI (`ingestd`)
//!
//! ## Usage
//!
//! ```bash
//! ingestd --config ./config/ingest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ingestd init` | Create the bookkeeping table |
//! | `ingestd ingest` | Run one guarded ingest over the uploads root |
//! | `ingestd ingest --path a.pdf --path b.txt` | Run one guarded ingest over specific files |
//! | `ingestd serve` | Start the HTTP trigger surface and the scheduler |
//! | `ingestd health` | Check bookkeeping and extraction reachability |
//! | `ingestd stats` | Summarize the bookkeeping table |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use ingest_guard::config::{self, Config};
use ingest_guard::coordinator::{RunCoordinator, RunRequest};
use ingest_guard::db;
use ingest_guard::embedding::{EmbeddingProvider, OllamaEmbedder};
use ingest_guard::extract::{create_extractor, TextExtractor};
use ingest_guard::health::{check_health, print_health};
use ingest_guard::http::RetryingClient;
use ingest_guard::index::{QdrantIndex, VectorIndex};
use ingest_guard::lock::PgAdvisoryLock;
use ingest_guard::logging::init_logging;
use ingest_guard::migrate;
use ingest_guard::models::RunStatus;
use ingest_guard::pipeline::{Pipeline, PipelineSettings};
use ingest_guard::scheduler::spawn_scheduler;
use ingest_guard::server::{run_server, AppState};
use ingest_guard::stats;
use ingest_guard::store::{PgProcessedStore, ProcessedStore};

/// Idempotent document ingestion into a vector index, serialized across
/// every instance sharing the same Postgres.
#[derive(Parser)]
#[command(name = "ingestd", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ingest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the bookkeeping table. Idempotent.
    Init,

    /// Run one guarded ingest and print its status as JSON.
    ///
    /// Exits non-zero only when the run itself errored; a run blocked by
    /// another instance prints `locked` and exits 0.
    Ingest {
        /// Ingest only these files (relative paths resolve against the uploads root).
        #[arg(long = "path")]
        paths: Vec<PathBuf>,

        /// Embedding model for this run, instead of `[embedding].model`.
        #[arg(long)]
        model: Option<String>,
    },

    /// Start the HTTP server (and the scheduler when `[schedule].interval_minutes` > 0).
    Serve,

    /// Check reachability of the bookkeeping store and the extraction backend.
    Health,

    /// Print a summary of what has been ingested.
    Stats,
}

/// Everything a run needs, wired from config.
struct Services {
    pool: sqlx::PgPool,
    store: Arc<dyn ProcessedStore>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    coordinator: Arc<RunCoordinator>,
}

impl Services {
    async fn connect(cfg: &Config) -> Result<Self> {
        let pool = db::connect(cfg).await?;
        let http = RetryingClient::new(&cfg.http)?;

        let store: Arc<dyn ProcessedStore> = Arc::new(PgProcessedStore::new(pool.clone()));
        let extractor: Arc<dyn TextExtractor> =
            Arc::from(create_extractor(&cfg.extraction, http.clone())?);
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(OllamaEmbedder::new(http.clone(), &cfg.embedding));
        let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(http, &cfg.index.url));

        let pipeline = Pipeline::new(
            store.clone(),
            extractor.clone(),
            embedder.clone(),
            index.clone(),
            PipelineSettings::from_config(cfg),
        );
        let lock = PgAdvisoryLock::new(
            db::connect_options(cfg)?,
            cfg.db.acquire_timeout(),
        );
        let coordinator = Arc::new(RunCoordinator::new(
            Arc::new(lock),
            cfg.db.lock_key,
            Arc::new(pipeline),
            cfg.uploads.clone(),
        ));

        Ok(Self {
            pool,
            store,
            extractor,
            embedder,
            index,
            coordinator,
        })
    }

    /// Migrations, embedding model, vector collection.
    async fn prepare(&self, cfg: &Config) -> Result<()> {
        migrate::run_migrations(&self.pool).await?;
        self.embedder
            .ensure_model(&cfg.embedding.model)
            .await
            .context("embedding model is not available")?;
        self.index
            .ensure_collection(
                &cfg.index.collection,
                cfg.index.vector_size,
                &cfg.index.distance,
            )
            .await
            .context("failed to ensure vector collection")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.logging.level)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Bookkeeping table initialized.");
        }
        Commands::Ingest { paths, model } => {
            let services = Services::connect(&cfg).await?;
            services.prepare(&cfg).await?;

            let request = if paths.is_empty() {
                RunRequest::all()
            } else {
                RunRequest::paths(paths)
            }
            .with_model(model);
            let status = services.coordinator.run_guarded(&request).await;
            println!("{}", serde_json::to_string_pretty(&status)?);

            services.pool.close().await;
            if matches!(status, RunStatus::Error { .. }) {
                std::process::exit(1);
            }
        }
        Commands::Serve => {
            let services = Services::connect(&cfg).await?;
            services.prepare(&cfg).await?;

            let _scheduler =
                spawn_scheduler(services.coordinator.clone(), cfg.schedule.interval_minutes);
            let state = AppState {
                coordinator: services.coordinator.clone(),
                store: services.store.clone(),
                extractor: services.extractor.clone(),
            };
            info!(uploads = %cfg.uploads.root.display(), "serving");
            run_server(&cfg.server.bind, state).await?;
        }
        Commands::Health => {
            let pool = db::connect_lazy(&cfg)?;
            let store = PgProcessedStore::new(pool.clone());
            let extractor = create_extractor(&cfg.extraction, RetryingClient::new(&cfg.http)?)?;
            let report = check_health(&store, extractor.as_ref()).await;
            print_health(&report, extractor.name());
            pool.close().await;
            if !report.is_ok() {
                std::process::exit(1);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
