//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::clients::{EmbeddingClient, ReasoningClient};
use crate::core::cli::{self, Cli};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownCoordinator;
use crate::data::blobs::{self, BlobStorage};
use crate::data::postgres::PostgresService;
use crate::data::queue::{self, JobQueue};
use crate::stages::{
    PipelineStage, StageServices, chunker::ChunkStage, crawl::CrawlStage, embed::EmbedStage,
    evaluate::EvaluateStage, extract::ExtractStage, reaper, resolve::ResolveStage, runtime,
};

pub struct CoreApp {
    pub shutdown: ShutdownCoordinator,
    pub config: AppConfig,
    pub services: Arc<StageServices>,
    stages: Vec<String>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing.
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Pipeline starting");

        let cli_config = cli::parse();
        let app = Self::init(&cli_config).await?;
        app.start().await
    }

    async fn init(cli: &Cli) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let db = Arc::new(
            PostgresService::init(
                &config.postgres,
                config.pipeline.retry_attempts,
                config.pipeline.retry_backoff_ms,
            )
            .await
            .context("Failed to initialize PostgreSQL")?,
        );

        let queue: Arc<dyn JobQueue> = queue::connect(config.redis_url.as_deref())
            .await
            .context("Failed to initialize job queue")?;
        tracing::debug!(backend = queue.backend_name(), "Job queue initialized");

        let blob_store: Arc<dyn BlobStorage> = blobs::connect(&config.blobs)
            .await
            .context("Failed to initialize blob storage")?;
        tracing::debug!(backend = blob_store.backend_name(), "Blob storage initialized");

        let embedding = EmbeddingClient::new(&config.embedding, config.pipeline.embedding_timeout_s)
            .context("Failed to initialize embedding client")?;
        let reasoning = ReasoningClient::new(&config.reasoning, config.pipeline.reasoning_timeout_s)
            .context("Failed to initialize reasoning client")?;

        let services = Arc::new(StageServices {
            db,
            queue,
            blobs: blob_store,
            embedding,
            reasoning,
            config: config.pipeline.clone(),
        });

        let stages = cli.stages.clone().unwrap_or_else(|| {
            ["crawl", "chunk", "embed", "evaluate", "extract", "resolve"]
                .into_iter()
                .map(String::from)
                .collect()
        });

        Ok(Self {
            shutdown: ShutdownCoordinator::new(),
            config,
            services,
            stages,
        })
    }

    async fn start(self) -> Result<()> {
        self.shutdown.listen_for_signals();

        for stage_name in &self.stages {
            let (stage, workers): (Arc<dyn PipelineStage>, usize) = match stage_name.as_str() {
                "crawl" => (
                    Arc::new(
                        CrawlStage::new(self.config.pipeline.http_timeout_s)
                            .map_err(|e| anyhow::anyhow!(e.0))?,
                    ),
                    self.config.workers.crawl,
                ),
                "chunk" => (Arc::new(ChunkStage), self.config.workers.chunk),
                "embed" => (Arc::new(EmbedStage), self.config.workers.embed),
                "evaluate" => (Arc::new(EvaluateStage), self.config.workers.evaluate),
                "extract" => (Arc::new(ExtractStage), self.config.workers.extract),
                "resolve" => (Arc::new(ResolveStage), self.config.workers.resolve),
                other => {
                    anyhow::bail!(
                        "Unknown stage: {} (expected crawl, chunk, embed, evaluate, extract, resolve)",
                        other
                    );
                }
            };

            tracing::info!(stage = %stage_name, workers, "Starting stage workers");
            let handles = runtime::spawn_workers(
                stage,
                self.services.clone(),
                workers,
                self.shutdown.subscribe(),
            );
            for (index, handle) in handles.into_iter().enumerate() {
                self.shutdown
                    .register(format!("{}/{}", stage_name, index), handle)
                    .await;
            }
        }

        self.shutdown
            .register(
                "reaper",
                reaper::spawn_reaper(
                    self.services.clone(),
                    self.config.reaper.clone(),
                    self.shutdown.subscribe(),
                ),
            )
            .await;

        tracing::info!(
            stages = %self.stages.join(","),
            queue = self.services.queue.backend_name(),
            blobs = self.services.blobs.backend_name(),
            "Pipeline running"
        );

        // Block until a signal flips the stop flag, then drain. The pool
        // closes only after the drain so in-flight stage transitions and
        // log writes still commit.
        self.shutdown.wait_for_stop().await;
        self.shutdown.drain().await;
        self.services.db.close().await;

        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}
