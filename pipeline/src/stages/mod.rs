//! Pipeline stages
//!
//! Six ordered stages connected by named queues:
//!
//! ```text
//! crawl-req-id →[Crawl]→ doc-id →[Chunk]→ doc-id →[Embed]→ doc-id
//!              →[Evaluate]→ doc-id →[Extract]→ doc-id →[Resolve]→ ∅
//! ```
//!
//! Each stage is a pool of workers sharing one [`StageServices`]. The
//! worker loop, stage advancement, and failure accounting live in
//! [`runtime`]; each stage module implements only its transformation.

pub mod chunker;
pub mod crawl;
pub mod embed;
pub mod evaluate;
pub mod extract;
pub mod ingest;
pub mod reaper;
pub mod resolve;
pub mod runtime;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::clients::{EmbeddingClient, ReasoningClient};
use crate::core::config::PipelineConfig;
use crate::data::blobs::BlobStorage;
use crate::data::postgres::PostgresService;
use crate::data::queue::JobQueue;
use crate::domain::document::ProcessingStage;

/// Long-lived resources shared by every stage worker. Created once at
/// startup and passed explicitly; no process-wide singletons.
pub struct StageServices {
    pub db: Arc<PostgresService>,
    pub queue: Arc<dyn JobQueue>,
    pub blobs: Arc<dyn BlobStorage>,
    pub embedding: EmbeddingClient,
    pub reasoning: ReasoningClient,
    pub config: PipelineConfig,
}

/// What a stage did with one job.
#[derive(Debug)]
pub enum StageOutcome {
    /// Advance this document to the next stage and hand off its job
    Advance(Uuid),
    /// The job was fully handled inside the stage (crawl requests)
    Done,
    /// Poison or stale job: log and discard without re-enqueueing
    Discard(String),
}

/// A fatal stage failure; the document (or crawl request) goes terminal.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StageFailure(pub String);

impl StageFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One pipeline stage: a name, an input queue, and a transformation.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Stage name as recorded in the processing log
    fn name(&self) -> &'static str;

    /// Queue this stage consumes
    fn input_queue(&self) -> &'static str;

    /// The document stage a job must be in to be processed, when the job
    /// payload is a document ID. Crawl jobs are crawl-request IDs and
    /// return `None`.
    fn expected_stage(&self) -> Option<ProcessingStage>;

    /// Process one job.
    async fn run(
        &self,
        services: &StageServices,
        job_id: Uuid,
    ) -> Result<StageOutcome, StageFailure>;

    /// Record a terminal failure for this job. The default marks the
    /// document `error`; crawl overrides to fail the request instead.
    async fn on_fatal(&self, services: &StageServices, job_id: Uuid, message: &str) {
        let result = services
            .db
            .with_retry(|| async {
                crate::data::postgres::repositories::documents::mark_error(
                    services.db.pool(),
                    job_id,
                    message,
                )
                .await
            })
            .await;
        if let Err(e) = result {
            tracing::error!(
                document_id = %job_id,
                error = %e,
                "Failed to record terminal document error"
            );
        }
    }
}
