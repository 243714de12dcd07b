//! Direct text ingestion and pipeline stats
//!
//! The operations the API and monitoring collaborators call into. Direct
//! ingestion bypasses the crawl stage: the text is hashed, deduped, stored,
//! and the document starts life in stage `chunking`.

use uuid::Uuid;

use crate::core::constants::ALL_QUEUES;
use crate::data::blobs::blob_key;
use crate::data::postgres::repositories::documents;
use crate::domain::document::ProcessingStage;
use crate::utils::hash;

use super::{StageFailure, StageServices, runtime};

/// Outcome of a direct text submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new document was created and queued for chunking
    Created(Uuid),
    /// The same content hash already exists; nothing changed
    Duplicate(Uuid),
}

/// Ingest raw text as a document. Re-submitting identical text is a no-op
/// that reports the existing document.
pub async fn ingest_text(
    services: &StageServices,
    title: &str,
    text: &str,
    source_url: Option<&str>,
) -> Result<IngestOutcome, StageFailure> {
    if text.trim().is_empty() {
        return Err(StageFailure::new("cannot ingest empty text"));
    }

    let content_hash = hash::sha256_hex(text.as_bytes());

    let existing = services
        .db
        .with_retry(|| async { documents::find_by_hash(services.db.pool(), &content_hash).await })
        .await
        .map_err(|e| StageFailure::new(e.to_string()))?;
    if let Some(existing_id) = existing {
        tracing::debug!(document_id = %existing_id, "Ingest skipped duplicate content");
        return Ok(IngestOutcome::Duplicate(existing_id));
    }

    let document_id = Uuid::new_v4();
    let key = blob_key(&document_id, "text/plain");
    let location = services
        .blobs
        .put(&key, text.as_bytes(), "text/plain; charset=utf-8")
        .await
        .map_err(|e| StageFailure::new(format!("blob store failed: {}", e)))?;

    services
        .db
        .with_retry(|| async {
            documents::insert_document(
                services.db.pool(),
                document_id,
                title,
                source_url,
                &content_hash,
                "text/plain",
                &location,
                ProcessingStage::Chunking,
            )
            .await
        })
        .await
        .map_err(|e| StageFailure::new(e.to_string()))?;

    runtime::dispatch_document(services, document_id, ProcessingStage::Chunking)
        .await
        .map_err(StageFailure::new)?;

    tracing::info!(document_id = %document_id, title, "Text ingested");
    Ok(IngestOutcome::Created(document_id))
}

/// Point-in-time pipeline stats: queue depths and per-stage document
/// counts.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub queue_depths: Vec<(String, u64)>,
    pub documents_by_stage: Vec<(String, i64)>,
}

pub async fn pipeline_stats(services: &StageServices) -> Result<PipelineStats, StageFailure> {
    let mut queue_depths = Vec::with_capacity(ALL_QUEUES.len());
    for queue in ALL_QUEUES {
        let depth = services
            .queue
            .depth(queue)
            .await
            .map_err(|e| StageFailure::new(e.to_string()))?;
        queue_depths.push((queue.to_string(), depth));
    }

    let documents_by_stage = documents::count_by_stage(services.db.pool())
        .await
        .map_err(|e| StageFailure::new(e.to_string()))?;

    Ok(PipelineStats {
        queue_depths,
        documents_by_stage,
    })
}
