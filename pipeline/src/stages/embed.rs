//! Embed stage
//!
//! Fills in the embedding vector for every chunk that lacks one. Requests
//! are serial within a document to keep failure semantics simple; a vector
//! whose dimension disagrees with the schema is dropped with a warning
//! rather than failing the document.

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::constants::QUEUE_EMBED;
use crate::data::postgres::repositories::chunks;
use crate::domain::document::ProcessingStage;

use super::{PipelineStage, StageFailure, StageOutcome, StageServices};

pub struct EmbedStage;

#[async_trait]
impl PipelineStage for EmbedStage {
    fn name(&self) -> &'static str {
        "embed"
    }

    fn input_queue(&self) -> &'static str {
        QUEUE_EMBED
    }

    fn expected_stage(&self) -> Option<ProcessingStage> {
        Some(ProcessingStage::Embedding)
    }

    async fn run(
        &self,
        services: &StageServices,
        job_id: Uuid,
    ) -> Result<StageOutcome, StageFailure> {
        let pending = chunks::chunks_missing_embedding(services.db.pool(), job_id)
            .await
            .map_err(|e| StageFailure::new(e.to_string()))?;

        let expected_dim = services.config.embedding_dim;
        let mut embedded = 0usize;
        let mut dropped = 0usize;

        for chunk in &pending {
            let vector = embed_with_retry(services, &chunk.text).await?;

            if vector.len() != expected_dim {
                // Element-level invariant violation: skip, don't poison the
                // document.
                tracing::warn!(
                    chunk_id = %chunk.id,
                    got = vector.len(),
                    expected = expected_dim,
                    "Dropping embedding with wrong dimension"
                );
                dropped += 1;
                continue;
            }

            services
                .db
                .with_retry(|| async {
                    chunks::set_embedding(services.db.pool(), chunk.id, &vector).await
                })
                .await
                .map_err(|e| StageFailure::new(e.to_string()))?;
            embedded += 1;
        }

        tracing::debug!(
            document_id = %job_id,
            embedded,
            dropped,
            model = services.embedding.model(),
            "Embeddings stored"
        );
        Ok(StageOutcome::Advance(job_id))
    }
}

/// One bounded retry pass over the embedding call for transient failures.
async fn embed_with_retry(
    services: &StageServices,
    text: &str,
) -> Result<Vec<f32>, StageFailure> {
    let attempts = services.config.retry_attempts.max(1);
    let backoff = std::time::Duration::from_millis(services.config.retry_backoff_ms);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match services.embedding.embed(text).await {
            Ok(vector) => return Ok(vector),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(error = %e, attempt, "Retrying embedding request");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                return Err(StageFailure::new(format!("embedding failed: {}", e)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_identity() {
        let stage = EmbedStage;
        assert_eq!(stage.name(), "embed");
        assert_eq!(stage.input_queue(), "jobs:embed");
        assert_eq!(stage.expected_stage(), Some(ProcessingStage::Embedding));
    }
}
