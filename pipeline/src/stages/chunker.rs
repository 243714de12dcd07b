//! Chunk stage
//!
//! Reads the document text from blob storage, segments it at word
//! boundaries with overlap, and writes every chunk plus the document's
//! `chunk_count` in one transaction. Chunks are immutable; a replayed job
//! clears any partial rows first so the unique `(document, index)` key
//! never trips.

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::constants::QUEUE_CHUNK;
use crate::data::postgres::repositories::{chunks, documents};
use crate::domain::document::ProcessingStage;
use crate::utils::text::TextSplitter;

use super::{PipelineStage, StageFailure, StageOutcome, StageServices};

pub struct ChunkStage;

#[async_trait]
impl PipelineStage for ChunkStage {
    fn name(&self) -> &'static str {
        "chunk"
    }

    fn input_queue(&self) -> &'static str {
        QUEUE_CHUNK
    }

    fn expected_stage(&self) -> Option<ProcessingStage> {
        Some(ProcessingStage::Chunking)
    }

    async fn run(
        &self,
        services: &StageServices,
        job_id: Uuid,
    ) -> Result<StageOutcome, StageFailure> {
        let document = documents::get_document(services.db.pool(), job_id)
            .await
            .map_err(|e| StageFailure::new(e.to_string()))?
            .ok_or_else(|| StageFailure::new("document disappeared"))?;

        let blob = services
            .blobs
            .get(&document.blob_location)
            .await
            .map_err(|e| StageFailure::new(format!("blob fetch failed: {}", e)))?;
        let text = String::from_utf8_lossy(&blob);

        let splitter = TextSplitter::new(
            services.config.chunk_size_chars,
            services.config.chunk_overlap_chars,
        );

        let result = services
            .db
            .with_retry(|| async {
                let mut tx = services.db.pool().begin().await?;
                chunks::delete_chunks_tx(&mut tx, job_id).await?;
                // Consume the segment iterator lazily, counting as we go;
                // large documents never materialize a full chunk list.
                let mut count = 0i32;
                for segment in splitter.segments(&text) {
                    chunks::insert_chunk_tx(&mut tx, job_id, &segment).await?;
                    count += 1;
                }
                documents::set_chunk_count_tx(&mut tx, job_id, count).await?;
                tx.commit().await?;
                Ok(count)
            })
            .await;

        let count = result.map_err(|e| StageFailure::new(e.to_string()))?;
        tracing::debug!(document_id = %job_id, chunks = count, "Document chunked");

        Ok(StageOutcome::Advance(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_identity() {
        let stage = ChunkStage;
        assert_eq!(stage.name(), "chunk");
        assert_eq!(stage.input_queue(), "jobs:chunk");
        assert_eq!(stage.expected_stage(), Some(ProcessingStage::Chunking));
    }
}
