//! Extract stage
//!
//! Runs entity extraction over every chunk that clears the relevance gate
//! (inclusive at the threshold), validates the output against the closed
//! sets, and stages the surviving rows with their chunk's trust and
//! relevance. A document whose chunks yield nothing still advances;
//! Resolve treats it as a no-op.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::constants::QUEUE_EXTRACT;
use crate::data::postgres::repositories::chunks::{self, EvaluatedChunk};
use crate::data::postgres::repositories::{documents, staging};
use crate::domain::document::ProcessingStage;
use crate::domain::extraction::{DocumentCategory, Extraction, RawExtraction};
use crate::utils::json::parse_lenient;

use super::{PipelineStage, StageFailure, StageOutcome, StageServices};

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You extract structured facts from automotive diagnostic text. Extract only \
what the text explicitly states; never infer or fabricate. Respond with JSON \
only, matching exactly:\n\
{\"dtc_codes\": [{\"code\", \"description\", \"category\", \"severity\"}],\n\
 \"causes\": [{\"dtc_code\", \"description\", \"likelihood\"}],\n\
 \"diagnostic_steps\": [{\"dtc_code\", \"step_order\", \"description\", \
\"tools_required\", \"expected_values\"}],\n\
 \"sensors\": [{\"name\", \"sensor_type\", \"typical_range\", \"unit\", \
\"related_dtc_codes\"}],\n\
 \"tsb_references\": [{\"tsb_number\", \"title\", \"affected_models\", \
\"related_dtc_codes\", \"summary\"}],\n\
 \"vehicles_mentioned\": [{\"make\", \"model\", \"year_start\", \"year_end\", \
\"engine\", \"transmission\", \"related_dtc_codes\"}],\n\
 \"document_category\": string}\n\
\n\
DTC codes are one of P/B/C/U followed by four hex digits (e.g. P0301). \
severity is one of: critical, moderate, minor, informational. likelihood is \
one of: high, medium, low. document_category is one of: repair_procedure, \
diagnostic_guide, dtc_reference, tsb_bulletin, wiring_diagram, \
parts_catalog, forum_discussion, owners_manual, recall_notice, \
general_reference. Use empty arrays for anything the text does not state.";

pub struct ExtractStage;

#[async_trait]
impl PipelineStage for ExtractStage {
    fn name(&self) -> &'static str {
        "extract"
    }

    fn input_queue(&self) -> &'static str {
        QUEUE_EXTRACT
    }

    fn expected_stage(&self) -> Option<ProcessingStage> {
        Some(ProcessingStage::Extracting)
    }

    async fn run(
        &self,
        services: &StageServices,
        job_id: Uuid,
    ) -> Result<StageOutcome, StageFailure> {
        let eligible = chunks::eligible_chunks(
            services.db.pool(),
            job_id,
            services.config.relevance_gate_threshold,
        )
        .await
        .map_err(|e| StageFailure::new(e.to_string()))?;

        if eligible.is_empty() {
            tracing::debug!(document_id = %job_id, "No chunks cleared the relevance gate");
            return Ok(StageOutcome::Advance(job_id));
        }

        // Extract per chunk first; staging happens in one transaction after
        // all model calls so a replay never leaves partial rows.
        let mut per_chunk: Vec<(EvaluatedChunk, Extraction)> = Vec::new();
        for chunk in eligible {
            let extraction = extract_chunk(services, &chunk).await?;
            if !extraction.is_empty() || extraction.document_category.is_some() {
                per_chunk.push((chunk, extraction));
            }
        }

        let category = dominant_category(per_chunk.iter().filter_map(|(_, e)| e.document_category));

        let staged_rows = services
            .db
            .with_retry(|| async {
                let mut tx = services.db.pool().begin().await?;
                staging::clear_document_tx(&mut tx, job_id).await?;
                let mut count = 0usize;
                for (chunk, extraction) in &per_chunk {
                    let provenance = staging::ChunkProvenance {
                        chunk_id: chunk.chunk.id,
                        trust_score: chunk.trust_score,
                        relevance_score: chunk.relevance_score,
                    };
                    for dtc in &extraction.dtc_codes {
                        staging::stage_dtc_tx(&mut tx, job_id, provenance, dtc).await?;
                        count += 1;
                    }
                    for cause in &extraction.causes {
                        staging::stage_cause_tx(&mut tx, job_id, provenance, cause).await?;
                        count += 1;
                    }
                    for step in &extraction.diagnostic_steps {
                        staging::stage_step_tx(&mut tx, job_id, provenance, step).await?;
                        count += 1;
                    }
                    for sensor in &extraction.sensors {
                        staging::stage_sensor_tx(&mut tx, job_id, provenance, sensor).await?;
                        count += 1;
                    }
                    for tsb in &extraction.tsb_references {
                        staging::stage_tsb_tx(&mut tx, job_id, provenance, tsb).await?;
                        count += 1;
                    }
                    for vehicle in &extraction.vehicles_mentioned {
                        staging::stage_vehicle_tx(&mut tx, job_id, provenance, vehicle).await?;
                        count += 1;
                    }
                }
                tx.commit().await?;
                Ok(count)
            })
            .await
            .map_err(|e| StageFailure::new(e.to_string()))?;

        if let Some(category) = category {
            services
                .db
                .with_retry(|| async {
                    documents::set_category(services.db.pool(), job_id, category.as_str()).await
                })
                .await
                .map_err(|e| StageFailure::new(e.to_string()))?;
        }

        tracing::debug!(
            document_id = %job_id,
            staged_rows,
            category = category.map(|c| c.as_str()).unwrap_or("none"),
            "Extraction staged"
        );
        Ok(StageOutcome::Advance(job_id))
    }
}

/// One extraction call for one chunk, with bounded retry on transient
/// failures. Unparseable output stages nothing for the chunk but never
/// fails the document.
async fn extract_chunk(
    services: &StageServices,
    chunk: &EvaluatedChunk,
) -> Result<Extraction, StageFailure> {
    let attempts = services.config.retry_attempts.max(1);
    let backoff = std::time::Duration::from_millis(services.config.retry_backoff_ms);
    let mut attempt = 0u32;
    let output = loop {
        attempt += 1;
        match services
            .reasoning
            .complete(EXTRACTION_SYSTEM_PROMPT, &chunk.chunk.text)
            .await
        {
            Ok(output) => break output,
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(error = %e, attempt, "Retrying extraction request");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                return Err(StageFailure::new(format!("extraction failed: {}", e)));
            }
        }
    };

    Ok(parse_extraction(&output).unwrap_or_else(|| {
        tracing::warn!(chunk_id = %chunk.chunk.id, "Extraction output unparseable; chunk skipped");
        Extraction::default()
    }))
}

/// Lenient-parse then sanitize an extraction response.
fn parse_extraction(output: &str) -> Option<Extraction> {
    let (value, _strategy) = parse_lenient(output)?;
    let raw: RawExtraction = serde_json::from_value(value).ok()?;
    Some(Extraction::from_raw(raw))
}

/// Most frequent category across chunk extractions; count ties break by
/// name so the result never depends on map iteration order.
fn dominant_category(
    categories: impl Iterator<Item = DocumentCategory>,
) -> Option<DocumentCategory> {
    let mut counts: HashMap<&'static str, (usize, DocumentCategory)> = HashMap::new();
    for category in categories {
        counts.entry(category.as_str()).or_insert((0, category)).0 += 1;
    }
    counts
        .into_values()
        .max_by(|(count_a, cat_a), (count_b, cat_b)| {
            count_a
                .cmp(count_b)
                .then_with(|| cat_b.as_str().cmp(cat_a.as_str()))
        })
        .map(|(_, category)| category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extraction_drops_invalid_codes() {
        let output = r#"{"dtc_codes": [{"code": "P0301"}, {"code": "XYZ"}], "causes": [], "document_category": "diagnostic_guide"}"#;
        let extraction = parse_extraction(output).unwrap();
        assert_eq!(extraction.dtc_codes.len(), 1);
        assert_eq!(
            extraction.document_category,
            Some(DocumentCategory::DiagnosticGuide)
        );
    }

    #[test]
    fn test_parse_extraction_prose_wrapped() {
        let output = "Sure! Here it is: {\"dtc_codes\": [{\"code\": \"p0420\"}]} Done.";
        let extraction = parse_extraction(output).unwrap();
        assert_eq!(extraction.dtc_codes[0].code.as_str(), "P0420");
    }

    #[test]
    fn test_parse_extraction_garbage_is_none() {
        assert!(parse_extraction("no json here at all").is_none());
    }

    #[test]
    fn test_dominant_category_majority() {
        let cats = vec![
            DocumentCategory::DiagnosticGuide,
            DocumentCategory::DiagnosticGuide,
            DocumentCategory::ForumDiscussion,
        ];
        assert_eq!(
            dominant_category(cats.into_iter()),
            Some(DocumentCategory::DiagnosticGuide)
        );
    }

    #[test]
    fn test_dominant_category_tie_is_deterministic() {
        let a = dominant_category(
            vec![
                DocumentCategory::DtcReference,
                DocumentCategory::ForumDiscussion,
            ]
            .into_iter(),
        );
        let b = dominant_category(
            vec![
                DocumentCategory::ForumDiscussion,
                DocumentCategory::DtcReference,
            ]
            .into_iter(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_dominant_category_empty() {
        assert_eq!(dominant_category(std::iter::empty()), None);
    }
}
