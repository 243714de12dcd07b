//! Evaluate stage
//!
//! Scores each chunk for trust, relevance, and automotive domain through a
//! single reasoning call per chunk. Model output goes through the lenient
//! JSON parser; a chunk whose output never parses gets the zeroed
//! evaluation and the document keeps moving.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::core::constants::QUEUE_EVALUATE;
use crate::data::postgres::repositories::chunks;
use crate::domain::chunk::{AutomotiveDomain, ChunkEvaluation};
use crate::domain::document::ProcessingStage;
use crate::utils::json::parse_lenient;

use super::{PipelineStage, StageFailure, StageOutcome, StageServices};

/// Score anchors are encoded in the rubric so different model versions
/// stay roughly calibrated.
const EVALUATION_SYSTEM_PROMPT: &str = "\
You evaluate text chunks from automotive diagnostic documents. Respond with \
JSON only, no prose, matching exactly:\n\
{\"trust_score\": number, \"relevance_score\": number, \
\"automotive_domain\": string, \"reasoning\": string}\n\
\n\
trust_score (0.0-1.0): how authoritative the source text is. OEM service \
documentation or TSB text scores 0.9 or above; professional repair guides \
0.6-0.8; forum anecdotes 0.3-0.5; spam or content-farm text near 0.\n\
relevance_score (0.0-1.0): how useful the chunk is for DTC diagnosis. \
Step-by-step diagnostic procedures with measurements score 0.9 or above; \
general symptom descriptions 0.5-0.7; off-topic text near 0.\n\
automotive_domain: one of obd, electrical, engine, transmission, brakes, \
suspension, hvac, body, general, unknown.\n\
reasoning: one or two sentences.";

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    #[serde(default)]
    trust_score: f64,
    #[serde(default)]
    relevance_score: f64,
    #[serde(default)]
    automotive_domain: String,
    #[serde(default)]
    reasoning: String,
}

pub struct EvaluateStage;

#[async_trait]
impl PipelineStage for EvaluateStage {
    fn name(&self) -> &'static str {
        "evaluate"
    }

    fn input_queue(&self) -> &'static str {
        QUEUE_EVALUATE
    }

    fn expected_stage(&self) -> Option<ProcessingStage> {
        Some(ProcessingStage::Evaluating)
    }

    async fn run(
        &self,
        services: &StageServices,
        job_id: Uuid,
    ) -> Result<StageOutcome, StageFailure> {
        let all_chunks = chunks::chunks_for_document(services.db.pool(), job_id)
            .await
            .map_err(|e| StageFailure::new(e.to_string()))?;

        let model = services.reasoning.model().to_string();
        let mut parse_failures = 0usize;

        for chunk in &all_chunks {
            let evaluation = match complete_with_retry(services, &chunk.text).await {
                Ok(output) => match parse_evaluation(&output, chunk.id, &model) {
                    Some(evaluation) => evaluation,
                    None => {
                        parse_failures += 1;
                        ChunkEvaluation::parse_failed(chunk.id, &model)
                    }
                },
                Err(e) => return Err(e),
            };

            services
                .db
                .with_retry(|| async {
                    chunks::upsert_evaluation(services.db.pool(), &evaluation).await
                })
                .await
                .map_err(|e| StageFailure::new(e.to_string()))?;
        }

        tracing::debug!(
            document_id = %job_id,
            chunks = all_chunks.len(),
            parse_failures,
            model = %model,
            "Chunks evaluated"
        );
        Ok(StageOutcome::Advance(job_id))
    }
}

/// Parse a model response into an evaluation, clamping scores into [0, 1]
/// and mapping out-of-set domains to `unknown`. `None` means all three
/// parse strategies failed.
fn parse_evaluation(output: &str, chunk_id: Uuid, model: &str) -> Option<ChunkEvaluation> {
    let (value, _strategy) = parse_lenient(output)?;
    let raw: RawEvaluation = serde_json::from_value(value).ok()?;
    Some(ChunkEvaluation {
        chunk_id,
        trust_score: raw.trust_score.clamp(0.0, 1.0),
        relevance_score: raw.relevance_score.clamp(0.0, 1.0),
        domain: AutomotiveDomain::parse_lenient(&raw.automotive_domain),
        reasoning: raw.reasoning,
        model: model.to_string(),
    })
}

async fn complete_with_retry(
    services: &StageServices,
    chunk_text: &str,
) -> Result<String, StageFailure> {
    let attempts = services.config.retry_attempts.max(1);
    let backoff = std::time::Duration::from_millis(services.config.retry_backoff_ms);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match services
            .reasoning
            .complete(EVALUATION_SYSTEM_PROMPT, chunk_text)
            .await
        {
            Ok(output) => return Ok(output),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(error = %e, attempt, "Retrying evaluation request");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                return Err(StageFailure::new(format!("evaluation failed: {}", e)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_evaluation_clean_json() {
        let output = r#"{"trust_score": 0.85, "relevance_score": 0.9, "automotive_domain": "engine", "reasoning": "OEM procedure"}"#;
        let eval = parse_evaluation(output, Uuid::nil(), "m").unwrap();
        assert!((eval.trust_score - 0.85).abs() < 1e-9);
        assert!((eval.relevance_score - 0.9).abs() < 1e-9);
        assert_eq!(eval.domain, AutomotiveDomain::Engine);
    }

    #[test]
    fn test_parse_evaluation_clamps_out_of_range() {
        let output = r#"{"trust_score": 1.8, "relevance_score": -0.4, "automotive_domain": "obd", "reasoning": ""}"#;
        let eval = parse_evaluation(output, Uuid::nil(), "m").unwrap();
        assert_eq!(eval.trust_score, 1.0);
        assert_eq!(eval.relevance_score, 0.0);
    }

    #[test]
    fn test_parse_evaluation_unknown_domain() {
        let output = r#"{"trust_score": 0.5, "relevance_score": 0.5, "automotive_domain": "warp drive", "reasoning": ""}"#;
        let eval = parse_evaluation(output, Uuid::nil(), "m").unwrap();
        assert_eq!(eval.domain, AutomotiveDomain::Unknown);
    }

    #[test]
    fn test_parse_evaluation_fenced() {
        let output = "```json\n{\"trust_score\": 0.4, \"relevance_score\": 0.6, \"automotive_domain\": \"brakes\", \"reasoning\": \"forum\"}\n```";
        let eval = parse_evaluation(output, Uuid::nil(), "m").unwrap();
        assert_eq!(eval.domain, AutomotiveDomain::Brakes);
    }

    #[test]
    fn test_parse_evaluation_total_failure() {
        assert!(parse_evaluation("I think it's trustworthy", Uuid::nil(), "m").is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let eval = parse_evaluation(r#"{"trust_score": 0.7}"#, Uuid::nil(), "m").unwrap();
        assert_eq!(eval.relevance_score, 0.0);
        assert_eq!(eval.domain, AutomotiveDomain::Unknown);
    }
}
