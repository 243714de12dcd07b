//! Chunk and evaluation repository

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::data::postgres::PostgresError;
use crate::domain::chunk::{AutomotiveDomain, Chunk, ChunkEvaluation};
use crate::utils::text::TextSegment;

type ChunkTuple = (
    Uuid,
    Uuid,
    i32,
    String,
    i32,
    i32,
    i32,
    Option<Vec<f32>>,
    DateTime<Utc>,
);

fn chunk_from_tuple(row: ChunkTuple) -> Chunk {
    let (id, document_id, chunk_index, text, char_start, char_end, token_count, embedding, created_at) =
        row;
    Chunk {
        id,
        document_id,
        chunk_index,
        text,
        char_start,
        char_end,
        token_count,
        embedding,
        created_at,
    }
}

/// Insert one chunk row inside the chunk-write transaction.
///
/// `(document_id, chunk_index)` is unique; chunks are immutable once
/// written, so conflicts indicate a replayed job and are rejected by the
/// constraint.
pub async fn insert_chunk_tx(
    tx: &mut Transaction<'_, Postgres>,
    document_id: Uuid,
    segment: &TextSegment,
) -> Result<Uuid, PostgresError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO chunks (id, document_id, chunk_index, chunk_text, char_start, char_end, token_count)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(document_id)
    .bind(segment.index as i32)
    .bind(&segment.text)
    .bind(segment.char_start as i32)
    .bind(segment.char_end as i32)
    .bind(segment.token_count as i32)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

/// Remove any chunks a previous partial run left behind, so a re-enqueued
/// chunking job starts from a clean slate.
pub async fn delete_chunks_tx(
    tx: &mut Transaction<'_, Postgres>,
    document_id: Uuid,
) -> Result<u64, PostgresError> {
    let result = sqlx::query("DELETE FROM chunks WHERE document_id = $1")
        .bind(document_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// All chunks of a document in index order.
pub async fn chunks_for_document(
    pool: &PgPool,
    document_id: Uuid,
) -> Result<Vec<Chunk>, PostgresError> {
    let rows = sqlx::query_as::<_, ChunkTuple>(
        "SELECT id, document_id, chunk_index, chunk_text, char_start, char_end, token_count, embedding, created_at
         FROM chunks WHERE document_id = $1 ORDER BY chunk_index",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(chunk_from_tuple).collect())
}

/// Chunks of a document still lacking an embedding, in index order.
pub async fn chunks_missing_embedding(
    pool: &PgPool,
    document_id: Uuid,
) -> Result<Vec<Chunk>, PostgresError> {
    let rows = sqlx::query_as::<_, ChunkTuple>(
        "SELECT id, document_id, chunk_index, chunk_text, char_start, char_end, token_count, embedding, created_at
         FROM chunks WHERE document_id = $1 AND embedding IS NULL ORDER BY chunk_index",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(chunk_from_tuple).collect())
}

/// Store a chunk's embedding vector.
pub async fn set_embedding(
    pool: &PgPool,
    chunk_id: Uuid,
    embedding: &[f32],
) -> Result<(), PostgresError> {
    sqlx::query("UPDATE chunks SET embedding = $2 WHERE id = $1")
        .bind(chunk_id)
        .bind(embedding)
        .execute(pool)
        .await?;
    Ok(())
}

/// Upsert the one evaluation row per chunk. Re-evaluation overwrites.
pub async fn upsert_evaluation(
    pool: &PgPool,
    evaluation: &ChunkEvaluation,
) -> Result<(), PostgresError> {
    sqlx::query(
        "INSERT INTO chunk_evaluations (chunk_id, trust_score, relevance_score, automotive_domain, reasoning, model)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (chunk_id) DO UPDATE SET
             trust_score = EXCLUDED.trust_score,
             relevance_score = EXCLUDED.relevance_score,
             automotive_domain = EXCLUDED.automotive_domain,
             reasoning = EXCLUDED.reasoning,
             model = EXCLUDED.model",
    )
    .bind(evaluation.chunk_id)
    .bind(evaluation.trust_score)
    .bind(evaluation.relevance_score)
    .bind(evaluation.domain.as_str())
    .bind(&evaluation.reasoning)
    .bind(&evaluation.model)
    .execute(pool)
    .await?;
    Ok(())
}

/// A chunk joined with its evaluation scores.
#[derive(Debug, Clone)]
pub struct EvaluatedChunk {
    pub chunk: Chunk,
    pub trust_score: f64,
    pub relevance_score: f64,
    pub domain: AutomotiveDomain,
}

/// Chunks whose relevance meets the gate threshold (inclusive), joined
/// with their evaluations, in index order.
pub async fn eligible_chunks(
    pool: &PgPool,
    document_id: Uuid,
    relevance_threshold: f64,
) -> Result<Vec<EvaluatedChunk>, PostgresError> {
    let rows = sqlx::query_as::<_, (
        Uuid,
        Uuid,
        i32,
        String,
        i32,
        i32,
        i32,
        Option<Vec<f32>>,
        DateTime<Utc>,
        f64,
        f64,
        String,
    )>(
        "SELECT c.id, c.document_id, c.chunk_index, c.chunk_text, c.char_start, c.char_end,
                c.token_count, c.embedding, c.created_at,
                e.trust_score, e.relevance_score, e.automotive_domain
         FROM chunks c
         JOIN chunk_evaluations e ON e.chunk_id = c.id
         WHERE c.document_id = $1 AND e.relevance_score >= $2
         ORDER BY c.chunk_index",
    )
    .bind(document_id)
    .bind(relevance_threshold)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, doc_id, idx, text, start, end, tokens, embedding, created_at, trust, relevance, domain)| {
                EvaluatedChunk {
                    chunk: chunk_from_tuple((
                        id, doc_id, idx, text, start, end, tokens, embedding, created_at,
                    )),
                    trust_score: trust,
                    relevance_score: relevance,
                    domain: AutomotiveDomain::parse_lenient(&domain),
                }
            },
        )
        .collect())
}

/// Number of chunk rows for a document (the `chunk_count` invariant check).
pub async fn count_chunks(pool: &PgPool, document_id: Uuid) -> Result<i64, PostgresError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = $1")
        .bind(document_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
