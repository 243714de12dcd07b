//! Document repository
//!
//! Stage transitions live here: `set_stage` runs inside the advance
//! transaction, `mark_error` is the terminal failure path, and
//! `stuck_in_stage` feeds the reaper.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::data::postgres::PostgresError;
use crate::domain::document::{Document, ProcessingStage};

type DocumentTuple = (
    Uuid,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<String>,
    i32,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const DOCUMENT_COLUMNS: &str = "id, title, source_url, content_hash, mime_type, blob_location, \
     processing_stage, error_message, chunk_count, category, created_at, updated_at";

fn document_from_tuple(row: DocumentTuple) -> Result<Document, PostgresError> {
    let (
        id,
        title,
        source_url,
        content_hash,
        mime_type,
        blob_location,
        stage,
        error_message,
        chunk_count,
        category,
        created_at,
        updated_at,
    ) = row;
    let stage = stage
        .parse::<ProcessingStage>()
        .map_err(PostgresError::Conflict)?;
    Ok(Document {
        id,
        title,
        source_url,
        content_hash,
        mime_type,
        blob_location,
        stage,
        error_message,
        chunk_count,
        category,
        created_at,
        updated_at,
    })
}

/// Insert a new document in the given stage. The caller supplies the ID
/// because the blob key embeds it and is written first.
#[allow(clippy::too_many_arguments)]
pub async fn insert_document(
    pool: &PgPool,
    id: Uuid,
    title: &str,
    source_url: Option<&str>,
    content_hash: &str,
    mime_type: &str,
    blob_location: &str,
    stage: ProcessingStage,
) -> Result<Uuid, PostgresError> {
    sqlx::query(
        "INSERT INTO documents (id, title, source_url, content_hash, mime_type, blob_location, processing_stage)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(title)
    .bind(source_url)
    .bind(content_hash)
    .bind(mime_type)
    .bind(blob_location)
    .bind(stage.as_str())
    .execute(pool)
    .await?;
    Ok(id)
}

/// Get a document by ID.
pub async fn get_document(pool: &PgPool, id: Uuid) -> Result<Option<Document>, PostgresError> {
    let row = sqlx::query_as::<_, DocumentTuple>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(document_from_tuple).transpose()
}

/// Find a document ID by content hash (the ingest dedup key).
pub async fn find_by_hash(pool: &PgPool, content_hash: &str) -> Result<Option<Uuid>, PostgresError> {
    let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM documents WHERE content_hash = $1")
        .bind(content_hash)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Advance the stage column inside an open transaction. The caller commits
/// before pushing the next-stage job so a crash in between never loses the
/// document.
pub async fn set_stage_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    stage: ProcessingStage,
) -> Result<(), PostgresError> {
    sqlx::query(
        "UPDATE documents SET processing_stage = $2, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(stage.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Terminal failure: record the stage as `error` with a reason.
pub async fn mark_error(pool: &PgPool, id: Uuid, message: &str) -> Result<(), PostgresError> {
    sqlx::query(
        "UPDATE documents SET processing_stage = 'error', error_message = $2, updated_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .bind(message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record the chunk count inside the chunk-write transaction.
pub async fn set_chunk_count_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    chunk_count: i32,
) -> Result<(), PostgresError> {
    sqlx::query("UPDATE documents SET chunk_count = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(chunk_count)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Record the document category chosen by the extract stage.
pub async fn set_category(
    pool: &PgPool,
    id: Uuid,
    category: &str,
) -> Result<(), PostgresError> {
    sqlx::query("UPDATE documents SET category = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(category)
        .execute(pool)
        .await?;
    Ok(())
}

/// Documents sitting in a non-terminal stage untouched for longer than
/// `stuck_after_secs`. The reaper re-enqueues these; their queue push was
/// lost between the advance commit and the push.
pub async fn stuck_in_stage(
    pool: &PgPool,
    stuck_after_secs: i64,
) -> Result<Vec<(Uuid, ProcessingStage)>, PostgresError> {
    let rows = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, processing_stage FROM documents
         WHERE processing_stage NOT IN ('pending', 'complete', 'error')
           AND updated_at < now() - make_interval(secs => $1)
         ORDER BY updated_at ASC
         LIMIT 100",
    )
    .bind(stuck_after_secs as f64)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, stage)| {
            stage
                .parse::<ProcessingStage>()
                .map(|s| (id, s))
                .map_err(PostgresError::Conflict)
        })
        .collect()
}

/// Per-stage document counts for the stats surface.
pub async fn count_by_stage(pool: &PgPool) -> Result<Vec<(String, i64)>, PostgresError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT processing_stage, COUNT(*) FROM documents GROUP BY processing_stage",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
