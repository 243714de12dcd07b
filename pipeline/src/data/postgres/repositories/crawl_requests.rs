//! Crawl request repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::data::postgres::PostgresError;
use crate::domain::document::{CrawlRequest, CrawlStatus};

type CrawlTuple = (
    Uuid,
    String,
    String,
    i32,
    i32,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn request_from_tuple(row: CrawlTuple) -> Result<CrawlRequest, PostgresError> {
    let (id, url, status, depth, max_depth, parent_url, error_message, created_at, updated_at) =
        row;
    let status = match status.as_str() {
        "pending" => CrawlStatus::Pending,
        "active" => CrawlStatus::Active,
        "completed" => CrawlStatus::Completed,
        "failed" => CrawlStatus::Failed,
        other => {
            return Err(PostgresError::Conflict(format!(
                "unknown crawl status: {}",
                other
            )));
        }
    };
    Ok(CrawlRequest {
        id,
        url,
        status,
        depth: depth.max(0) as u32,
        max_depth: max_depth.max(0) as u32,
        parent_url,
        error_message,
        created_at,
        updated_at,
    })
}

/// Insert a crawl request. URLs are unique; re-submitting an existing URL
/// is a no-op and returns `None`.
pub async fn insert_request(
    pool: &PgPool,
    url: &str,
    depth: u32,
    max_depth: u32,
    parent_url: Option<&str>,
) -> Result<Option<Uuid>, PostgresError> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO crawl_requests (id, url, depth, max_depth, parent_url)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (url) DO NOTHING
         RETURNING id",
    )
    .bind(id)
    .bind(url)
    .bind(depth as i32)
    .bind(max_depth as i32)
    .bind(parent_url)
    .fetch_optional(pool)
    .await?;
    Ok(inserted)
}

/// Get a crawl request by ID.
pub async fn get_request(pool: &PgPool, id: Uuid) -> Result<Option<CrawlRequest>, PostgresError> {
    let row = sqlx::query_as::<_, CrawlTuple>(
        "SELECT id, url, status, depth, max_depth, parent_url, error_message, created_at, updated_at
         FROM crawl_requests WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(request_from_tuple).transpose()
}

/// Transition the request status, optionally recording an error message.
/// Completed and failed rows remain for audit.
pub async fn set_status(
    pool: &PgPool,
    id: Uuid,
    status: CrawlStatus,
    error_message: Option<&str>,
) -> Result<(), PostgresError> {
    sqlx::query(
        "UPDATE crawl_requests SET status = $2, error_message = $3, updated_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}
