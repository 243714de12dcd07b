//! Append-only log repositories: processing log, resolution log

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::data::postgres::PostgresError;

/// Resolution actions recorded per entity per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    Created,
    Updated,
    Merged,
    Rejected,
}

impl ResolutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Merged => "merged",
            Self::Rejected => "rejected",
        }
    }
}

/// Processing-log statuses for stage attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Started,
    Completed,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Record one stage attempt for a document.
pub async fn log_processing(
    pool: &PgPool,
    document_id: Uuid,
    stage: &str,
    status: ProcessingStatus,
    message: Option<&str>,
    duration_ms: Option<i64>,
) -> Result<(), PostgresError> {
    sqlx::query(
        "INSERT INTO processing_log (document_id, stage, status, message, duration_ms)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(document_id)
    .bind(stage)
    .bind(status.as_str())
    .bind(message)
    .bind(duration_ms)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record one resolution action inside the Resolve transaction.
pub async fn log_resolution_tx(
    tx: &mut Transaction<'_, Postgres>,
    run_id: Uuid,
    document_id: Uuid,
    entity_table: Option<&str>,
    entity_id: Option<Uuid>,
    action: ResolutionAction,
    details: &str,
) -> Result<(), PostgresError> {
    sqlx::query(
        "INSERT INTO resolution_log (run_id, document_id, entity_table, entity_id, action, details)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(run_id)
    .bind(document_id)
    .bind(entity_table)
    .bind(entity_id)
    .bind(action.as_str())
    .bind(details)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Actions recorded for one run, in insertion order. Used by the audit
/// surface and the invariant checks.
pub async fn resolution_actions(
    pool: &PgPool,
    run_id: Uuid,
) -> Result<Vec<(String, Option<String>)>, PostgresError> {
    let rows = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT action, details FROM resolution_log WHERE run_id = $1 ORDER BY id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_strings() {
        assert_eq!(ResolutionAction::Created.as_str(), "created");
        assert_eq!(ResolutionAction::Updated.as_str(), "updated");
        assert_eq!(ResolutionAction::Merged.as_str(), "merged");
        assert_eq!(ResolutionAction::Rejected.as_str(), "rejected");
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ProcessingStatus::Started.as_str(), "started");
        assert_eq!(ProcessingStatus::Completed.as_str(), "completed");
        assert_eq!(ProcessingStatus::Error.as_str(), "error");
    }
}
