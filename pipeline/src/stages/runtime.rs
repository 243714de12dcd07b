//! Stage worker runtime
//!
//! The loop every stage worker runs: blocking pop with timeout, a stale- and
//! poison-job check, the stage transformation, then either advancement or
//! terminal failure. Every attempt lands in the processing log with its
//! wall-clock duration.
//!
//! Advancement orders the two effects deliberately: the stage-column update
//! commits first, the queue push follows. A crash between them leaves the
//! document in the new stage with no job, which the reaper recovers; the
//! reverse order could process a document twice.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::data::postgres::repositories::{documents, logs};
use crate::domain::document::ProcessingStage;

use super::{PipelineStage, StageOutcome, StageServices};

/// Spawn `count` workers for one stage. Each worker handles one job at a
/// time end-to-end; parallelism comes only from the pool size.
pub fn spawn_workers(
    stage: Arc<dyn PipelineStage>,
    services: Arc<StageServices>,
    count: usize,
    shutdown_rx: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_index| {
            let stage = stage.clone();
            let services = services.clone();
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                tracing::debug!(stage = stage.name(), worker_index, "Worker started");
                worker_loop(stage.as_ref(), &services, shutdown_rx).await;
                tracing::debug!(stage = stage.name(), worker_index, "Worker stopped");
            })
        })
        .collect()
}

async fn worker_loop(
    stage: &dyn PipelineStage,
    services: &StageServices,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let pop_timeout = Duration::from_secs(services.config.queue_pop_timeout_seconds);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let popped = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => continue,
            result = services.queue.pop(stage.input_queue(), pop_timeout) => result,
        };

        let payload = match popped {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(stage = stage.name(), error = %e, "Queue pop failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        // Poison payloads are logged and dropped, never re-enqueued.
        let job_id = match Uuid::parse_str(payload.trim()) {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(
                    stage = stage.name(),
                    payload = %payload,
                    "Discarding non-UUID job payload"
                );
                continue;
            }
        };

        process_job(stage, services, job_id).await;
    }
}

/// Run one job through the stage with full failure accounting.
pub async fn process_job(stage: &dyn PipelineStage, services: &StageServices, job_id: Uuid) {
    // Jobs whose document moved on (reaper double-enqueue, replay) are
    // dropped before any work happens.
    if let Some(expected) = stage.expected_stage() {
        match documents::get_document(services.db.pool(), job_id).await {
            Ok(Some(doc)) if doc.stage == expected => {}
            Ok(Some(doc)) => {
                tracing::debug!(
                    stage = stage.name(),
                    document_id = %job_id,
                    current = %doc.stage,
                    "Skipping job for document no longer in this stage"
                );
                return;
            }
            Ok(None) => {
                tracing::warn!(
                    stage = stage.name(),
                    document_id = %job_id,
                    "Discarding job for unknown document"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    stage = stage.name(),
                    document_id = %job_id,
                    error = %e,
                    "Stage pre-check failed; job dropped for reaper recovery"
                );
                return;
            }
        }
    }

    let start = std::time::Instant::now();
    log_attempt(services, job_id, stage.name(), logs::ProcessingStatus::Started, None, None).await;

    match stage.run(services, job_id).await {
        Ok(StageOutcome::Advance(document_id)) => {
            let duration_ms = start.elapsed().as_millis() as i64;
            log_attempt(
                services,
                job_id,
                stage.name(),
                logs::ProcessingStatus::Completed,
                None,
                Some(duration_ms),
            )
            .await;
            if let Err(e) = advance(services, document_id).await {
                tracing::error!(
                    stage = stage.name(),
                    document_id = %document_id,
                    error = %e,
                    "Stage advancement failed"
                );
                stage
                    .on_fatal(services, job_id, &format!("advance failed: {}", e))
                    .await;
            }
        }
        Ok(StageOutcome::Done) => {
            let duration_ms = start.elapsed().as_millis() as i64;
            log_attempt(
                services,
                job_id,
                stage.name(),
                logs::ProcessingStatus::Completed,
                None,
                Some(duration_ms),
            )
            .await;
        }
        Ok(StageOutcome::Discard(reason)) => {
            tracing::warn!(stage = stage.name(), job_id = %job_id, reason = %reason, "Job discarded");
            let duration_ms = start.elapsed().as_millis() as i64;
            log_attempt(
                services,
                job_id,
                stage.name(),
                logs::ProcessingStatus::Error,
                Some(&reason),
                Some(duration_ms),
            )
            .await;
        }
        Err(failure) => {
            let duration_ms = start.elapsed().as_millis() as i64;
            tracing::error!(
                stage = stage.name(),
                job_id = %job_id,
                error = %failure,
                "Stage failed"
            );
            log_attempt(
                services,
                job_id,
                stage.name(),
                logs::ProcessingStatus::Error,
                Some(&failure.0),
                Some(duration_ms),
            )
            .await;
            stage.on_fatal(services, job_id, &failure.0).await;
        }
    }
}

/// Atomic stage transition, then best-effort handoff.
///
/// The commit happens before the push: a crash in between strands the
/// document in its new stage with no job, which the reaper re-enqueues.
pub async fn advance(services: &StageServices, document_id: Uuid) -> Result<(), String> {
    let doc = documents::get_document(services.db.pool(), document_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("document {} disappeared before advance", document_id))?;

    let Some(next) = doc.stage.next() else {
        return Err(format!(
            "document {} in terminal stage {} cannot advance",
            document_id, doc.stage
        ));
    };

    let mut tx = services.db.pool().begin().await.map_err(|e| e.to_string())?;
    documents::set_stage_tx(&mut tx, document_id, next)
        .await
        .map_err(|e| e.to_string())?;
    tx.commit().await.map_err(|e| e.to_string())?;

    if let Some(queue) = next.queue() {
        if let Err(e) = services
            .queue
            .push(queue, &document_id.to_string())
            .await
        {
            // The stage column is already committed; the reaper will
            // re-enqueue this document.
            tracing::warn!(
                document_id = %document_id,
                queue,
                error = %e,
                "Queue push after stage commit failed"
            );
        }
    } else {
        tracing::debug!(document_id = %document_id, stage = %next, "Document reached terminal stage");
    }

    Ok(())
}

/// Transition a document's stage column and push its job, used by ingest
/// to start a document at `chunking`.
pub async fn dispatch_document(
    services: &StageServices,
    document_id: Uuid,
    stage: ProcessingStage,
) -> Result<(), String> {
    if let Some(queue) = stage.queue() {
        services
            .queue
            .push(queue, &document_id.to_string())
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

async fn log_attempt(
    services: &StageServices,
    document_id: Uuid,
    stage: &str,
    status: logs::ProcessingStatus,
    message: Option<&str>,
    duration_ms: Option<i64>,
) {
    if let Err(e) = logs::log_processing(
        services.db.pool(),
        document_id,
        stage,
        status,
        message,
        duration_ms,
    )
    .await
    {
        tracing::warn!(
            document_id = %document_id,
            stage,
            error = %e,
            "Failed to write processing log"
        );
    }
}
