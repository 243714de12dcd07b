//! Stuck-document reaper
//!
//! The advance path commits the stage column before pushing the next-stage
//! job, so a crash in the gap leaves a document parked in a stage with no
//! job in any queue. This task periodically finds documents whose
//! non-terminal stage has not changed for the configured threshold and
//! re-pushes their job. Double enqueues are harmless: workers drop jobs
//! whose document already moved on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::ReaperConfig;
use crate::data::postgres::repositories::documents;

use super::StageServices;

pub fn spawn_reaper(
    services: Arc<StageServices>,
    config: ReaperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.interval_s.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::debug!(
            interval_s = config.interval_s,
            stuck_after_s = config.stuck_after_s,
            "Reaper started"
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("Reaper shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    sweep(&services, config.stuck_after_s).await;
                }
            }
        }
    })
}

async fn sweep(services: &StageServices, stuck_after_s: u64) {
    let stuck = match documents::stuck_in_stage(services.db.pool(), stuck_after_s as i64).await {
        Ok(stuck) => stuck,
        Err(e) => {
            tracing::warn!(error = %e, "Reaper sweep query failed");
            return;
        }
    };

    if stuck.is_empty() {
        return;
    }

    let mut requeued = 0usize;
    for (document_id, stage) in stuck {
        let Some(queue) = stage.queue() else {
            continue;
        };
        match services.queue.push(queue, &document_id.to_string()).await {
            Ok(()) => {
                requeued += 1;
                tracing::info!(
                    document_id = %document_id,
                    stage = %stage,
                    queue,
                    "Re-enqueued stuck document"
                );
            }
            Err(e) => {
                tracing::warn!(
                    document_id = %document_id,
                    error = %e,
                    "Failed to re-enqueue stuck document"
                );
            }
        }
    }
    if requeued > 0 {
        tracing::debug!(count = requeued, "Reaper sweep complete");
    }
}
