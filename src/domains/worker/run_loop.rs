//! The worker loop: single task in flight per worker process (multiple
//! worker instances may coexist; the GPU semaphore enforces the true
//! hardware limit). See `spec.md` §4.5 for the pseudo-protocol this
//! implements line for line.

use crate::domains::admission::gpu;
use crate::domains::ledger::{self, Reason};
use crate::domains::tasks::models::{JobPayload, Status};
use crate::domains::tasks::queue;
use crate::domains::worker::classify::{effective_timeout, invoke_with_timeout};
use crate::kernel::backend::GenerationBackend;
use crate::kernel::notify::Notifier;
use crate::kernel::store::KeyedStore;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const POLL_IDLE_SLEEP: Duration = Duration::from_secs(1);
const GPU_SATURATED_SLEEP: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct WorkerConfig {
    pub max_gpu_jobs: u32,
    pub generation_timeout: Duration,
}

/// Runs until `shutdown` is cancelled. Owns no in-process lock across a
/// suspension point; every coordination decision goes through `store`.
pub async fn run(
    store: &dyn KeyedStore,
    db: &sqlx::PgPool,
    backend: &dyn GenerationBackend,
    notifier: &dyn Notifier,
    config: WorkerConfig,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }

        match queue::dequeue(store).await {
            Ok(Some((id, payload))) => {
                if let Err(e) = process_one(store, db, backend, notifier, &config, id, payload).await {
                    warn!(error = %e, "worker iteration failed");
                }
            }
            Ok(None) => tokio::time::sleep(POLL_IDLE_SLEEP).await,
            Err(e) => {
                warn!(error = %e, "dequeue failed, backing off");
                tokio::time::sleep(POLL_IDLE_SLEEP).await;
            }
        }
    }
}

async fn process_one(
    store: &dyn KeyedStore,
    db: &sqlx::PgPool,
    backend: &dyn GenerationBackend,
    notifier: &dyn Notifier,
    config: &WorkerConfig,
    id: crate::domains::tasks::models::RequestId,
    payload: JobPayload,
) -> anyhow::Result<()> {
    // Cancelled while still in the queue.
    if matches!(
        queue::read_status(store, &id).await?,
        Some(Status::Cancelled)
    ) {
        refund_and_unlock(store, db, notifier, &payload, true).await;
        return Ok(());
    }

    if !gpu::acquire_gpu_slot(store, config.max_gpu_jobs, &id).await? {
        // GPU saturated: park by pushing the id back to the head of the
        // FIFO list so a different worker instance (or this one, next
        // iteration) can retry without losing enqueue order.
        queue::requeue_to_head(store, &id).await?;
        tokio::time::sleep(GPU_SATURATED_SLEEP).await;
        return Ok(());
    }

    let result = drive_job(store, db, backend, notifier, config, &id, payload.clone()).await;

    gpu::release_gpu_slot(store, &id).await.ok();
    store.del(&format!("active_gen:{}", payload.user_external_id)).await.ok();

    result
}

async fn drive_job(
    store: &dyn KeyedStore,
    db: &sqlx::PgPool,
    backend: &dyn GenerationBackend,
    notifier: &dyn Notifier,
    config: &WorkerConfig,
    id: &crate::domains::tasks::models::RequestId,
    payload: JobPayload,
) -> anyhow::Result<()> {
    queue::set_status(store, id, Status::Processing).await?;

    // --- CHECKPOINT A ---
    if matches!(queue::read_status(store, id).await?, Some(Status::Cancelled)) {
        refund_and_unlock(store, db, notifier, &payload, false).await;
        return Ok(());
    }

    let timeout = effective_timeout(config.generation_timeout, payload.kind.is_video_class());
    let outcome = invoke_with_timeout(backend, &payload, timeout).await;

    // --- CHECKPOINT B ---
    if matches!(queue::read_status(store, id).await?, Some(Status::Cancelled)) {
        if let Ok(success) = &outcome {
            info!(request_id = %id, handle = %success.result_handle, "discarding result for cancelled job");
        }
        refund_and_unlock(store, db, notifier, &payload, false).await;
        return Ok(());
    }

    match outcome {
        Ok(success) => {
            queue::set_status(store, id, Status::Completed).await?;
            notifier.notify_success(&payload, &success).await;
            cache_last_job(store, &payload).await;
        }
        Err((kind, detail)) => {
            warn!(request_id = %id, ?kind, detail, "backend invocation failed");
            queue::set_status(store, id, Status::Failed).await?;
            // Uniform refund on every backend-rejected failure, per
            // spec.md §4.5 — this keeps invariant 3 of §8.1 decidable.
            refund_job(db, &payload).await;
            notifier.notify_failure(&payload, kind).await;
        }
    }

    Ok(())
}

async fn refund_and_unlock(
    store: &dyn KeyedStore,
    db: &sqlx::PgPool,
    notifier: &dyn Notifier,
    payload: &JobPayload,
    release_gpu: bool,
) {
    refund_job(db, payload).await;
    if release_gpu {
        gpu::release_gpu_slot(store, &payload.request_id).await.ok();
    }
    store.del(&format!("active_gen:{}", payload.user_external_id)).await.ok();
    notifier.notify_cancelled(payload).await;
}

async fn refund_job(db: &sqlx::PgPool, payload: &JobPayload) {
    if payload.is_admin {
        return;
    }
    let reference_id = payload.request_id.to_string();
    if let Err(e) = ledger::refund(db, payload.user_id, payload.cost, &reference_id).await {
        warn!(request_id = %payload.request_id, error = %e, "refund failed (may already be refunded)");
    }
}

async fn cache_last_job(store: &dyn KeyedStore, payload: &JobPayload) {
    if let Ok(json) = serde_json::to_string(payload) {
        let _ = store
            .set(&format!("last_job:{}", payload.user_external_id), &json, Some(Duration::from_secs(86_400)))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_saturated_sleep_is_shorter_than_idle_poll_times_five() {
        assert_eq!(GPU_SATURATED_SLEEP, Duration::from_secs(5));
        assert_eq!(POLL_IDLE_SLEEP, Duration::from_secs(1));
    }
}
