use super::errors::AdmissionError;
use crate::domains::ledger::{self, DeductOutcome, Reason};
use crate::domains::tasks::models::{JobPayload, JobRequest, Status};
use crate::domains::tasks::queue::{self, user_queue_count_key};
use crate::kernel::store::KeyedStore;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

/// Successful admission result: the queue position ahead of this job at the
/// moment it was enqueued (approximate — `list_len` read before push).
#[derive(Debug, Clone, Copy)]
pub struct AdmissionOutcome {
    pub position_ahead: i64,
}

/// Per-gate configuration the admission controller enforces. Kept as a
/// small struct rather than threading every field through so call sites
/// read as "admit against these limits" rather than a five-argument call.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionLimits {
    pub max_queued_tasks_per_user: u32,
    pub max_global_queue_size: u32,
    pub active_lock_ttl: Duration,
}

/// Runs the four gates in order — **charge -> active-lock -> per-user queue
/// slot -> global queue slot** — unwinding everything already acquired if a
/// later gate fails. See `spec.md` §4.3.
pub async fn admit(
    pool: &PgPool,
    store: &dyn KeyedStore,
    limits: AdmissionLimits,
    request: JobRequest,
) -> Result<AdmissionOutcome, AdmissionError> {
    let user_ref = request.request_id.to_string();

    // --- Gate 1: charge ---
    if !request.is_admin {
        match ledger::deduct_idempotent(pool, request.user_id, request.cost, Reason::Generation, &user_ref)
            .await?
        {
            DeductOutcome::Deducted | DeductOutcome::AlreadyDeducted => {}
            DeductOutcome::InsufficientBalance => {
                return Err(AdmissionError::InsufficientBalance);
            }
        }
    }

    // --- Gate 2: active lock ---
    let active_lock_key = format!("active_gen:{}", request.user_external_id);
    let acquired_lock = store
        .set_if_absent(&active_lock_key, &request.request_id.to_string(), limits.active_lock_ttl)
        .await?;
    if !acquired_lock {
        unwind_charge(pool, &request, &user_ref).await;
        return Err(AdmissionError::AlreadyActive);
    }

    // --- Gate 3: per-user queued slot ---
    let queue_count_key = user_queue_count_key(request.user_external_id);
    let queued_count = store
        .incr_with_ttl(&queue_count_key, Duration::from_secs(3600))
        .await?;
    if queued_count > limits.max_queued_tasks_per_user as i64 {
        store.decr_never_below_zero(&queue_count_key).await.ok();
        store.del(&active_lock_key).await.ok();
        unwind_charge(pool, &request, &user_ref).await;
        return Err(AdmissionError::UserQueueFull);
    }

    // --- Gate 4: global cap + enqueue ---
    let position_ahead = store.list_len("task_queue").await?;
    if position_ahead >= limits.max_global_queue_size as i64 {
        store.decr_never_below_zero(&queue_count_key).await.ok();
        store.del(&active_lock_key).await.ok();
        unwind_charge(pool, &request, &user_ref).await;
        return Err(AdmissionError::GlobalQueueFull);
    }

    let payload = JobPayload {
        request_id: request.request_id,
        user_external_id: request.user_external_id,
        user_id: request.user_id,
        kind: request.kind,
        cost: request.cost,
        is_admin: request.is_admin,
        chat_target_id: request.chat_target_id,
        status: Status::Queued,
        status_changed_at: chrono::Utc::now(),
    };
    queue::enqueue(store, &payload).await?;

    info!(
        request_id = %payload.request_id,
        user_external_id = payload.user_external_id,
        kind = payload.kind.label(),
        position_ahead,
        "job admitted"
    );

    Ok(AdmissionOutcome { position_ahead })
}

async fn unwind_charge(pool: &PgPool, request: &JobRequest, reference_id: &str) {
    if request.is_admin {
        return;
    }
    if let Err(e) = ledger::refund(pool, request.user_id, request.cost, reference_id).await {
        warn!(request_id = %request.request_id, error = %e, "failed to unwind charge during admission rejection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_plain_copy_data() {
        let limits = AdmissionLimits {
            max_queued_tasks_per_user: 3,
            max_global_queue_size: 500,
            active_lock_ttl: Duration::from_secs(300),
        };
        let copy = limits;
        assert_eq!(copy.max_queued_tasks_per_user, 3);
    }
}
