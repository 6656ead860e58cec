use super::errors::TaskError;
use super::models::{JobPayload, RequestId, Status};
use crate::kernel::store::KeyedStore;
use std::time::Duration;
use tracing::{info, warn};

const TASK_QUEUE_KEY: &str = "task_queue";
const TASK_RECORD_TTL: Duration = Duration::from_secs(3600);

fn task_key(id: &RequestId) -> String {
    format!("task:{id}")
}

pub(crate) fn user_queue_count_key(user_external_id: i64) -> String {
    format!("user_queue_count:{user_external_id}")
}

/// Writes the task record (status `QUEUED`, TTL 1h) and pushes the id to the
/// tail of the FIFO list. Called by admission as the final gate.
pub async fn enqueue(
    store: &dyn KeyedStore,
    payload: &JobPayload,
) -> Result<(), TaskError> {
    let json = serde_json::to_string(payload)?;
    store.set(&task_key(&payload.request_id), &json, Some(TASK_RECORD_TTL)).await?;
    store.list_push_tail(TASK_QUEUE_KEY, &payload.request_id.to_string()).await?;
    info!(request_id = %payload.request_id, "task enqueued");
    Ok(())
}

/// Pops the head of the FIFO list and reads its record. If the record has
/// expired (TTL) the entry is skipped and the next one is tried — a missing
/// payload is tolerated per the §4.4 invariant, not an error.
pub async fn dequeue(store: &dyn KeyedStore) -> Result<Option<(RequestId, JobPayload)>, TaskError> {
    loop {
        let Some(raw_id) = store.list_pop_head(TASK_QUEUE_KEY).await? else {
            return Ok(None);
        };
        let Ok(id) = raw_id.parse::<RequestId>() else {
            warn!(raw_id, "task_queue contained an unparseable id, skipping");
            continue;
        };
        match store.get(&task_key(&id)).await? {
            Some(json) => {
                let payload: JobPayload = serde_json::from_str(&json)?;
                // The task is no longer "queued-but-not-yet-popped"; drop it
                // from the per-user counter now. If the worker has to park
                // it (GPU saturated) it goes back onto the list via
                // `requeue_to_head`, which deliberately does not re-increment
                // this counter.
                store
                    .decr_never_below_zero(&user_queue_count_key(payload.user_external_id))
                    .await?;
                return Ok(Some((id, payload)));
            }
            None => {
                warn!(request_id = %id, "dequeued id had no task record, skipping");
                continue;
            }
        }
    }
}

/// Pushes a previously-dequeued task id back onto the *head* of the FIFO
/// list, for the GPU-saturation "park" case in the worker loop. Does not
/// touch the per-user queued counter — the task already left "queued" state
/// when it was first popped.
pub async fn requeue_to_head(store: &dyn KeyedStore, id: &RequestId) -> Result<(), TaskError> {
    store.list_push_head(TASK_QUEUE_KEY, &id.to_string()).await?;
    Ok(())
}

/// Reads the full current task record without mutating it.
pub async fn read_payload(store: &dyn KeyedStore, id: &RequestId) -> Result<Option<JobPayload>, TaskError> {
    match store.get(&task_key(id)).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Re-reads the current record's status without mutating it. Used at the
/// worker's two cancellation checkpoints.
pub async fn read_status(store: &dyn KeyedStore, id: &RequestId) -> Result<Option<Status>, TaskError> {
    Ok(read_payload(store, id).await?.map(|p| p.status))
}

/// Read-modify-write the task record's status, enforcing the DAG.
pub async fn set_status(
    store: &dyn KeyedStore,
    id: &RequestId,
    next: Status,
) -> Result<Option<JobPayload>, TaskError> {
    let Some(json) = store.get(&task_key(id)).await? else {
        return Ok(None);
    };
    let mut payload: JobPayload = serde_json::from_str(&json)?;

    if payload.status == next {
        return Ok(Some(payload));
    }
    if !payload.status.can_transition_to(next) {
        return Err(TaskError::IllegalTransition { from: payload.status, to: next });
    }

    payload.status = next;
    payload.status_changed_at = chrono::Utc::now();
    let json = serde_json::to_string(&payload)?;
    store.set(&task_key(id), &json, Some(TASK_RECORD_TTL)).await?;
    info!(request_id = %id, status = ?next, "task status transitioned");
    Ok(Some(payload))
}

/// Succeeds only if the current status is `QUEUED`: flips to `CANCELLED`,
/// removes the id from the FIFO list, and decrements the user's queued
/// counter.
pub async fn cancel_queued(store: &dyn KeyedStore, id: &RequestId) -> Result<bool, TaskError> {
    let Some(json) = store.get(&task_key(id)).await? else {
        return Ok(false);
    };
    let payload: JobPayload = serde_json::from_str(&json)?;
    if payload.status != Status::Queued {
        return Ok(false);
    }

    set_status(store, id, Status::Cancelled).await?;
    store.list_remove_first(TASK_QUEUE_KEY, &id.to_string()).await?;
    store.decr_never_below_zero(&user_queue_count_key(payload.user_external_id)).await?;
    info!(request_id = %id, "cancelled queued task");
    Ok(true)
}

/// Succeeds only if the current status is `PROCESSING`: flips to
/// `CANCELLED`. The worker observes this at its next checkpoint.
pub async fn cancel_processing(store: &dyn KeyedStore, id: &RequestId) -> Result<bool, TaskError> {
    let Some(json) = store.get(&task_key(id)).await? else {
        return Ok(false);
    };
    let payload: JobPayload = serde_json::from_str(&json)?;
    if payload.status != Status::Processing {
        return Ok(false);
    }

    set_status(store, id, Status::Cancelled).await?;
    info!(request_id = %id, "flagged processing task as cancelled");
    Ok(true)
}
