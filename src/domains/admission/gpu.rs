//! The GPU semaphore: a global counter (`gpu:active_jobs`) plus a per-task
//! presence marker (`gpu:job:{request_id}`) that acts as a crash-recovery
//! shield — the counter alone could never be reconciled after a crash
//! without knowing which tasks actually hold a slot.

use crate::domains::tasks::models::RequestId;
use crate::kernel::store::{KeyedStore, StoreResult};
use tracing::info;

const COUNTER_KEY: &str = "gpu:active_jobs";
const MARKER_TTL_SECS: i64 = 900;

fn marker_key(id: &RequestId) -> String {
    format!("gpu:job:{id}")
}

const ACQUIRE_SCRIPT: &str = r#"
local counter = tonumber(redis.call('GET', KEYS[1]) or '0')
local max = tonumber(ARGV[1])
if counter >= max then
  return 0
end
redis.call('INCR', KEYS[1])
redis.call('SET', KEYS[2], '1', 'EX', ARGV[2])
return 1
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 0 then
  return 0
end
redis.call('DEL', KEYS[2])
local v = redis.call('DECRBY', KEYS[1], 1)
if v <= 0 then
  redis.call('DEL', KEYS[1])
end
return 1
"#;

/// Atomic admit: if `counter < max_jobs`, increments it and sets the
/// per-task marker (TTL 15 min). Returns whether the slot was acquired.
pub async fn acquire_gpu_slot(
    store: &dyn KeyedStore,
    max_jobs: u32,
    id: &RequestId,
) -> StoreResult<bool> {
    let marker = marker_key(id);
    let n = store
        .eval_atomic(
            ACQUIRE_SCRIPT,
            &[COUNTER_KEY, &marker],
            &[&max_jobs.to_string(), &MARKER_TTL_SECS.to_string()],
        )
        .await?;
    Ok(n == 1)
}

/// Atomic release: if the marker exists, decrements the counter (never
/// below zero) and deletes the marker.
pub async fn release_gpu_slot(store: &dyn KeyedStore, id: &RequestId) -> StoreResult<()> {
    let marker = marker_key(id);
    store.eval_atomic(RELEASE_SCRIPT, &[COUNTER_KEY, &marker], &[]).await?;
    Ok(())
}

/// Scans live `gpu:job:*` markers and rebuilds the counter to the actual
/// count. Called periodically by the sweeper to recover from a crash that
/// left the counter out of sync with reality.
pub async fn sweep_stale_gpu_slots(store: &dyn KeyedStore) -> StoreResult<i64> {
    let markers = store.scan_keys("gpu:job:*").await?;
    let actual = markers.len() as i64;
    store.set(COUNTER_KEY, &actual.to_string(), None).await?;
    info!(actual_gpu_jobs = actual, "gpu counter rebuilt from live markers");
    Ok(actual)
}
