//! Stuck-task reaper, required by `spec.md` §8.4: a task that has been
//! `PROCESSING` for longer than `GENERATION_TIMEOUT * 2` almost certainly
//! lost its worker to a crash between checkpoint A and the backend call.
//! Without this, the user keeps the debit and never sees a refund.

use crate::domains::ledger;
use crate::domains::tasks::models::{JobPayload, Status};
use crate::kernel::store::KeyedStore;
use chrono::Utc;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

/// Scans live task records and transitions any `PROCESSING` task older than
/// `stuck_after` to `FAILED`, refunding its cost. Returns the number reaped.
pub async fn sweep_stuck_tasks(
    store: &dyn KeyedStore,
    db: &PgPool,
    stuck_after: Duration,
) -> anyhow::Result<u32> {
    let keys = store.scan_keys("task:*").await?;
    let mut reaped = 0;

    for key in keys {
        if key.ends_with(":touch") || key.ends_with(":lock") {
            continue;
        }
        let Some(json) = store.get(&key).await? else {
            continue;
        };
        let Ok(payload) = serde_json::from_str::<JobPayload>(&json) else {
            continue;
        };
        if payload.status != Status::Processing {
            continue;
        }
        let age = Utc::now().signed_duration_since(payload.status_changed_at);
        if age.to_std().unwrap_or_default() < stuck_after {
            continue;
        }

        reap_one(store, db, &key, payload).await;
        reaped += 1;
    }

    if reaped > 0 {
        info!(reaped, "stuck-task reaper transitioned tasks to FAILED");
    }
    Ok(reaped)
}

async fn reap_one(store: &dyn KeyedStore, db: &PgPool, key: &str, mut payload: JobPayload) {
    payload.status = Status::Failed;
    payload.status_changed_at = Utc::now();
    if let Ok(json) = serde_json::to_string(&payload) {
        let _ = store.set(key, &json, Some(Duration::from_secs(3600))).await;
    }

    if !payload.is_admin {
        let reference_id = payload.request_id.to_string();
        if let Err(e) = ledger::refund(db, payload.user_id, payload.cost, &reference_id).await {
            warn!(request_id = %payload.request_id, error = %e, "reaper refund failed (may already be refunded)");
        }
    }

    store.del(&format!("active_gen:{}", payload.user_external_id)).await.ok();
    store.del(&format!("gpu:job:{}", payload.request_id)).await.ok();
}
