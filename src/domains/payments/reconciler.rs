//! Periodic reconciliation for payments whose webhook notification never
//! arrived. The provider is the source of truth, so no durable scheduler
//! is required — this only needs to run while the process is alive.

use super::service::process_webhook;
use crate::kernel::payment_provider::PaymentProvider;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

const STALE_AFTER_MINUTES: i64 = 10;
const RECONCILE_BATCH_SIZE: i64 = 25;

/// Selects up to `RECONCILE_BATCH_SIZE` pending payments older than 10
/// minutes and re-verifies each with the provider, crediting any that have
/// actually succeeded. Returns the number settled.
pub async fn reconcile_once(db: &PgPool, provider: &dyn PaymentProvider) -> anyhow::Result<u32> {
    let cutoff = Utc::now() - ChronoDuration::minutes(STALE_AFTER_MINUTES);

    let stale_ids: Vec<String> = sqlx::query_scalar(
        "SELECT external_id FROM payments WHERE status = 'pending' AND created_at < $1 ORDER BY created_at ASC LIMIT $2",
    )
    .bind(cutoff)
    .bind(RECONCILE_BATCH_SIZE)
    .fetch_all(db)
    .await?;

    let mut settled = 0;
    for external_id in &stale_ids {
        match process_webhook(db, provider, external_id).await {
            Ok(true) => {
                settled += 1;
                info!(external_id, "reconciler settled stale pending payment");
            }
            Ok(false) => {}
            Err(e) => warn!(external_id, error = %e, "reconciler failed to verify payment"),
        }
    }

    if !stale_ids.is_empty() {
        info!(checked = stale_ids.len(), settled, "reconciliation pass complete");
    }
    Ok(settled)
}

/// Default interval between reconciliation passes.
pub const DEFAULT_INTERVAL_SECS: u64 = 300;
