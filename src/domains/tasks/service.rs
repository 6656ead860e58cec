//! User-requested cancel: tries `queue::cancel_queued` first and, unlike
//! that primitive, settles the side effects admission acquired for the
//! job — refund, active-lock release, notify — synchronously, since a
//! still-queued job was never picked up by a worker to settle them later.
//! Falls back to `queue::cancel_processing`, whose side effects
//! `worker::run_loop`'s own checkpoints settle once it observes the flag.
//! See `spec.md`'s cancellation semantics (S3 vs S4).

use super::models::RequestId;
use super::queue;
use crate::domains::ledger;
use crate::kernel::notify::Notifier;
use crate::kernel::store::KeyedStore;
use sqlx::PgPool;
use tracing::warn;

pub async fn cancel_and_settle(
    store: &dyn KeyedStore,
    db: &PgPool,
    notifier: &dyn Notifier,
    id: &RequestId,
) -> anyhow::Result<bool> {
    let Some(payload) = queue::read_payload(store, id).await? else {
        return Ok(false);
    };

    if queue::cancel_queued(store, id).await? {
        if !payload.is_admin {
            let reference_id = payload.request_id.to_string();
            if let Err(e) = ledger::refund(db, payload.user_id, payload.cost, &reference_id).await {
                warn!(request_id = %payload.request_id, error = %e, "cancel refund failed (may already be refunded)");
            }
        }
        store.del(&format!("active_gen:{}", payload.user_external_id)).await.ok();
        notifier.notify_cancelled(&payload).await;
        return Ok(true);
    }

    Ok(queue::cancel_processing(store, id).await?)
}
