//! Sliding-window rate limiter per user per action, distinct from the
//! per-IP `tower_governor` layer on the router itself. Exposed for a
//! front-end integration to call before dispatching a command or media
//! upload; the core's own ingress (health, webhooks) does not use it.

use crate::kernel::store::KeyedStore;
use std::time::Duration;

pub const COMMAND_LIMIT: u32 = 5;
pub const COMMAND_WINDOW: Duration = Duration::from_secs(60);
pub const MEDIA_LIMIT: u32 = 2;
pub const MEDIA_WINDOW: Duration = Duration::from_secs(60);

/// Returns true if the action is allowed, incrementing the window counter
/// as a side effect. Built on the same `incr_with_ttl` primitive as every
/// other counter in the store, so the window resets on the key's TTL
/// rather than a true rolling window — acceptable for this threat model.
pub async fn check_rate_limit(
    store: &dyn KeyedStore,
    user_external_id: i64,
    action: &str,
    limit: u32,
    window: Duration,
) -> Result<bool, crate::kernel::store::StoreError> {
    let key = format!("rate:{action}:{user_external_id}");
    let count = store.incr_with_ttl(&key, window).await?;
    Ok(count <= limit as i64)
}
