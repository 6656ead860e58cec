//! Periodic background tasks: GPU-counter/stuck-task sweeping and, when
//! payments are enabled, the payment reconciler. Each tick dispatches into
//! the domain service functions directly rather than doing work here.

use crate::domains::admission::gpu::sweep_stale_gpu_slots;
use crate::domains::payments::reconciler::reconcile_once;
use crate::domains::worker::reaper::sweep_stuck_tasks;
use crate::kernel::deps::Services;
use anyhow::Result;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::error;

/// Stuck tasks are reaped once they've been `PROCESSING` longer than
/// `GENERATION_TIMEOUT * 2`, per `spec.md` §8.4.
fn stuck_after(services: &Services) -> Duration {
    Duration::from_secs(services.config.generation_timeout_secs * 2)
}

pub async fn start_scheduler(services: Services) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sweep_services = services.clone();
    let sweep_job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let services = sweep_services.clone();
        Box::pin(async move {
            if let Err(e) = sweep_stale_gpu_slots(services.store.as_ref()).await {
                error!(error = %e, "gpu sweeper failed");
            }
            if let Err(e) =
                sweep_stuck_tasks(services.store.as_ref(), &services.db, stuck_after(&services)).await
            {
                error!(error = %e, "stuck-task reaper failed");
            }
        })
    })?;
    scheduler.add(sweep_job).await?;

    if services.payments_enabled() {
        let reconcile_services = services.clone();
        let reconcile_job = Job::new_async("0 */5 * * * *", move |_uuid, _lock| {
            let services = reconcile_services.clone();
            Box::pin(async move {
                let Some(provider) = services.payment_provider.as_deref() else {
                    return;
                };
                if let Err(e) = reconcile_once(&services.db, provider).await {
                    error!(error = %e, "payment reconciler failed");
                }
            })
        })?;
        scheduler.add(reconcile_job).await?;
    }

    scheduler.start().await?;
    Ok(scheduler)
}
