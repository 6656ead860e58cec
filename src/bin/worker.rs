//! Worker process: drains the task queue and drives jobs through the
//! generation backend. The HTTP ingress (webhooks, scheduler) lives in
//! `taskforge-server`; this binary owns only the dispatch loop.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use taskforge_core::config::Config;
use taskforge_core::domains::tasks::models::JobPayload;
use taskforge_core::domains::worker::{run, WorkerConfig};
use taskforge_core::kernel::backend::{BackendFailure, BackendOutcome, FailureKind, GenerationBackend};
use taskforge_core::kernel::notify::NullNotifier;
use taskforge_core::kernel::store::RedisStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,taskforge_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting taskforge-worker");

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("failed to connect to redis")?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        signal_token.cancel();
    });

    let worker_config = WorkerConfig {
        max_gpu_jobs: config.max_gpu_jobs,
        generation_timeout: Duration::from_secs(config.generation_timeout_secs),
    };

    run(
        &store,
        &pool,
        &DemoBackend::default(),
        &NullNotifier,
        worker_config,
        shutdown,
    )
    .await;

    tracing::info!("worker loop exited");
    Ok(())
}

/// Placeholder generation backend: no concrete model client is part of this
/// core (see `SPEC_FULL.md` §D), so this stands in only to make the worker
/// binary runnable. Real deployments supply their own `GenerationBackend`
/// and wire it in place of this type.
#[derive(Default)]
struct DemoBackend;

#[async_trait]
impl GenerationBackend for DemoBackend {
    async fn invoke(&self, payload: &JobPayload, _timeout: Duration) -> BackendOutcome {
        tracing::warn!(
            request_id = %payload.request_id,
            kind = payload.kind.label(),
            "DemoBackend does not perform real generation; rejecting job"
        );
        Err(BackendFailure {
            kind: FailureKind::Unavailable,
            detail: "no concrete generation backend is configured".to_string(),
        })
    }
}
