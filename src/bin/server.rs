//! HTTP ingress process: health check, Telegram/YooKassa webhook
//! receivers, and the periodic sweeper/reconciler scheduler. The worker
//! loop that drains the task queue lives in `taskforge-worker`.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use taskforge_core::config::Config;
use taskforge_core::kernel::admin::StaticAdminList;
use taskforge_core::kernel::deps::Services;
use taskforge_core::kernel::notify::NullNotifier;
use taskforge_core::kernel::payment_provider::YooKassaClient;
use taskforge_core::kernel::scheduler::start_scheduler;
use taskforge_core::kernel::store::RedisStore;
use taskforge_core::server::{build_app, AppState};
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

    tracing::info!("starting taskforge-server");

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("failed to connect to redis")?;

    let payment_provider: Option<Arc<dyn taskforge_core::kernel::payment_provider::PaymentProvider>> =
        if config.payments_enabled() {
            Some(Arc::new(YooKassaClient::new(
                config.yookassa_shop_id.clone().unwrap(),
                config.yookassa_secret_key.clone().unwrap(),
            )))
        } else {
            tracing::warn!("yookassa credentials not configured, payments disabled");
            None
        };

    let admin_authority = Arc::new(StaticAdminList::new(config.admin_ids.clone()));
    let config = Arc::new(config);

    let services = Services {
        db: pool,
        store: Arc::new(store),
        backend: Arc::new(NoopBackend),
        notifier: Arc::new(NullNotifier),
        payment_provider,
        admin_authority,
        config: config.clone(),
    };

    let _scheduler = start_scheduler(services.clone())
        .await
        .context("failed to start scheduler")?;

    let app = build_app(AppState { services });

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// The HTTP ingress process never invokes the generation backend directly
/// (that happens in the worker loop); this satisfies `Services`'s field
/// without pulling in a concrete backend dependency here.
struct NoopBackend;

#[async_trait::async_trait]
impl taskforge_core::kernel::backend::GenerationBackend for NoopBackend {
    async fn invoke(
        &self,
        _payload: &taskforge_core::domains::tasks::models::JobPayload,
        _timeout: std::time::Duration,
    ) -> taskforge_core::kernel::backend::BackendOutcome {
        Err(taskforge_core::kernel::backend::BackendFailure {
            kind: taskforge_core::kernel::backend::FailureKind::Unavailable,
            detail: "the ingress process does not invoke the generation backend".to_string(),
        })
    }
}
