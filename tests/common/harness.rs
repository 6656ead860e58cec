//! Test harness with testcontainers for integration testing.
//!
//! Containers and migrations are started once and reused across all tests
//! in the binary; each test gets its own pool/store handle and its own
//! fixture rows.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use taskforge_core::domains::users::models::User;
use taskforge_core::domains::users::repository::UserRepository;
use taskforge_core::kernel::store::{KeyedStore, RedisStore};
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

struct SharedTestInfra {
    db_url: String,
    redis_url: String,
    _postgres: ContainerAsync<GenericImage>,
    _redis: ContainerAsync<Redis>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = GenericImage::new("postgres", "16")
            .with_wait_for(testcontainers::core::WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_exposed_port(testcontainers::core::ContainerPort::Tcp(5432))
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_DB", "postgres")
            .start()
            .await
            .context("failed to start postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{pg_host}:{pg_port}/postgres");

        let redis = Redis::default()
            .start()
            .await
            .context("failed to start redis container")?;
        let redis_host = redis.get_host().await?;
        let redis_port = redis.get_host_port_ipv4(6379).await?;
        let redis_url = format!("redis://{redis_host}:{redis_port}");

        let pool = PgPool::connect(&db_url)
            .await
            .context("failed to connect to postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        pool.close().await;

        Ok(Self {
            db_url,
            redis_url,
            _postgres: postgres,
            _redis: redis,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async { Self::init().await.expect("failed to start shared test infra") })
            .await
    }
}

/// Per-test handle: a fresh pool and keyed-store connection against the
/// shared containers, plus fixture helpers.
pub struct TestHarness {
    pub db_pool: PgPool,
    pub store: Arc<dyn KeyedStore>,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("failed to connect to test database")?;
        let store = RedisStore::connect(&infra.redis_url)
            .await
            .context("failed to connect to test redis")?;

        Ok(Self {
            db_pool,
            store: Arc::new(store),
        })
    }

    /// Creates (or fetches) a user with the given external id and balance.
    pub async fn user_with_balance(&self, external_id: i64, balance: i64) -> Result<User> {
        let repo = UserRepository::new(&self.db_pool);
        let user = repo.find_or_create(external_id, None, None).await?;
        sqlx::query("UPDATE users SET balance = $2 WHERE id = $1")
            .bind(user.id)
            .bind(balance)
            .execute(&self.db_pool)
            .await?;
        repo.find_by_external_id(external_id)
            .await?
            .context("user vanished immediately after creation")
    }

    /// Clears every key this crate writes, so tests don't leak state into
    /// each other via the shared Redis container.
    pub async fn flush_store(&self) -> Result<()> {
        for pattern in ["task:*", "task_queue", "user_queue_count:*", "active_gen:*", "gpu:*", "last_job:*", "cache:*"] {
            for key in self.store.scan_keys(pattern).await? {
                self.store.del(&key).await?;
            }
            // task_queue is a list, not matched by scan_keys' key-glob on its
            // own name unless present as a real key; del is a no-op if absent.
            let _ = self.store.del(pattern).await;
        }
        Ok(())
    }
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        let harness = Self::new().await.expect("failed to create test harness");
        harness.flush_store().await.expect("failed to flush store before test");
        harness
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}
