//! Central dependency container. Lifts the module-level singletons the
//! original implementation relied on (store handle, backend client) into
//! one explicit struct constructed at startup, with the external
//! collaborators behind trait objects for testability.

use crate::config::Config;
use crate::kernel::admin::AdminAuthority;
use crate::kernel::backend::GenerationBackend;
use crate::kernel::notify::Notifier;
use crate::kernel::payment_provider::PaymentProvider;
use crate::kernel::store::KeyedStore;
use sqlx::PgPool;
use std::sync::Arc;

/// Everything a domain service needs, constructed once at process start
/// and cloned (cheaply, via `Arc`) into every request/worker-loop context.
#[derive(Clone)]
pub struct Services {
    pub db: PgPool,
    pub store: Arc<dyn KeyedStore>,
    pub backend: Arc<dyn GenerationBackend>,
    pub notifier: Arc<dyn Notifier>,
    pub payment_provider: Option<Arc<dyn PaymentProvider>>,
    pub admin_authority: Arc<dyn AdminAuthority>,
    pub config: Arc<Config>,
}

impl Services {
    pub fn payments_enabled(&self) -> bool {
        self.payment_provider.is_some() && self.config.payments_enabled()
    }
}
