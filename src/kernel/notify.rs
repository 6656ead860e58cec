//! The user-delivery boundary. The chat front-end's actual send mechanism
//! is out of scope; the core calls only this trait, best-effort.

use crate::domains::tasks::models::JobPayload;
use crate::kernel::backend::{BackendSuccess, FailureKind};
use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_success(&self, payload: &JobPayload, result: &BackendSuccess);
    async fn notify_failure(&self, payload: &JobPayload, kind: FailureKind);
    async fn notify_cancelled(&self, payload: &JobPayload);
}

/// No-op notifier, useful for worker instances running without a
/// configured front-end delivery channel (e.g. admin tooling tests).
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_success(&self, _payload: &JobPayload, _result: &BackendSuccess) {}
    async fn notify_failure(&self, _payload: &JobPayload, _kind: FailureKind) {}
    async fn notify_cancelled(&self, _payload: &JobPayload) {}
}
