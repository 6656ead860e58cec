//! Maps a backend invocation outcome (including a local timeout guard) to
//! the failure classification passed to `notify_failure`.

use crate::kernel::backend::{BackendOutcome, BackendSuccess, FailureKind, GenerationBackend};
use crate::domains::tasks::models::JobPayload;
use std::time::Duration;

/// Invokes the backend under a local timeout guard, in addition to
/// whatever internal deadline the backend itself enforces — belt and
/// suspenders against a backend that ignores its own `timeout` argument.
pub async fn invoke_with_timeout(
    backend: &dyn GenerationBackend,
    payload: &JobPayload,
    timeout: Duration,
) -> Result<BackendSuccess, (FailureKind, String)> {
    match tokio::time::timeout(timeout, backend.invoke(payload, timeout)).await {
        Ok(outcome) => classify_outcome(outcome),
        Err(_) => Err((FailureKind::Timeout, "backend invocation deadline exceeded".to_string())),
    }
}

fn classify_outcome(outcome: BackendOutcome) -> Result<BackendSuccess, (FailureKind, String)> {
    match outcome {
        Ok(success) => Ok(success),
        Err(failure) => Err((failure.kind, failure.detail)),
    }
}

/// `GENERATION_TIMEOUT` is doubled for video-class jobs per `spec.md` §5.
pub fn effective_timeout(base: Duration, is_video_class: bool) -> Duration {
    if is_video_class {
        base * 2
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_class_doubles_timeout() {
        let base = Duration::from_secs(200);
        assert_eq!(effective_timeout(base, false), Duration::from_secs(200));
        assert_eq!(effective_timeout(base, true), Duration::from_secs(400));
    }
}
