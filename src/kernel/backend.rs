//! The generation backend boundary. Concrete model clients (ComfyUI,
//! Replicate, etc.) are out of scope; the worker loop is coded only
//! against this trait.

use crate::domains::tasks::models::JobPayload;
use async_trait::async_trait;
use std::time::Duration;

/// Classification of a failed backend invocation, used to pick the
/// user-facing message and whether the job still refunds (it always does).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection-level error reaching the backend.
    Unavailable,
    /// The invocation did not complete within `timeout`.
    Timeout,
    /// The backend understood the request and declined it for a
    /// domain reason (e.g. no face detected for an animation job).
    Rejected,
    /// The backend returned a result that failed basic validation
    /// (too small, wrong content type).
    ProducedInvalid,
    /// Anything else; logged with a trace id.
    Unclassified,
}

impl FailureKind {
    /// The message shown to the end user; never includes internals.
    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::Unavailable => "service temporarily unavailable, please try again shortly",
            FailureKind::Timeout => "the job took too long, try a simpler prompt",
            FailureKind::Rejected => "the backend could not complete this request",
            FailureKind::ProducedInvalid => "the backend returned an invalid result",
            FailureKind::Unclassified => "something went wrong",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendSuccess {
    /// Out-of-band handle to the produced artifact (object store key, URL),
    /// never the raw bytes — see SPEC_FULL.md §D.
    pub result_handle: String,
}

#[derive(Debug, Clone)]
pub struct BackendFailure {
    pub kind: FailureKind,
    pub detail: String,
}

pub type BackendOutcome = Result<BackendSuccess, BackendFailure>;

/// The scarce external collaborator the worker loop invokes once per job,
/// bounded by `GENERATION_TIMEOUT` (doubled for video-class jobs).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn invoke(&self, payload: &JobPayload, timeout: Duration) -> BackendOutcome;
}
