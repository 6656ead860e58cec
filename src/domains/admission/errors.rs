use crate::domains::ledger::LedgerError;
use crate::domains::tasks::TaskError;
use crate::kernel::store::StoreError;
use thiserror::Error;

/// The admission taxonomy from `spec.md` §7: `UserError` and `SystemBusy`
/// variants the caller can act on, plus an opaque internal failure.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("user already has a job in flight")]
    AlreadyActive,
    #[error("user's queued-task cap reached")]
    UserQueueFull,
    #[error("global queue is at capacity")]
    GlobalQueueFull,
    #[error("internal admission error: {0}")]
    Internal(String),
}

impl From<StoreError> for AdmissionError {
    fn from(e: StoreError) -> Self {
        AdmissionError::Internal(e.to_string())
    }
}

impl From<LedgerError> for AdmissionError {
    fn from(e: LedgerError) -> Self {
        AdmissionError::Internal(e.to_string())
    }
}

impl From<TaskError> for AdmissionError {
    fn from(e: TaskError) -> Self {
        AdmissionError::Internal(e.to_string())
    }
}
