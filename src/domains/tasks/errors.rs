use crate::kernel::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("task record was not valid json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("illegal status transition: {from:?} -> {to:?}")]
    IllegalTransition {
        from: crate::domains::tasks::models::Status,
        to: crate::domains::tasks::models::Status,
    },
}
