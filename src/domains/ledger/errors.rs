use thiserror::Error;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("user {0} not found")]
    UserNotFound(uuid::Uuid),
    #[error("ledger row already recorded for this (reason, reference_id)")]
    AlreadyRecorded,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    /// Maps a raw `sqlx::Error` to `AlreadyRecorded` if it's a unique
    /// violation on `credit_ledger`'s `(reason, reference_id)` index,
    /// leaving every other error as an opaque `Database`.
    pub fn from_insert_error(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return LedgerError::AlreadyRecorded;
            }
        }
        LedgerError::Database(err)
    }
}
