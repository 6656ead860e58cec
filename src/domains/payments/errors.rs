use crate::domains::ledger::LedgerError;
use crate::kernel::payment_provider::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payments are not configured")]
    NotConfigured,
    #[error("amount {0} does not match any configured credit package")]
    UnknownPackage(rust_decimal::Decimal),
    #[error("user not found")]
    UserNotFound,
    #[error("payment not found")]
    PaymentNotFound,
    #[error("caller does not own this payment")]
    NotOwner,
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
