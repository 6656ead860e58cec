pub mod errors;
pub mod models;
pub mod service;

pub use errors::LedgerError;
pub use models::{LedgerEntry, Reason};
pub use service::{deduct_idempotent, record_change, refund, DeductOutcome};
