use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Reason a ledger row was written; fixed set per the data model. Persisted
/// as plain `text`, not a Postgres enum type, to keep the migration simple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Payment,
    Generation,
    Refund,
    Referral,
    Welcome,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::Payment => "payment",
            Reason::Generation => "generation",
            Reason::Refund => "refund",
            Reason::Referral => "referral",
            Reason::Welcome => "welcome",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable row in the append-only credit journal. `(reason,
/// reference_id)` is the sole idempotency guard — see service::record_change.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub reason: String,
    pub reference_id: String,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Builds the refund counterpart reference id for an original reference id,
/// per `spec.md` §4.2 (`refund_{original}`).
pub fn refund_reference_id(original_reference_id: &str) -> String {
    format!("refund_{original_reference_id}")
}
