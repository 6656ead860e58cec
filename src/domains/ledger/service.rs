use super::errors::LedgerError;
use super::models::{refund_reference_id, LedgerEntry, Reason};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

/// Atomically updates `users.balance` and appends a ledger row with the
/// computed `balance_after`, inside the caller's open transaction. Fails
/// with `LedgerError::AlreadyRecorded` if `(reason, reference_id)` already
/// exists — the caller decides whether that means "already applied, treat
/// as success".
pub async fn record_change(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: i64,
    reason: Reason,
    reference_id: &str,
) -> Result<LedgerEntry, LedgerError> {
    let new_balance: i64 = sqlx::query_scalar(
        "UPDATE users SET balance = balance + $2 WHERE id = $1 RETURNING balance",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(LedgerError::UserNotFound(user_id))?;

    let entry: LedgerEntry = sqlx::query_as(
        r#"
        INSERT INTO credit_ledger (user_id, amount, reason, reference_id, balance_after)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(reason.as_str())
    .bind(reference_id)
    .bind(new_balance)
    .fetch_one(&mut **tx)
    .await
    .map_err(LedgerError::from_insert_error)?;

    info!(
        user_id = %user_id,
        amount,
        reason = reason.as_str(),
        reference_id,
        balance_after = new_balance,
        "ledger entry recorded"
    );

    Ok(entry)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductOutcome {
    Deducted,
    AlreadyDeducted,
    InsufficientBalance,
}

/// The primary charge path. See `spec.md` §4.2 for the exact protocol this
/// implements: idempotency check first, then a row-locked balance read,
/// then the atomic debit.
pub async fn deduct_idempotent(
    pool: &PgPool,
    user_id: Uuid,
    amount: i64,
    reason: Reason,
    reference_id: &str,
) -> Result<DeductOutcome, LedgerError> {
    let mut tx = pool.begin().await?;

    let existing: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM credit_ledger WHERE reference_id = $1 AND amount < 0",
    )
    .bind(reference_id)
    .fetch_optional(&mut *tx)
    .await?;

    if existing.is_some() {
        tx.rollback().await?;
        info!(reference_id, "deduction already recorded, treating as success");
        return Ok(DeductOutcome::AlreadyDeducted);
    }

    let balance: Option<i64> = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

    let balance = match balance {
        Some(b) => b,
        None => {
            tx.rollback().await?;
            return Err(LedgerError::UserNotFound(user_id));
        }
    };

    if balance < amount {
        tx.rollback().await?;
        return Ok(DeductOutcome::InsufficientBalance);
    }

    match record_change(&mut tx, user_id, -amount, reason, reference_id).await {
        Ok(_) => {
            tx.commit().await?;
            Ok(DeductOutcome::Deducted)
        }
        // Lost a race against another transaction that inserted the same
        // (reason, reference_id) between our pre-check above and this
        // insert — the other side's debit stands, so this is a success too.
        Err(LedgerError::AlreadyRecorded) => {
            tx.rollback().await?;
            info!(reference_id, "deduction already recorded (lost race), treating as success");
            Ok(DeductOutcome::AlreadyDeducted)
        }
        Err(e) => Err(e),
    }
}

/// Appends a `(reason=refund, reference_id="refund_{original}")` row.
/// Double-refund is blocked by the unique `(reason, reference_id)`
/// constraint at the storage level; callers that race on this will see
/// exactly one side win and the loser gets back `LedgerError::AlreadyRecorded`,
/// which they should treat as "already refunded".
pub async fn refund(
    pool: &PgPool,
    user_id: Uuid,
    amount: i64,
    original_reference_id: &str,
) -> Result<LedgerEntry, LedgerError> {
    let mut tx = pool.begin().await?;
    let reference_id = refund_reference_id(original_reference_id);
    let entry = record_change(&mut tx, user_id, amount, Reason::Refund, &reference_id).await?;
    tx.commit().await?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_reference_id_is_prefixed() {
        assert_eq!(refund_reference_id("r1"), "refund_r1");
    }
}
