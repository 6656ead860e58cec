use super::errors::PaymentError;
use super::models::{Payment, PaymentStatus, CANONICAL_CURRENCY};
use crate::config::credit_packages;
use crate::domains::ledger::{self, Reason};
use crate::kernel::payment_provider::{PaymentProvider, ProviderPaymentStatus};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

pub struct CreatedPaymentResult {
    pub confirmation_url: String,
    pub external_id: String,
    pub credits: u32,
}

/// Create-payment: validate against the fixed package schema, call the
/// provider with a fresh idempotency key, and persist a `pending` row.
pub async fn create_payment(
    db: &PgPool,
    provider: &dyn PaymentProvider,
    user_external_id: i64,
    amount: u32,
) -> Result<CreatedPaymentResult, PaymentError> {
    let packages = credit_packages();
    let credits = *packages
        .get(&amount)
        .ok_or_else(|| PaymentError::UnknownPackage(Decimal::from(amount)))?;

    let user_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE external_id = $1")
        .bind(user_external_id)
        .fetch_optional(db)
        .await?;
    let user_id = user_id.ok_or(PaymentError::UserNotFound)?;

    let idempotency_key = Uuid::new_v4().to_string();
    let decimal_amount = Decimal::from(amount);
    let created = provider
        .create_payment(
            decimal_amount,
            CANONICAL_CURRENCY,
            &format!("Top-up: {credits} credits"),
            &idempotency_key,
        )
        .await?;

    sqlx::query(
        r#"
        INSERT INTO payments (user_id, amount, currency, credits, status, external_id)
        VALUES ($1, $2, $3, $4, 'pending', $5)
        "#,
    )
    .bind(user_id)
    .bind(decimal_amount)
    .bind(CANONICAL_CURRENCY)
    .bind(credits as i64)
    .bind(&created.external_id)
    .execute(db)
    .await?;

    info!(external_id = %created.external_id, user_external_id, amount, credits, "payment created");

    Ok(CreatedPaymentResult {
        confirmation_url: created.confirmation_url,
        external_id: created.external_id,
        credits,
    })
}

/// The fail-closed transactional core shared by the webhook, the
/// reconciler, and the user-initiated confirm path: trusts only the
/// `verified_amount`/`verified_currency` the caller obtained from a fresh
/// provider API call, never the inbound webhook body directly.
pub async fn apply_verified_payment(
    db: &PgPool,
    external_id: &str,
    verified_amount: Decimal,
    verified_currency: &str,
) -> Result<bool, PaymentError> {
    let mut tx = db.begin().await?;

    let payment: Option<Payment> =
        sqlx::query_as("SELECT * FROM payments WHERE external_id = $1 FOR UPDATE")
            .bind(external_id)
            .fetch_optional(&mut *tx)
            .await?;

    let payment = match payment {
        Some(p) => p,
        None => {
            tx.rollback().await?;
            warn!(external_id, "payment not found for verified webhook/reconcile");
            return Ok(false);
        }
    };

    if payment.status == PaymentStatus::Succeeded.as_str() {
        tx.rollback().await?;
        info!(external_id, "payment already succeeded (idempotent)");
        return Ok(true);
    }

    if verified_currency != CANONICAL_CURRENCY
        || payment.currency != CANONICAL_CURRENCY
        || verified_amount != payment.amount
    {
        tx.rollback().await?;
        warn!(
            external_id,
            verified_amount = %verified_amount,
            verified_currency,
            expected_amount = %payment.amount,
            "amount/currency mismatch, refusing to credit"
        );
        return Ok(false);
    }

    // Extra idempotency: if the ledger already has this reference id (e.g.
    // a race between webhook and reconciler), just flip status and return.
    let already_in_ledger: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM credit_ledger WHERE reason = 'payment' AND reference_id = $1",
    )
    .bind(external_id)
    .fetch_optional(&mut *tx)
    .await?;

    if already_in_ledger.is_some() {
        sqlx::query("UPDATE payments SET status = 'succeeded', paid_at = COALESCE(paid_at, now()) WHERE id = $1")
            .bind(payment.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(external_id, "payment already credited in ledger (idempotent)");
        return Ok(true);
    }

    sqlx::query("UPDATE payments SET status = 'succeeded', paid_at = now() WHERE id = $1")
        .bind(payment.id)
        .execute(&mut *tx)
        .await?;

    ledger::record_change(&mut tx, payment.user_id, payment.credits, Reason::Payment, external_id).await?;

    tx.commit().await?;
    info!(external_id, credits = payment.credits, "payment settled");
    Ok(true)
}

/// Re-verifies with the provider before trusting any webhook payload, then
/// runs the verified-then-apply flow.
pub async fn process_webhook(
    db: &PgPool,
    provider: &dyn PaymentProvider,
    external_id: &str,
) -> Result<bool, PaymentError> {
    let verified = provider.get_payment(external_id).await?;
    if verified.status != ProviderPaymentStatus::Succeeded {
        warn!(external_id, "provider re-verification did not confirm success");
        return Ok(false);
    }
    apply_verified_payment(db, external_id, verified.amount, &verified.currency).await
}

/// User-initiated "I paid" confirm: verifies ownership first, then runs the
/// same verified-then-apply flow as the webhook.
pub async fn confirm_as_user(
    db: &PgPool,
    provider: &dyn PaymentProvider,
    caller_external_user_id: i64,
    external_id: &str,
) -> Result<bool, PaymentError> {
    let owner_external_id: Option<i64> = sqlx::query_scalar(
        "SELECT u.external_id FROM payments p JOIN users u ON u.id = p.user_id WHERE p.external_id = $1",
    )
    .bind(external_id)
    .fetch_optional(db)
    .await?;

    match owner_external_id {
        Some(id) if id == caller_external_user_id => {}
        Some(_) => return Err(PaymentError::NotOwner),
        None => return Err(PaymentError::PaymentNotFound),
    }

    process_webhook(db, provider, external_id).await
}
