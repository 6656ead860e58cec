mod common;

use common::TestHarness;
use taskforge_core::domains::ledger::{self, DeductOutcome, Reason};
use test_context::test_context;

#[test_context(TestHarness)]
#[tokio::test]
async fn deduct_idempotent_charges_once_per_reference_id(ctx: &TestHarness) {
    let user = ctx.user_with_balance(900_001, 100).await.unwrap();

    let first = ledger::deduct_idempotent(&ctx.db_pool, user.id, 40, Reason::Generation, "req-1")
        .await
        .unwrap();
    assert_eq!(first, DeductOutcome::Deducted);

    let second = ledger::deduct_idempotent(&ctx.db_pool, user.id, 40, Reason::Generation, "req-1")
        .await
        .unwrap();
    assert_eq!(second, DeductOutcome::AlreadyDeducted);

    let balance: i64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(balance, 60, "a retried charge must not be applied twice");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn deduct_idempotent_refuses_insufficient_balance(ctx: &TestHarness) {
    let user = ctx.user_with_balance(900_002, 10).await.unwrap();

    let outcome = ledger::deduct_idempotent(&ctx.db_pool, user.id, 50, Reason::Generation, "req-2")
        .await
        .unwrap();
    assert_eq!(outcome, DeductOutcome::InsufficientBalance);

    let balance: i64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(balance, 10, "a rejected charge must not touch the balance");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn refund_credits_back_and_is_idempotent(ctx: &TestHarness) {
    let user = ctx.user_with_balance(900_003, 100).await.unwrap();

    ledger::deduct_idempotent(&ctx.db_pool, user.id, 30, Reason::Generation, "req-3")
        .await
        .unwrap();

    ledger::refund(&ctx.db_pool, user.id, 30, "req-3").await.unwrap();
    // A second refund against the same original reference id must be
    // blocked by the storage-level (reason, reference_id) uniqueness.
    let second = ledger::refund(&ctx.db_pool, user.id, 30, "req-3").await;
    assert!(second.is_err(), "double refund must be rejected");

    let balance: i64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(balance, 100);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn concurrent_deducts_for_the_same_user_never_overdraw(ctx: &TestHarness) {
    let user = ctx.user_with_balance(900_004, 100).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..5 {
        let pool = ctx.db_pool.clone();
        let user_id = user.id;
        handles.push(tokio::spawn(async move {
            ledger::deduct_idempotent(&pool, user_id, 30, Reason::Generation, &format!("race-{i}"))
                .await
                .unwrap()
        }));
    }

    let mut deducted = 0;
    for h in handles {
        if h.await.unwrap() == DeductOutcome::Deducted {
            deducted += 1;
        }
    }

    let balance: i64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(balance, 100 - deducted * 30, "balance must track exactly the charges that succeeded");
    assert!(balance >= 0, "row-level locking must prevent the balance from going negative");
}
