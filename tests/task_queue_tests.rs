mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::TestHarness;
use std::sync::Mutex;
use std::time::Duration;
use taskforge_core::domains::admission::service::{admit, AdmissionLimits};
use taskforge_core::domains::tasks::models::{JobKind, JobPayload, JobRequest, RequestId, Status};
use taskforge_core::domains::tasks::{cancel_and_settle, queue};
use taskforge_core::kernel::backend::{BackendSuccess, FailureKind};
use taskforge_core::kernel::notify::{NullNotifier, Notifier};
use test_context::test_context;

fn payload(user_external_id: i64) -> JobPayload {
    JobPayload {
        request_id: RequestId::new(),
        user_external_id,
        user_id: uuid::Uuid::new_v4(),
        kind: JobKind::GenerateImage { prompt: "a dog".to_string() },
        cost: 10,
        is_admin: false,
        chat_target_id: user_external_id,
        status: Status::Queued,
        status_changed_at: Utc::now(),
    }
}

fn default_limits() -> AdmissionLimits {
    AdmissionLimits {
        max_queued_tasks_per_user: 2,
        max_global_queue_size: 500,
        active_lock_ttl: Duration::from_secs(300),
    }
}

/// Records every call so tests can assert the user was actually notified,
/// without needing a real chat front-end.
#[derive(Default)]
struct RecordingNotifier {
    cancelled: Mutex<Vec<RequestId>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_success(&self, _payload: &JobPayload, _result: &BackendSuccess) {}
    async fn notify_failure(&self, _payload: &JobPayload, _kind: FailureKind) {}
    async fn notify_cancelled(&self, payload: &JobPayload) {
        self.cancelled.lock().unwrap().push(payload.request_id);
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn enqueue_dequeue_is_fifo_and_decrements_the_user_counter(ctx: &TestHarness) {
    let store = ctx.store.as_ref();
    let p1 = payload(920_001);
    let p2 = payload(920_001);

    queue::enqueue(store, &p1).await.unwrap();
    store.incr_with_ttl(&format!("user_queue_count:{}", 920_001), std::time::Duration::from_secs(60)).await.unwrap();
    queue::enqueue(store, &p2).await.unwrap();
    store.incr_with_ttl(&format!("user_queue_count:{}", 920_001), std::time::Duration::from_secs(60)).await.unwrap();

    let (first_id, _) = queue::dequeue(store).await.unwrap().unwrap();
    assert_eq!(first_id, p1.request_id, "dequeue must return jobs in enqueue order");

    let count: Option<String> = store.get(&format!("user_queue_count:{}", 920_001)).await.unwrap();
    assert_eq!(count, Some("1".to_string()), "dequeue must decrement the per-user queued counter");

    let (second_id, _) = queue::dequeue(store).await.unwrap().unwrap();
    assert_eq!(second_id, p2.request_id);

    assert!(queue::dequeue(store).await.unwrap().is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn requeue_to_head_does_not_touch_the_user_counter(ctx: &TestHarness) {
    let store = ctx.store.as_ref();
    let p = payload(920_002);
    queue::enqueue(store, &p).await.unwrap();
    store.incr_with_ttl(&format!("user_queue_count:{}", 920_002), std::time::Duration::from_secs(60)).await.unwrap();

    let (id, _) = queue::dequeue(store).await.unwrap().unwrap();
    let count_after_dequeue: Option<String> = store.get(&format!("user_queue_count:{}", 920_002)).await.unwrap();
    assert_eq!(count_after_dequeue, None, "decr_never_below_zero deletes the key once it reaches zero");

    queue::requeue_to_head(store, &id).await.unwrap();
    let count_after_requeue: Option<String> = store.get(&format!("user_queue_count:{}", 920_002)).await.unwrap();
    assert_eq!(count_after_requeue, None, "requeue_to_head must not re-increment the counter");

    let (requeued_id, _) = queue::dequeue(store).await.unwrap().unwrap();
    assert_eq!(requeued_id, id);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn set_status_enforces_the_transition_dag(ctx: &TestHarness) {
    let store = ctx.store.as_ref();
    let p = payload(920_003);
    queue::enqueue(store, &p).await.unwrap();

    queue::set_status(store, &p.request_id, Status::Processing).await.unwrap();
    let illegal = queue::set_status(store, &p.request_id, Status::Queued).await;
    assert!(illegal.is_err(), "PROCESSING -> QUEUED is not a legal transition");

    queue::set_status(store, &p.request_id, Status::Completed).await.unwrap();
    let status = queue::read_status(store, &p.request_id).await.unwrap();
    assert_eq!(status, Some(Status::Completed));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancelling_a_queued_task_refunds_unlocks_and_notifies(ctx: &TestHarness) {
    let user = ctx.user_with_balance(920_004, 100).await.unwrap();
    let notifier = RecordingNotifier::default();

    let req = JobRequest {
        user_external_id: 920_004,
        user_id: user.id,
        request_id: RequestId::new(),
        kind: JobKind::GenerateImage { prompt: "a dog".to_string() },
        cost: 30,
        is_admin: false,
        chat_target_id: 920_004,
    };
    admit(&ctx.db_pool, ctx.store.as_ref(), default_limits(), req.clone())
        .await
        .unwrap();

    let balance_after_admit: i64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(balance_after_admit, 70);

    let cancelled = cancel_and_settle(ctx.store.as_ref(), &ctx.db_pool, &notifier, &req.request_id)
        .await
        .unwrap();
    assert!(cancelled);

    let status = queue::read_status(ctx.store.as_ref(), &req.request_id).await.unwrap();
    assert_eq!(status, Some(Status::Cancelled));

    // Already removed from the FIFO list, so a dequeue never observes it.
    assert!(queue::dequeue(ctx.store.as_ref()).await.unwrap().is_none());

    let balance_after_cancel: i64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(balance_after_cancel, 100, "a queued cancel must refund synchronously");

    assert!(
        !ctx.store.exists(&format!("active_gen:{}", 920_004)).await.unwrap(),
        "a queued cancel must release the active-generation lock"
    );

    assert_eq!(
        notifier.cancelled.lock().unwrap().as_slice(),
        &[req.request_id],
        "the user must be notified of the cancellation"
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_is_a_noop_on_an_already_terminal_task(ctx: &TestHarness) {
    let store = ctx.store.as_ref();
    let p = payload(920_005);
    queue::enqueue(store, &p).await.unwrap();
    queue::set_status(store, &p.request_id, Status::Processing).await.unwrap();
    queue::set_status(store, &p.request_id, Status::Completed).await.unwrap();

    let cancelled = cancel_and_settle(store, &ctx.db_pool, &NullNotifier, &p.request_id)
        .await
        .unwrap();
    assert!(!cancelled);
    assert_eq!(queue::read_status(store, &p.request_id).await.unwrap(), Some(Status::Completed));
}
