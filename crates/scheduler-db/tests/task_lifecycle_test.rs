//! Integration tests for task enqueue, claiming, and status transitions.

use scheduler_db::models::TaskStatus;
use scheduler_db::picker::{StandardPicker, TaskPicker};
use scheduler_db::queries::tasks;
use scheduler_test_utils::{create_test_db, drop_test_db};

#[tokio::test]
async fn enqueue_and_claim_roundtrip() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, "ticket-1", "builtin.noop", "{}", 0, 3, None)
        .await
        .expect("insert should succeed");
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.attempt, 0);

    let mut tx = pool.begin().await.expect("begin tx");
    let picker = StandardPicker;
    let claimed_id = picker
        .lock_one_pending_id(&mut tx)
        .await
        .expect("pick should succeed")
        .expect("one pending task should be available");
    assert_eq!(claimed_id, task.id);

    let claimed = picker
        .mark_running(&mut tx, claimed_id, "worker-1")
        .await
        .expect("mark_running should succeed");
    tx.commit().await.expect("commit");

    assert_eq!(claimed.status, TaskStatus::Running);
    assert_eq!(claimed.attempt, 1);
    assert_eq!(claimed.owner.as_deref(), Some("worker-1"));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn claim_skips_not_before_future_tasks() {
    let (pool, db_name) = create_test_db().await;

    let far_future = chrono::Utc::now() + chrono::Duration::hours(1);
    tasks::insert_task(
        &pool,
        "ticket-future",
        "builtin.noop",
        "{}",
        0,
        3,
        Some(far_future),
    )
    .await
    .expect("insert should succeed");

    let mut tx = pool.begin().await.expect("begin tx");
    let picker = StandardPicker;
    let claimed_id = picker
        .lock_one_pending_id(&mut tx)
        .await
        .expect("pick should succeed");
    tx.commit().await.expect("commit");

    assert!(claimed_id.is_none(), "future task should not be claimable yet");

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn claim_orders_by_priority_then_id() {
    let (pool, db_name) = create_test_db().await;

    let low = tasks::insert_task(&pool, "ticket-low", "builtin.noop", "{}", 0, 3, None)
        .await
        .unwrap();
    let high = tasks::insert_task(&pool, "ticket-high", "builtin.noop", "{}", 10, 3, None)
        .await
        .unwrap();

    let mut tx = pool.begin().await.expect("begin tx");
    let picker = StandardPicker;
    let claimed_id = picker
        .lock_one_pending_id(&mut tx)
        .await
        .unwrap()
        .expect("a task should be claimable");
    tx.rollback().await.expect("rollback");

    assert_eq!(claimed_id, high.id, "higher priority task should be picked first");
    assert_ne!(claimed_id, low.id);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn scheduled_fanout_insert_is_idempotent() {
    let (pool, db_name) = create_test_db().await;

    let schedule = scheduler_db::queries::schedules::insert_schedule(
        &pool,
        "nightly",
        "builtin.noop",
        "0 0 0 * * *",
        "{}",
    )
    .await
    .unwrap();

    let ticket = format!("schedule#{}#20260101000000", schedule.id);

    let first = tasks::insert_scheduled_task(&pool, schedule.id, &ticket, "builtin.noop", "{}")
        .await
        .expect("first insert should succeed");
    assert!(first.is_some());

    let second = tasks::insert_scheduled_task(&pool, schedule.id, &ticket, "builtin.noop", "{}")
        .await
        .expect("duplicate insert should not error");
    assert!(second.is_none(), "duplicate ticket should be a no-op");

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn cancel_pending_task_transitions_directly_to_canceled() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, "ticket-cancel", "builtin.noop", "{}", 0, 3, None)
        .await
        .unwrap();

    let affected = tasks::cancel_pending_task(&pool, task.id).await.unwrap();
    assert_eq!(affected, 1);

    let reloaded = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::Canceled);
    assert!(reloaded.finished_at.is_some());

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn request_cancel_on_running_task_sets_cancel_requested() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, "ticket-run", "builtin.noop", "{}", 0, 3, None)
        .await
        .unwrap();

    let mut tx = pool.begin().await.unwrap();
    let picker = StandardPicker;
    let id = picker.lock_one_pending_id(&mut tx).await.unwrap().unwrap();
    picker.mark_running(&mut tx, id, "worker-1").await.unwrap();
    tx.commit().await.unwrap();

    let affected = tasks::request_cancel_running_task(&pool, task.id)
        .await
        .unwrap();
    assert_eq!(affected, 1);

    assert!(tasks::is_cancel_requested(&pool, task.id).await.unwrap());

    let affected = tasks::mark_canceled(&pool, task.id, Some("stopped on request"))
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let reloaded = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::Canceled);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn delete_task_requires_terminal_status() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, "ticket-del", "builtin.noop", "{}", 0, 3, None)
        .await
        .unwrap();

    let affected = tasks::delete_task(&pool, task.id).await.unwrap();
    assert_eq!(affected, 0, "pending task should not be deletable");

    tasks::cancel_pending_task(&pool, task.id).await.unwrap();
    let affected = tasks::delete_task(&pool, task.id).await.unwrap();
    assert_eq!(affected, 1, "canceled task should be deletable");

    drop_test_db(&db_name).await;
}
