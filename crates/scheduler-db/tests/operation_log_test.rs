//! Integration tests for the compensation (operation log) queries.

use scheduler_db::models::CompensationStatus;
use scheduler_db::queries::{operation_log, runs, tasks};
use scheduler_test_utils::{create_test_db, drop_test_db};

async fn make_run(pool: &sqlx::PgPool) -> uuid::Uuid {
    let task = tasks::insert_task(pool, "ticket-ops", "builtin.noop", "{}", 0, 3, None)
        .await
        .unwrap();
    let run = runs::insert_run(pool, task.id).await.unwrap();
    run.id
}

#[tokio::test]
async fn next_seq_no_starts_at_one_and_increments() {
    let (pool, db_name) = create_test_db().await;
    let run_id = make_run(&pool).await;

    assert_eq!(operation_log::next_seq_no(&pool, run_id).await.unwrap(), 1);

    operation_log::append_operation(&pool, run_id, 1, Some("file_restore"), "{}")
        .await
        .unwrap();
    assert_eq!(operation_log::next_seq_no(&pool, run_id).await.unwrap(), 2);

    operation_log::append_operation(&pool, run_id, 2, Some("file_restore"), "{}")
        .await
        .unwrap();
    assert_eq!(operation_log::next_seq_no(&pool, run_id).await.unwrap(), 3);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn fetch_compensations_desc_reverses_execution_order() {
    let (pool, db_name) = create_test_db().await;
    let run_id = make_run(&pool).await;

    for seq in 1..=3 {
        operation_log::append_operation(&pool, run_id, seq, Some("file_restore"), "{}")
            .await
            .unwrap();
    }

    let entries = operation_log::fetch_compensations_desc(&pool, run_id)
        .await
        .unwrap();
    let seqs: Vec<i32> = entries.iter().map(|e| e.seq_no).collect();
    assert_eq!(seqs, vec![3, 2, 1], "replay order must be reverse of execution order");

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn mark_done_and_failed_update_status_independently() {
    let (pool, db_name) = create_test_db().await;
    let run_id = make_run(&pool).await;

    let first = operation_log::append_operation(&pool, run_id, 1, Some("a"), "{}")
        .await
        .unwrap();
    let second = operation_log::append_operation(&pool, run_id, 2, Some("b"), "{}")
        .await
        .unwrap();

    operation_log::mark_compensation_done(&pool, first.id)
        .await
        .unwrap();
    operation_log::mark_compensation_failed(&pool, second.id, "disk full")
        .await
        .unwrap();

    let entries = operation_log::fetch_compensations_desc(&pool, run_id)
        .await
        .unwrap();
    let first_reloaded = entries.iter().find(|e| e.id == first.id).unwrap();
    let second_reloaded = entries.iter().find(|e| e.id == second.id).unwrap();

    assert_eq!(first_reloaded.status, CompensationStatus::Done);
    assert_eq!(second_reloaded.status, CompensationStatus::Failed);
    assert_eq!(second_reloaded.attempt, 1);
    assert_eq!(second_reloaded.last_error.as_deref(), Some("disk full"));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn count_pending_compensations_reflects_drain_progress() {
    let (pool, db_name) = create_test_db().await;
    let run_id = make_run(&pool).await;

    let a = operation_log::append_operation(&pool, run_id, 1, Some("a"), "{}")
        .await
        .unwrap();
    operation_log::append_operation(&pool, run_id, 2, Some("b"), "{}")
        .await
        .unwrap();

    assert_eq!(
        operation_log::count_pending_compensations(&pool, run_id)
            .await
            .unwrap(),
        2
    );

    operation_log::mark_compensation_done(&pool, a.id).await.unwrap();

    assert_eq!(
        operation_log::count_pending_compensations(&pool, run_id)
            .await
            .unwrap(),
        1
    );

    drop_test_db(&db_name).await;
}
