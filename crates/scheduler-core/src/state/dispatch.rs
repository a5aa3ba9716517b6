//! Semantic dispatch helpers wrapping the `batch_task` transitions.
//!
//! Each transition's legality is already enforced by its `WHERE status = ...`
//! clause in [`scheduler_db::queries::tasks`]; [`super::TaskStateMachine`]
//! documents the same graph for callers that want to check before acting
//! (e.g. the admin API deciding which buttons to show).

use anyhow::{Result, bail};
use sqlx::PgPool;
use uuid::Uuid;

use scheduler_db::queries::tasks;

/// Cancel a task that has not started running yet.
pub async fn cancel_pending(pool: &PgPool, task_id: Uuid) -> Result<()> {
    let rows = tasks::cancel_pending_task(pool, task_id).await?;
    if rows == 0 {
        bail!("task {task_id} is not pending, cannot cancel directly");
    }
    Ok(())
}

/// Request cooperative cancellation of a running task.
pub async fn request_cancel(pool: &PgPool, task_id: Uuid) -> Result<()> {
    let rows = tasks::request_cancel_running_task(pool, task_id).await?;
    if rows == 0 {
        bail!("task {task_id} is not running, cannot request cancellation");
    }
    Ok(())
}

/// Mark a task succeeded after its handler returned `Ok`.
pub async fn succeed(pool: &PgPool, task_id: Uuid, message: Option<&str>) -> Result<()> {
    let rows = tasks::mark_succeeded(pool, task_id, message).await?;
    if rows == 0 {
        bail!("task {task_id} was not running or cancel_requested, cannot mark succeeded");
    }
    Ok(())
}

/// Mark a task failed after its handler returned `Err` or panicked.
pub async fn fail(pool: &PgPool, task_id: Uuid, message: Option<&str>) -> Result<()> {
    let rows = tasks::mark_failed(pool, task_id, message).await?;
    if rows == 0 {
        bail!("task {task_id} was not running or cancel_requested, cannot mark failed");
    }
    Ok(())
}

/// Mark a task canceled once its cancellation request was honored.
pub async fn cancel_confirmed(pool: &PgPool, task_id: Uuid, message: Option<&str>) -> Result<()> {
    let rows = tasks::mark_canceled(pool, task_id, message).await?;
    if rows == 0 {
        bail!("task {task_id} was not cancel_requested, cannot confirm cancellation");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_test_utils::{create_test_db, drop_test_db};

    #[tokio::test]
    async fn cancel_pending_rejects_already_running_task() {
        let (pool, _db_name) = create_test_db().await;
        let task = scheduler_db::queries::tasks::insert_task(
            &pool, "t-1", "builtin.noop", "{}", 0, 3, None,
        )
        .await
        .unwrap();

        let mut tx = pool.begin().await.unwrap();
        let picker = scheduler_db::picker::StandardPicker;
        let id = scheduler_db::picker::TaskPicker::lock_one_pending_id(&picker, &mut tx)
            .await
            .unwrap()
            .unwrap();
        scheduler_db::picker::TaskPicker::mark_running(&picker, &mut tx, id, "worker-1")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let result = cancel_pending(&pool, task.id).await;
        assert!(result.is_err());
        drop_test_db(&_db_name).await;
    }

    #[tokio::test]
    async fn request_cancel_then_confirm_roundtrip() {
        let (pool, _db_name) = create_test_db().await;
        let task = scheduler_db::queries::tasks::insert_task(
            &pool, "t-2", "builtin.noop", "{}", 0, 3, None,
        )
        .await
        .unwrap();

        let mut tx = pool.begin().await.unwrap();
        let picker = scheduler_db::picker::StandardPicker;
        let id = scheduler_db::picker::TaskPicker::lock_one_pending_id(&picker, &mut tx)
            .await
            .unwrap()
            .unwrap();
        scheduler_db::picker::TaskPicker::mark_running(&picker, &mut tx, id, "worker-1")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        request_cancel(&pool, task.id).await.unwrap();
        cancel_confirmed(&pool, task.id, Some("stopped cooperatively"))
            .await
            .unwrap();

        let fetched = scheduler_db::queries::tasks::get_task(&pool, task.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.status, scheduler_db::models::TaskStatus::Canceled);
        drop_test_db(&_db_name).await;
    }
}
