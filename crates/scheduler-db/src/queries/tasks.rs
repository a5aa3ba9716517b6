//! Database query functions for the `batch_task` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Task, TaskStatus};

/// Enqueue an ad-hoc task. `ticket` must be unique; callers typically derive
/// it from caller-supplied idempotency keys or a fresh UUID.
#[allow(clippy::too_many_arguments)]
pub async fn insert_task(
    pool: &PgPool,
    ticket: &str,
    type_code: &str,
    payload: &str,
    priority: i32,
    max_attempts: i32,
    not_before: Option<DateTime<Utc>>,
) -> Result<Task> {
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO batch_task (ticket, type_code, payload, priority, max_attempts, not_before) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(ticket)
    .bind(type_code)
    .bind(payload)
    .bind(priority)
    .bind(max_attempts)
    .bind(not_before)
    .fetch_one(pool)
    .await
    .context("failed to insert task")?;

    Ok(task)
}

/// Idempotently insert a task fanned out from a schedule firing.
///
/// The ticket encodes the schedule id and firing instant, so a duplicate
/// fan-out pass (e.g. after a crash) silently no-ops via the unique index on
/// `ticket` instead of raising a constraint violation. Returns `None` when
/// the ticket already existed.
pub async fn insert_scheduled_task(
    pool: &PgPool,
    schedule_id: Uuid,
    ticket: &str,
    type_code: &str,
    payload: &str,
) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO batch_task (schedule_id, ticket, type_code, payload) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (ticket) DO NOTHING \
         RETURNING *",
    )
    .bind(schedule_id)
    .bind(ticket)
    .bind(type_code)
    .bind(payload)
    .fetch_optional(pool)
    .await
    .context("failed to insert scheduled task")?;

    Ok(task)
}

/// Fetch a single task by ID.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM batch_task WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")?;

    Ok(task)
}

/// Fetch a single task by its idempotency ticket.
pub async fn get_task_by_ticket(pool: &PgPool, ticket: &str) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM batch_task WHERE ticket = $1")
        .bind(ticket)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task by ticket")?;

    Ok(task)
}

/// List tasks in a given status, most recently created first.
pub async fn list_tasks_by_status(pool: &PgPool, status: TaskStatus) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM batch_task WHERE status = $1 ORDER BY created_at DESC",
    )
    .bind(status)
    .fetch_all(pool)
    .await
    .context("failed to list tasks by status")?;

    Ok(tasks)
}

/// List the most recently created tasks, regardless of status.
pub async fn list_recent_tasks(pool: &PgPool, limit: i64) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM batch_task ORDER BY created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list recent tasks")?;

    Ok(tasks)
}

/// Cancel a task that has not started running yet.
///
/// Transitions `pending` directly to `canceled` since there is no running
/// execution to interrupt. Returns the number of rows affected (0 means the
/// task was not in `pending`, most likely because it already started).
pub async fn cancel_pending_task(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE batch_task \
         SET status = 'canceled', finished_at = now(), updated_at = now() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to cancel pending task")?;

    Ok(result.rows_affected())
}

/// Request cancellation of a task that is currently running.
///
/// Sets status to `cancel_requested`; the worker executing the task observes
/// this via [`is_cancel_requested`] and stops cooperatively. Returns the
/// number of rows affected (0 means the task was not `running`).
pub async fn request_cancel_running_task(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE batch_task \
         SET status = 'cancel_requested', updated_at = now() \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to request cancellation")?;

    Ok(result.rows_affected())
}

/// Check whether cancellation has been requested for a running task.
pub async fn is_cancel_requested(pool: &PgPool, id: Uuid) -> Result<bool> {
    let row: Option<(TaskStatus,)> =
        sqlx::query_as("SELECT status FROM batch_task WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to check cancellation status")?;

    Ok(matches!(row, Some((TaskStatus::CancelRequested,))))
}

/// Mark a task that finished executing (whether or not cancellation was
/// requested mid-run) as `succeed`.
pub async fn mark_succeeded(pool: &PgPool, id: Uuid, message: Option<&str>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE batch_task \
         SET status = 'succeed', finished_at = now(), updated_at = now(), message = $2 \
         WHERE id = $1 AND status IN ('running', 'cancel_requested')",
    )
    .bind(id)
    .bind(message)
    .execute(pool)
    .await
    .context("failed to mark task succeeded")?;

    Ok(result.rows_affected())
}

/// Mark a task that finished executing as `failed`.
pub async fn mark_failed(pool: &PgPool, id: Uuid, message: Option<&str>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE batch_task \
         SET status = 'failed', finished_at = now(), updated_at = now(), message = $2 \
         WHERE id = $1 AND status IN ('running', 'cancel_requested')",
    )
    .bind(id)
    .bind(message)
    .execute(pool)
    .await
    .context("failed to mark task failed")?;

    Ok(result.rows_affected())
}

/// Mark a task whose cancellation was honored as `canceled`.
pub async fn mark_canceled(pool: &PgPool, id: Uuid, message: Option<&str>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE batch_task \
         SET status = 'canceled', finished_at = now(), updated_at = now(), message = $2 \
         WHERE id = $1 AND status = 'cancel_requested'",
    )
    .bind(id)
    .bind(message)
    .execute(pool)
    .await
    .context("failed to mark task canceled")?;

    Ok(result.rows_affected())
}

/// Delete a task, but only once it has reached a terminal status.
pub async fn delete_task(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM batch_task \
         WHERE id = $1 AND status IN ('succeed', 'failed', 'canceled')",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to delete task")?;

    Ok(result.rows_affected())
}

/// Reset tasks left `running` under an owner that is no longer alive back to
/// `failed`, so the operator can decide whether to re-enqueue them.
///
/// Used for restart recovery: if the engine process crashes mid-execution,
/// tasks it held are left in `running` forever without this.
pub async fn reset_orphaned_running(pool: &PgPool, owner: &str) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "UPDATE batch_task \
         SET status = 'failed', finished_at = now(), updated_at = now(), \
             message = 'orphaned: owner process restarted' \
         WHERE owner = $1 AND status IN ('running', 'cancel_requested') \
         RETURNING *",
    )
    .bind(owner)
    .fetch_all(pool)
    .await
    .context("failed to reset orphaned tasks")?;

    Ok(tasks)
}

/// Count tasks fanned out from a schedule, used to refuse deleting a
/// schedule that still has task history referencing it.
pub async fn count_tasks_for_schedule(pool: &PgPool, schedule_id: Uuid) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM batch_task WHERE schedule_id = $1")
            .bind(schedule_id)
            .fetch_one(pool)
            .await
            .context("failed to count tasks for schedule")?;

    Ok(row.0)
}

/// Status counts across all tasks, for the admin summary endpoint.
#[derive(Debug, Clone, Default)]
pub struct TaskCounts {
    pub pending: i64,
    pub running: i64,
    pub cancel_requested: i64,
    pub succeed: i64,
    pub failed: i64,
    pub canceled: i64,
    pub total: i64,
}

/// Get a summary of task counts by status.
pub async fn get_task_counts(pool: &PgPool) -> Result<TaskCounts> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status::text, COUNT(*) as cnt FROM batch_task GROUP BY status")
            .fetch_all(pool)
            .await
            .context("failed to get task counts")?;

    let mut counts = TaskCounts::default();
    for (status, count) in &rows {
        match status.as_str() {
            "pending" => counts.pending = *count,
            "running" => counts.running = *count,
            "cancel_requested" => counts.cancel_requested = *count,
            "succeed" => counts.succeed = *count,
            "failed" => counts.failed = *count,
            "canceled" => counts.canceled = *count,
            _ => {}
        }
        counts.total += count;
    }
    Ok(counts)
}
