//! Database query functions for the `batch_run` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Run, RunStatus};

/// Start a new run for a task. A task may accumulate multiple runs across
/// retries; each run owns its own compensation log.
pub async fn insert_run(pool: &PgPool, task_id: Uuid) -> Result<Run> {
    let run = sqlx::query_as::<_, Run>(
        "INSERT INTO batch_run (task_id) VALUES ($1) RETURNING *",
    )
    .bind(task_id)
    .fetch_one(pool)
    .await
    .context("failed to insert run")?;

    Ok(run)
}

/// Fetch a single run by ID.
pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<Option<Run>> {
    let run = sqlx::query_as::<_, Run>("SELECT * FROM batch_run WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch run")?;

    Ok(run)
}

/// List all runs for a task, most recent first.
pub async fn list_runs_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<Run>> {
    let runs = sqlx::query_as::<_, Run>(
        "SELECT * FROM batch_run WHERE task_id = $1 ORDER BY started_at DESC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to list runs for task")?;

    Ok(runs)
}

/// Close out a run with its terminal status and an optional message.
pub async fn finish_run(
    pool: &PgPool,
    id: Uuid,
    status: RunStatus,
    message: Option<&str>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE batch_run SET status = $1, ended_at = now(), message = $2 \
         WHERE id = $3 AND ended_at IS NULL",
    )
    .bind(status)
    .bind(message)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to finish run")?;

    Ok(result.rows_affected())
}
