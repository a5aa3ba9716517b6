//! Database query functions for the `batch_operation_log` table.
//!
//! Each row is an undo record for one side-effecting step a handler took
//! during a run. Rows are appended in execution order and replayed in
//! reverse when a run needs to be compensated.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::OperationLogEntry;

/// Append a compensation record for a run. `seq_no` must be unique within
/// the run; use [`next_seq_no`] to compute it.
pub async fn append_operation(
    pool: &PgPool,
    run_id: Uuid,
    seq_no: i32,
    action_type: Option<&str>,
    action_payload: &str,
) -> Result<OperationLogEntry> {
    let entry = sqlx::query_as::<_, OperationLogEntry>(
        "INSERT INTO batch_operation_log (run_id, seq_no, action_type, action_payload) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(run_id)
    .bind(seq_no)
    .bind(action_type)
    .bind(action_payload)
    .fetch_one(pool)
    .await
    .context("failed to append compensation log entry")?;

    Ok(entry)
}

/// Compute the next sequence number for a run's compensation log.
/// Sequence numbers start at 1 for a run's first entry.
pub async fn next_seq_no(pool: &PgPool, run_id: Uuid) -> Result<i32> {
    let row: (Option<i32>,) = sqlx::query_as(
        "SELECT MAX(seq_no) FROM batch_operation_log WHERE run_id = $1",
    )
    .bind(run_id)
    .fetch_one(pool)
    .await
    .context("failed to compute next compensation sequence number")?;

    Ok(row.0.map(|n| n + 1).unwrap_or(1))
}

/// Fetch all compensation entries for a run in reverse execution order
/// (highest `seq_no` first), the order replay must use.
pub async fn fetch_compensations_desc(
    pool: &PgPool,
    run_id: Uuid,
) -> Result<Vec<OperationLogEntry>> {
    let entries = sqlx::query_as::<_, OperationLogEntry>(
        "SELECT * FROM batch_operation_log WHERE run_id = $1 ORDER BY seq_no DESC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch compensation entries")?;

    Ok(entries)
}

/// Mark a compensation entry as successfully undone.
pub async fn mark_compensation_done(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE batch_operation_log SET status = 'done', updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to mark compensation done")?;

    Ok(result.rows_affected())
}

/// Mark a compensation entry as failed, recording the error and bumping the
/// attempt counter. Replay continues with the next entry regardless.
pub async fn mark_compensation_failed(pool: &PgPool, id: Uuid, error: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE batch_operation_log \
         SET status = 'failed', attempt = attempt + 1, last_error = $2, updated_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await
    .context("failed to mark compensation failed")?;

    Ok(result.rows_affected())
}

/// Count entries for a run still in `pending` status, useful for deciding
/// whether a run's compensation is fully drained.
pub async fn count_pending_compensations(pool: &PgPool, run_id: Uuid) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM batch_operation_log \
         WHERE run_id = $1 AND status = 'pending'",
    )
    .bind(run_id)
    .fetch_one(pool)
    .await
    .context("failed to count pending compensations")?;

    Ok(row.0)
}
