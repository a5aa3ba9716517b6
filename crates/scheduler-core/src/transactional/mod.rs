//! Transactional service: short, isolated transactions that bracket a task's
//! life from claim through completion, plus the compensation log operations
//! a handler performs mid-execution.

mod run_context;

use anyhow::Result;
use chrono::{SubsecRound, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub use run_context::{bind_run_context, current_run_id};

use scheduler_db::models::{OperationLogEntry, Run, RunStatus, Task, TaskStatus};
use scheduler_db::picker::TaskPicker;
use scheduler_db::queries::{operation_log, runs, tasks};

/// Claim one ready task, transitioning it `pending -> running` under `owner`.
///
/// Combines the picker's lock-and-claim pair inside one transaction so
/// concurrent pollers never observe the same task as claimable twice.
pub async fn claim_one(
    pool: &PgPool,
    picker: &dyn TaskPicker,
    owner: &str,
) -> Result<Option<Task>> {
    let mut tx = pool.begin().await?;

    let Some(id) = picker.lock_one_pending_id(&mut tx).await? else {
        tx.rollback().await?;
        return Ok(None);
    };

    let task = picker.mark_running(&mut tx, id, owner).await?;
    tx.commit().await?;
    Ok(Some(task))
}

/// Start a new run for a claimed task.
pub async fn create_run(pool: &PgPool, task_id: Uuid) -> Result<Run> {
    runs::insert_run(pool, task_id).await
}

/// Write back the outcome of an execution attempt to both the Task and its
/// Run. Idempotent on missing rows: if the task or run has already been
/// written back (or no longer exists), this logs and returns `Ok(())`
/// instead of erroring, since the worker's completion step must never fail.
pub async fn complete(
    pool: &PgPool,
    task_id: Uuid,
    run_id: Uuid,
    succeeded: bool,
    message: Option<&str>,
    final_status: Option<TaskStatus>,
) -> Result<()> {
    let task_status = final_status.unwrap_or(if succeeded {
        TaskStatus::Succeed
    } else {
        TaskStatus::Failed
    });

    let run_status = match task_status {
        TaskStatus::Canceled => RunStatus::Canceled,
        TaskStatus::Succeed => RunStatus::Succeed,
        _ => RunStatus::Failed,
    };

    let task_rows = match task_status {
        TaskStatus::Succeed => tasks::mark_succeeded(pool, task_id, message).await?,
        TaskStatus::Canceled => tasks::mark_canceled(pool, task_id, message).await?,
        _ => tasks::mark_failed(pool, task_id, message).await?,
    };
    if task_rows == 0 {
        tracing::warn!(%task_id, "completion write-back found no matching running task");
    }

    let run_rows = runs::finish_run(pool, run_id, run_status, message).await?;
    if run_rows == 0 {
        tracing::warn!(%run_id, "completion write-back found no matching open run");
    }

    Ok(())
}

/// Check whether cancellation has been requested for a task.
pub async fn is_cancel_requested(pool: &PgPool, task_id: Uuid) -> Result<bool> {
    tasks::is_cancel_requested(pool, task_id).await
}

/// Append a new compensation entry for the current run, at the next
/// sequence number.
pub async fn log_compensation(
    pool: &PgPool,
    run_id: Uuid,
    action_type: Option<&str>,
    action_payload: &str,
) -> Result<OperationLogEntry> {
    let seq_no = operation_log::next_seq_no(pool, run_id).await?;
    operation_log::append_operation(pool, run_id, seq_no, action_type, action_payload).await
}

/// Fetch a run's compensation entries in reverse execution order.
pub async fn fetch_compensations_desc(pool: &PgPool, run_id: Uuid) -> Result<Vec<OperationLogEntry>> {
    operation_log::fetch_compensations_desc(pool, run_id).await
}

/// Mark a compensation entry successfully undone.
pub async fn mark_compensation_done(pool: &PgPool, op_id: Uuid) -> Result<()> {
    operation_log::mark_compensation_done(pool, op_id).await?;
    Ok(())
}

/// Mark a compensation entry failed, recording the trimmed error string.
pub async fn mark_compensation_failed(pool: &PgPool, op_id: Uuid, error: &str) -> Result<()> {
    operation_log::mark_compensation_failed(pool, op_id, error).await?;
    Ok(())
}

/// Current instant truncated to millisecond precision, matching the
/// granularity timestamps are compared at throughout this system.
pub fn now_ms() -> chrono::DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
