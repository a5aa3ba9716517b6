//! Read-side query helpers used by the admin surface and engine.
//!
//! Thin re-exports over [`scheduler_db::queries`] kept here so callers in
//! this crate depend on `state::queries` rather than reaching into
//! `scheduler_db` directly.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use scheduler_db::models::{Task, TaskStatus};
pub use scheduler_db::queries::tasks::TaskCounts;

/// Fetch a single task by ID.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    scheduler_db::queries::tasks::get_task(pool, id).await
}

/// List tasks in a given status, most recently created first.
pub async fn list_by_status(pool: &PgPool, status: TaskStatus) -> Result<Vec<Task>> {
    scheduler_db::queries::tasks::list_tasks_by_status(pool, status).await
}

/// List the most recently created tasks, regardless of status.
pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<Task>> {
    scheduler_db::queries::tasks::list_recent_tasks(pool, limit).await
}

/// Status-grouped counts across all tasks, for the admin summary endpoint.
pub async fn task_counts(pool: &PgPool) -> Result<TaskCounts> {
    scheduler_db::queries::tasks::get_task_counts(pool).await
}
