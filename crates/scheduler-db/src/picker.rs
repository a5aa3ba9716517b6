//! Dialect-specific pending-task selection.
//!
//! Picking the next task to run and marking it running must happen inside
//! the same transaction so two pollers never claim the same row. The SQL
//! used to find a candidate varies by deployment target, so the locking
//! query is behind the [`TaskPicker`] trait while the claiming update is
//! shared.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::Task;

/// Finds and claims the next eligible pending task within a caller-owned
/// transaction.
///
/// Implementations must only consider rows in `pending` status whose
/// `not_before` has elapsed, and must use `FOR UPDATE SKIP LOCKED` (or an
/// equivalent) so concurrent pollers never block on each other.
#[async_trait]
pub trait TaskPicker: Send + Sync {
    /// Select and lock one pending task id, or `None` if nothing is eligible.
    async fn lock_one_pending_id(&self, conn: &mut PgConnection) -> Result<Option<Uuid>>;

    /// Transition the locked task to `running` under the given owner.
    ///
    /// Callers must only pass an id returned by `lock_one_pending_id` in the
    /// same transaction. Returns the updated row.
    async fn mark_running(&self, conn: &mut PgConnection, id: Uuid, owner: &str) -> Result<Task> {
        let task = sqlx::query_as::<_, Task>(
            "UPDATE batch_task \
             SET status = 'running', owner = $2, heartbeat_at = now(), \
                 attempt = attempt + 1, updated_at = now() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING *",
        )
        .bind(id)
        .bind(owner)
        .fetch_one(conn)
        .await
        .context("failed to mark task running")?;

        Ok(task)
    }
}

/// Picker for current Postgres: pushes the `not_before` filter into the
/// locking query directly.
pub struct StandardPicker;

#[async_trait]
impl TaskPicker for StandardPicker {
    async fn lock_one_pending_id(&self, conn: &mut PgConnection) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM batch_task \
             WHERE status = 'pending' AND (not_before IS NULL OR not_before <= now()) \
             ORDER BY priority DESC, id ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(conn)
        .await
        .context("failed to lock pending task")?;

        Ok(row.map(|(id,)| id))
    }
}

/// Picker for older Postgres targets whose planner cannot reliably push the
/// `not_before` predicate below `FOR UPDATE SKIP LOCKED`.
///
/// Locks a small batch of pending candidates first, then re-checks
/// `not_before` against the locked rows.
pub struct LegacyPicker {
    /// How many locked candidates to inspect before giving up.
    pub batch: i64,
}

impl Default for LegacyPicker {
    fn default() -> Self {
        Self { batch: 50 }
    }
}

#[async_trait]
impl TaskPicker for LegacyPicker {
    async fn lock_one_pending_id(&self, conn: &mut PgConnection) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM ( \
                 SELECT id, not_before FROM batch_task \
                 WHERE status = 'pending' \
                 ORDER BY priority DESC, id ASC \
                 LIMIT $1 \
                 FOR UPDATE SKIP LOCKED \
             ) candidates \
             WHERE not_before IS NULL OR not_before <= now() \
             ORDER BY id ASC \
             LIMIT 1",
        )
        .bind(self.batch)
        .fetch_optional(conn)
        .await
        .context("failed to lock pending task (legacy dialect)")?;

        Ok(row.map(|(id,)| id))
    }
}
