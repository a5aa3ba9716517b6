//! Database query functions for the `batch_schedule` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Schedule;

/// Insert a new cron schedule. `enabled` defaults to `true`.
pub async fn insert_schedule(
    pool: &PgPool,
    name: &str,
    type_code: &str,
    cron_expr: &str,
    payload: &str,
) -> Result<Schedule> {
    let schedule = sqlx::query_as::<_, Schedule>(
        "INSERT INTO batch_schedule (name, type_code, cron_expr, payload) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(name)
    .bind(type_code)
    .bind(cron_expr)
    .bind(payload)
    .fetch_one(pool)
    .await
    .context("failed to insert schedule")?;

    Ok(schedule)
}

/// Fetch a single schedule by ID.
pub async fn get_schedule(pool: &PgPool, id: Uuid) -> Result<Option<Schedule>> {
    let schedule = sqlx::query_as::<_, Schedule>("SELECT * FROM batch_schedule WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch schedule")?;

    Ok(schedule)
}

/// List all schedules, ordered by creation time.
pub async fn list_schedules(pool: &PgPool) -> Result<Vec<Schedule>> {
    let schedules =
        sqlx::query_as::<_, Schedule>("SELECT * FROM batch_schedule ORDER BY created_at ASC")
            .fetch_all(pool)
            .await
            .context("failed to list schedules")?;

    Ok(schedules)
}

/// List all schedules with `enabled = true`, for the cron fan-out loop.
pub async fn list_enabled_schedules(pool: &PgPool) -> Result<Vec<Schedule>> {
    let schedules = sqlx::query_as::<_, Schedule>(
        "SELECT * FROM batch_schedule WHERE enabled = true ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list enabled schedules")?;

    Ok(schedules)
}

/// Enable or disable a schedule.
pub async fn set_schedule_enabled(pool: &PgPool, id: Uuid, enabled: bool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE batch_schedule SET enabled = $1, updated_at = now() WHERE id = $2",
    )
    .bind(enabled)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to toggle schedule")?;

    Ok(result.rows_affected())
}

/// Advance `last_fire_at` after a fan-out pass. Callers pass the timestamp of
/// the most recent firing enumerated, so subsequent passes resume from there.
pub async fn advance_last_fire_at(
    pool: &PgPool,
    id: Uuid,
    last_fire_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE batch_schedule SET last_fire_at = $1, updated_at = now() WHERE id = $2",
    )
    .bind(last_fire_at)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to advance schedule last_fire_at")?;

    Ok(result.rows_affected())
}

/// Delete a schedule. Existing tasks fanned out from it are left untouched
/// (the foreign key has no cascade).
pub async fn delete_schedule(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM batch_schedule WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete schedule")?;

    Ok(result.rows_affected())
}
