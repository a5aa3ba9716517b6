//! Cron fan-out: periodically turns enabled schedules into pending tasks.
//!
//! Each firing instant becomes exactly one task row, keyed by a ticket that
//! encodes the schedule id and the firing instant, so replaying a scan
//! window (restart, overlap) collapses idempotently on the ticket's unique
//! index rather than double-enqueuing.

mod error;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use sqlx::PgPool;

pub use error::CronError;

use scheduler_db::models::Schedule as ScheduleRow;
use scheduler_db::queries::schedules;
use scheduler_db::queries::tasks;

/// Safety valve against a schedule whose scan window would otherwise
/// enumerate an unbounded number of firings (e.g. a long-disabled schedule
/// re-enabled after months).
const MAX_FIRINGS_PER_TICK: usize = 5000;

/// Default backfill window applied the first time a schedule fires.
const DEFAULT_BACKFILL_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct CronConfig {
    pub interval: Duration,
    pub initial_delay: Duration,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Run the periodic fan-out loop until `cancel` fires.
pub async fn run(pool: PgPool, config: CronConfig, cancel: CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(config.initial_delay) => {}
        _ = cancel.cancelled() => return,
    }

    loop {
        if cancel.is_cancelled() {
            return;
        }

        if let Err(e) = fire_due(&pool).await {
            tracing::error!(error = %e, "cron fan-out tick failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

/// Scan every enabled schedule and fan out any instants due since its last
/// firing.
pub async fn fire_due(pool: &PgPool) -> anyhow::Result<()> {
    let enabled = schedules::list_enabled_schedules(pool).await?;
    for schedule in enabled {
        if let Err(e) = fire_one(pool, &schedule).await {
            tracing::warn!(schedule_id = %schedule.id, error = %e, "skipping schedule this tick");
        }
    }
    Ok(())
}

async fn fire_one(pool: &PgPool, schedule: &ScheduleRow) -> anyhow::Result<()> {
    let parsed = match Schedule::from_str(&schedule.cron_expr) {
        Ok(s) => s,
        Err(e) => {
            return Err(CronError::InvalidExpression(schedule.cron_expr.clone(), e.to_string()).into());
        }
    };

    let now = Utc::now().trunc_subsecs(0);
    let start = schedule
        .last_fire_at
        .map(|t| t.trunc_subsecs(0))
        .unwrap_or_else(|| now - chrono::Duration::seconds(DEFAULT_BACKFILL_SECS));

    let mut count = 0usize;
    let mut capped = false;
    let mut last_advanced: Option<DateTime<Utc>> = None;

    for firing in parsed.after(&start) {
        if firing > now {
            break;
        }
        if count >= MAX_FIRINGS_PER_TICK {
            capped = true;
            break;
        }
        count += 1;

        let ticket = format!(
            "schedule#{}#{}",
            schedule.id,
            firing.format("%Y%m%d%H%M%S")
        );

        let inserted = tasks::insert_scheduled_task(
            pool,
            schedule.id,
            &ticket,
            &schedule.type_code,
            &schedule.payload,
        )
        .await?;

        if inserted.is_some() {
            last_advanced = Some(firing);
        }
    }

    if capped {
        tracing::warn!(
            schedule_id = %schedule.id,
            fired = count,
            "cron fan-out cap reached, remaining firings deferred to next tick"
        );
    }

    if let Some(t) = last_advanced {
        schedules::advance_last_fire_at(pool, schedule.id, t).await?;
    }

    Ok(())
}
