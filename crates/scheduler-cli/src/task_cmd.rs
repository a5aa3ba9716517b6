//! `scheduler task` subcommands: enqueue/list/cancel/delete ad-hoc tasks.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use scheduler_core::handler::HandlerRegistry;
use scheduler_db::models::TaskStatus;
use scheduler_db::queries::tasks;

use crate::TaskCommands;

pub async fn run_task_command(
    cmd: TaskCommands,
    pool: &PgPool,
    handlers: &HandlerRegistry,
) -> Result<()> {
    match cmd {
        TaskCommands::Enqueue {
            type_code,
            payload,
            ticket,
            priority,
            max_attempts,
            not_before,
        } => {
            enqueue(
                pool,
                handlers,
                &type_code,
                &payload,
                ticket,
                priority,
                max_attempts,
                not_before,
            )
            .await
        }
        TaskCommands::List { status } => list(pool, status).await,
        TaskCommands::Cancel { id } => cancel(pool, &id).await,
        TaskCommands::Delete { id } => delete(pool, &id).await,
    }
}

/// Parses `YYYY-MM-DD HH:MM[:SS]` or the ISO-like `YYYY-MM-DDTHH:MM[:SS]`,
/// both assumed UTC. A string without seconds is accepted (`:00` is
/// appended); a longer string (e.g. with fractional seconds or a timezone
/// suffix) is truncated to the first 19 characters before parsing.
fn parse_not_before(s: &str) -> Result<DateTime<Utc>> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    let mut normalized = s.to_owned();
    if normalized.len() > 19 {
        normalized.truncate(19);
    }
    if normalized.len() == 16 {
        normalized.push_str(":00");
    }

    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    bail!("invalid not_before: expected 'YYYY-MM-DD HH:MM[:SS]' or 'YYYY-MM-DDTHH:MM', got {s:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_not_before_accepts_missing_seconds() {
        let parsed = parse_not_before("2026-01-02T03:04").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-01-02T03:04:00+00:00");
    }

    #[test]
    fn parse_not_before_truncates_longer_strings_to_19_chars() {
        let parsed = parse_not_before("2026-01-02T03:04:05.999Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn parse_not_before_rejects_unparseable_input() {
        assert!(parse_not_before("not a date").is_err());
    }
}

#[allow(clippy::too_many_arguments)]
async fn enqueue(
    pool: &PgPool,
    handlers: &HandlerRegistry,
    type_code: &str,
    payload: &str,
    ticket: Option<String>,
    priority: i32,
    max_attempts: i32,
    not_before: Option<String>,
) -> Result<()> {
    if handlers.get(type_code).is_none() {
        bail!("unknown type code: {type_code}");
    }
    serde_json::from_str::<serde_json::Value>(payload).context("payload is not valid JSON")?;

    let not_before = not_before.as_deref().map(parse_not_before).transpose()?;
    let ticket = ticket.unwrap_or_else(|| Uuid::new_v4().to_string());

    let task = tasks::insert_task(
        pool,
        &ticket,
        type_code,
        payload,
        priority,
        max_attempts,
        not_before,
    )
    .await?;

    println!("Task {} enqueued (ticket={})", task.id, task.ticket);
    Ok(())
}

async fn list(pool: &PgPool, status: Option<String>) -> Result<()> {
    let rows = match status {
        Some(s) => {
            let status: TaskStatus = s
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid status: {s}"))?;
            tasks::list_tasks_by_status(pool, status).await?
        }
        None => tasks::list_recent_tasks(pool, 200).await?,
    };

    if rows.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for t in &rows {
        println!(
            "{}  {:16}  {:20}  attempt={}/{}  ticket={}",
            t.id, t.status, t.type_code, t.attempt, t.max_attempts, t.ticket
        );
    }
    Ok(())
}

async fn cancel(pool: &PgPool, id_str: &str) -> Result<()> {
    let id = Uuid::parse_str(id_str).with_context(|| format!("invalid task ID: {id_str}"))?;

    if tasks::cancel_pending_task(pool, id).await? > 0 {
        println!("Task {id} canceled.");
        return Ok(());
    }
    if tasks::request_cancel_running_task(pool, id).await? > 0 {
        println!("Task {id} cancellation requested.");
        return Ok(());
    }
    bail!("task {id} is not pending or running");
}

async fn delete(pool: &PgPool, id_str: &str) -> Result<()> {
    let id = Uuid::parse_str(id_str).with_context(|| format!("invalid task ID: {id_str}"))?;
    let rows = tasks::delete_task(pool, id).await?;
    if rows == 0 {
        bail!("task {id} not found or not in a terminal state");
    }
    println!("Task {id} deleted.");
    Ok(())
}
