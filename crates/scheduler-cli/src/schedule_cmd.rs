//! `scheduler schedule` subcommands: create/list/toggle/delete cron schedules.

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use uuid::Uuid;

use scheduler_core::handler::HandlerRegistry;
use scheduler_db::queries::{schedules, tasks};

use crate::ScheduleCommands;

pub async fn run_schedule_command(
    cmd: ScheduleCommands,
    pool: &PgPool,
    handlers: &HandlerRegistry,
) -> Result<()> {
    match cmd {
        ScheduleCommands::Create {
            name,
            type_code,
            cron,
            payload,
        } => create(pool, handlers, &name, &type_code, &cron, &payload).await,
        ScheduleCommands::List => list(pool).await,
        ScheduleCommands::Toggle { id, enabled } => toggle(pool, &id, enabled).await,
        ScheduleCommands::Delete { id } => delete(pool, &id).await,
    }
}

async fn create(
    pool: &PgPool,
    handlers: &HandlerRegistry,
    name: &str,
    type_code: &str,
    cron: &str,
    payload: &str,
) -> Result<()> {
    if handlers.get(type_code).is_none() {
        bail!("unknown type code: {type_code}");
    }
    serde_json::from_str::<serde_json::Value>(payload)
        .context("payload is not valid JSON")?;

    let schedule = schedules::insert_schedule(pool, name, type_code, cron, payload).await?;
    println!("Schedule {} created ({})", schedule.id, schedule.name);
    Ok(())
}

async fn list(pool: &PgPool) -> Result<()> {
    let rows = schedules::list_schedules(pool).await?;
    if rows.is_empty() {
        println!("No schedules.");
        return Ok(());
    }
    for s in &rows {
        let last_fire = s
            .last_fire_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_owned());
        println!(
            "{}  {:10}  {:20}  {:30}  enabled={}  last_fire={}",
            s.id, s.name, s.type_code, s.cron_expr, s.enabled, last_fire
        );
    }
    Ok(())
}

async fn toggle(pool: &PgPool, id_str: &str, enabled: bool) -> Result<()> {
    let id = Uuid::parse_str(id_str).with_context(|| format!("invalid schedule ID: {id_str}"))?;
    let rows = schedules::set_schedule_enabled(pool, id, enabled).await?;
    if rows == 0 {
        bail!("schedule {id} not found");
    }
    println!("Schedule {id} enabled={enabled}");
    Ok(())
}

async fn delete(pool: &PgPool, id_str: &str) -> Result<()> {
    let id = Uuid::parse_str(id_str).with_context(|| format!("invalid schedule ID: {id_str}"))?;
    let referencing = tasks::count_tasks_for_schedule(pool, id).await?;
    if referencing > 0 {
        bail!("schedule {id} has {referencing} task(s) referencing it; cannot delete");
    }
    let rows = schedules::delete_schedule(pool, id).await?;
    if rows == 0 {
        bail!("schedule {id} not found");
    }
    println!("Schedule {id} deleted");
    Ok(())
}
