mod config;
mod manual_run_cmd;
mod schedule_cmd;
mod serve_cmd;
mod task_cmd;
#[cfg(test)]
mod test_util;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use scheduler_core::compensator::CompensatorRegistry;
use scheduler_core::engine::{Engine, EngineConfig};
use scheduler_core::handler::{HandlerFactoryRegistry, HandlerRegistry, MappingConfig};
use scheduler_db::picker::StandardPicker;
use scheduler_db::pool;

use config::SchedulerConfig;

#[derive(Parser)]
#[command(name = "scheduler", about = "Persistent batch task scheduler")]
struct Cli {
    /// Database URL (overrides SCHED_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a scheduler config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/scheduler")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the scheduler database (requires config file or env vars)
    DbInit,
    /// Run the poll loop, cron fan-out, and admin HTTP surface
    Serve {
        /// Address to bind the admin HTTP surface to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to bind the admin HTTP surface to
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Path to the declarative type_code -> factory mapping file
        #[arg(long)]
        mapping_file: Option<String>,
    },
    /// Cron schedule management
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
    /// Ad-hoc task management
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Execute a handler synchronously, without creating a task row
    ManualRun {
        /// Registered type code to execute
        type_code: String,
        /// JSON payload to pass to the handler
        payload: String,
        /// Path to the declarative type_code -> factory mapping file
        #[arg(long)]
        mapping_file: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Create a cron-driven schedule
    Create {
        /// Human-readable schedule name
        name: String,
        /// Registered type code to fan out
        #[arg(long)]
        type_code: String,
        /// Cron expression (5 or 6 field)
        #[arg(long)]
        cron: String,
        /// JSON payload passed to every fanned-out task
        #[arg(long)]
        payload: String,
    },
    /// List all schedules
    List,
    /// Enable or disable a schedule
    Toggle {
        /// Schedule ID
        id: String,
        /// Desired enabled state
        #[arg(long)]
        enabled: bool,
    },
    /// Delete a schedule (refused if tasks still reference it)
    Delete {
        /// Schedule ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Enqueue an ad-hoc task
    Enqueue {
        /// Registered type code to execute
        #[arg(long)]
        type_code: String,
        /// JSON payload passed to the handler
        #[arg(long)]
        payload: String,
        /// Idempotency ticket (defaults to a fresh UUID)
        #[arg(long)]
        ticket: Option<String>,
        /// Dispatch priority, higher runs first
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Maximum attempts before the task is left FAILED
        #[arg(long, default_value_t = 1)]
        max_attempts: i32,
        /// Earliest eligible time, 'YYYY-MM-DD HH:MM[:SS]' (UTC)
        #[arg(long)]
        not_before: Option<String>,
    },
    /// List recent tasks, optionally filtered by status
    List {
        /// Filter by status (pending, running, succeeded, failed, canceled, ...)
        #[arg(long)]
        status: Option<String>,
    },
    /// Cancel a pending or running task
    Cancel {
        /// Task ID
        id: String,
    },
    /// Delete a task in a terminal state
    Delete {
        /// Task ID
        id: String,
    },
}

/// Execute the `scheduler init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: Some(db_url.to_owned()),
        },
        ..Default::default()
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `scheduler db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `scheduler db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = SchedulerConfig::resolve(cli_db_url)?;

    println!("Initializing scheduler database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    let migrations_path = pool::default_migrations_path();
    pool::run_migrations(&db_pool, migrations_path).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("scheduler db-init complete.");
    Ok(())
}

/// Build the live handler registry for this process: compile-time factories
/// resolved through the optional declarative mapping file.
fn build_handler_registry(
    mapping_file: Option<&str>,
    resolved: &SchedulerConfig,
) -> anyhow::Result<HandlerRegistry> {
    let factories = HandlerFactoryRegistry::with_builtins();
    let mapping_config = MappingConfig {
        allowed_prefixes: resolved.runner_allowed_prefixes.clone(),
        strict: resolved.runner_strict,
    };

    match mapping_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read mapping file at {path}"))?;
            let registry = scheduler_core::handler::load_mapping(&text, &factories, &mapping_config)
                .with_context(|| format!("failed to load mapping file at {path}"))?;
            Ok(registry)
        }
        None => {
            // No mapping file: every builtin factory is bound under its own
            // name, so `sample.*` type codes work out of the box.
            let text: String = factories
                .list()
                .iter()
                .map(|name| format!("{name}={name}\n"))
                .collect();
            scheduler_core::handler::load_mapping(&text, &factories, &mapping_config)
                .context("failed to bind builtin handlers")
        }
    }
}

/// Execute the `scheduler serve` command: run the poll loop, cron fan-out,
/// and admin HTTP surface concurrently until Ctrl+C.
async fn cmd_serve(
    resolved: SchedulerConfig,
    bind: &str,
    port: u16,
    mapping_file: Option<&str>,
) -> anyhow::Result<()> {
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    let handlers = build_handler_registry(mapping_file, &resolved)?;
    let compensators = CompensatorRegistry::with_builtins(resolved.compensation_default_root.clone());
    let picker = Arc::new(StandardPicker);

    let engine = Arc::new(Engine::new(
        db_pool.clone(),
        picker,
        handlers,
        compensators,
        "scheduler-serve",
        EngineConfig {
            poll_delay: resolved.poll_delay,
            poll_batch: resolved.poll_batch,
        },
    ));

    let cancel = CancellationToken::new();

    let engine_task = tokio::spawn({
        let engine = engine.clone();
        let cancel = cancel.clone();
        async move { engine.run(cancel).await }
    });

    let cron_task = tokio::spawn({
        let pool = db_pool.clone();
        let cancel = cancel.clone();
        let cron_config = scheduler_core::cron::CronConfig {
            interval: resolved.cron_interval,
            initial_delay: resolved.cron_initial_delay,
        };
        async move { scheduler_core::cron::run(pool, cron_config, cancel).await }
    });

    // The HTTP surface validates type codes against the same live registry
    // bound to the engine, so `serve_cmd::AppState` needs its own handle.
    let admin_handlers = build_handler_registry(mapping_file, &resolved)?;
    let state = serve_cmd::AppState {
        pool: db_pool.clone(),
        handlers: Arc::new(admin_handlers),
        engine: engine.clone(),
    };

    let serve_result = serve_cmd::run_serve(state, bind, port).await;

    cancel.cancel();
    let _ = engine_task.await;
    cron_task.abort();
    db_pool.close().await;

    serve_result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve {
            bind,
            port,
            mapping_file,
        } => {
            let resolved = SchedulerConfig::resolve(cli.database_url.as_deref())?;
            cmd_serve(resolved, &bind, port, mapping_file.as_deref()).await?;
        }
        Commands::Schedule { command } => {
            let resolved = SchedulerConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let handlers = build_handler_registry(None, &resolved)?;
            let result = schedule_cmd::run_schedule_command(command, &db_pool, &handlers).await;
            db_pool.close().await;
            result?;
        }
        Commands::Task { command } => {
            let resolved = SchedulerConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let handlers = build_handler_registry(None, &resolved)?;
            let result = task_cmd::run_task_command(command, &db_pool, &handlers).await;
            db_pool.close().await;
            result?;
        }
        Commands::ManualRun {
            type_code,
            payload,
            mapping_file,
        } => {
            let resolved = SchedulerConfig::resolve(cli.database_url.as_deref())?;
            let handlers = build_handler_registry(mapping_file.as_deref(), &resolved)?;
            manual_run_cmd::run_manual_run(&handlers, &type_code, &payload).await?;
        }
    }

    Ok(())
}
