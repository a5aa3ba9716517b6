//! `scheduler manual-run`: execute a registered handler synchronously,
//! outside the normal poll loop and without creating a task/run row.

use anyhow::{Context, Result, bail};

use scheduler_core::handler::{ExecutionContext, HandlerRegistry};

pub async fn run_manual_run(handlers: &HandlerRegistry, type_code: &str, payload: &str) -> Result<()> {
    serde_json::from_str::<serde_json::Value>(payload).context("payload is not valid JSON")?;

    let Some(handler) = handlers.get(type_code) else {
        bail!("unknown type code: {type_code}");
    };

    let ctx = ExecutionContext::for_test();
    handler.execute(payload, &ctx).await?;

    println!("{type_code} executed synchronously.");
    Ok(())
}
