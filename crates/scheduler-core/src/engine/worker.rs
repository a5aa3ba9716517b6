//! The per-task worker future: pre-execution checks, handler invocation,
//! compensation replay on failure, and the guaranteed completion write-back.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use scheduler_db::models::{Task, TaskStatus};

use super::Engine;
use super::error::EngineError;
use crate::handler::ExecutionContext;
use crate::transactional;

/// Truncate an error message to 1900 chars with collapsed whitespace, the
/// cap the Task.message column is meant to hold.
fn trim_message(msg: &str) -> String {
    let collapsed: String = msg.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() > 1900 {
        collapsed.chars().take(1900).collect()
    } else {
        collapsed
    }
}

pub(super) async fn execute_and_complete(
    engine: &Arc<Engine>,
    task: &Task,
    run_id: Uuid,
    token: CancellationToken,
) {
    engine.running().lock().await.insert(task.id);

    let outcome = transactional::bind_run_context(run_id, async {
        // Pre-execution checks.
        match transactional::is_cancel_requested(engine.pool(), task.id).await {
            Ok(true) => {
                return (
                    false,
                    Some("Canceled before start".to_owned()),
                    Some(TaskStatus::Canceled),
                );
            }
            Ok(false) => {}
            Err(e) => {
                return (false, Some(trim_message(&e.to_string())), Some(TaskStatus::Failed));
            }
        }

        let handler = match engine.handlers().get(&task.type_code) {
            Some(h) => h,
            None => {
                let err = EngineError::UnknownType(task.type_code.clone());
                return (false, Some(trim_message(&err.to_string())), Some(TaskStatus::Failed));
            }
        };

        if token.is_cancelled() {
            return (
                false,
                Some("Canceled before start".to_owned()),
                Some(TaskStatus::Canceled),
            );
        }

        let start_seq = scheduler_db::queries::operation_log::next_seq_no(engine.pool(), run_id)
            .await
            .unwrap_or(1);
        let ctx = ExecutionContext::new(engine.pool().clone(), run_id, start_seq, token.clone());

        let exec = handler.execute(&task.payload, &ctx);
        tokio::pin!(exec);

        tokio::select! {
            result = &mut exec => {
                match result {
                    Ok(()) => (true, None, Some(TaskStatus::Succeed)),
                    Err(e) => (false, Some(trim_message(&e.to_string())), None),
                }
            }
            _ = token.cancelled() => {
                (
                    false,
                    Some("Interrupted during execution".to_owned()),
                    Some(TaskStatus::Canceled),
                )
            }
        }
    })
    .await;

    let succeeded = outcome.0;
    let mut error_message = outcome.1;
    let mut final_status = outcome.2;

    // Compensation replay only applies to genuine failures, not cancellation
    // or success.
    if final_status.is_none() {
        final_status = Some(TaskStatus::Failed);
    }
    if final_status == Some(TaskStatus::Failed) {
        if let Err(replay_err) = run_compensation(engine, run_id).await {
            let addition = format!("| CompensationError: {}", trim_message(&replay_err.to_string()));
            error_message = Some(match error_message {
                Some(existing) => format!("{existing} {addition}"),
                None => addition,
            });
        }
    }

    if let Err(e) = transactional::complete(
        engine.pool(),
        task.id,
        run_id,
        succeeded,
        error_message.as_deref(),
        final_status,
    )
    .await
    {
        tracing::error!(task_id = %task.id, run_id = %run_id, error = %e, "completion write-back failed");
    }

    engine.running().lock().await.remove(&task.id);
}

/// Replay a run's compensation log in reverse sequence order, best-effort.
async fn run_compensation(engine: &Arc<Engine>, run_id: Uuid) -> anyhow::Result<()> {
    crate::compensation::replay(engine.pool(), engine.compensators(), run_id).await
}
