//! Compensation replay: on a failed run, undo its logged side effects in
//! reverse order.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use scheduler_db::models::CompensationStatus;
use scheduler_db::queries::operation_log;

use crate::compensator::CompensatorRegistry;

/// Replay a run's compensation log, last action first. Best-effort: one
/// entry failing does not stop the rest from being attempted. Errors
/// bubbled up from here are purely transport/DB failures reading or writing
/// the log itself, not individual compensator failures (those are recorded
/// on the entry and swallowed).
pub async fn replay(
    pool: &PgPool,
    compensators: &CompensatorRegistry,
    run_id: Uuid,
) -> Result<()> {
    let entries = operation_log::fetch_compensations_desc(pool, run_id).await?;

    for entry in entries {
        if entry.status != CompensationStatus::Pending {
            continue;
        }

        let Some(action_type) = entry.action_type.as_deref() else {
            operation_log::mark_compensation_failed(pool, entry.id, "MISSING_ACTION_TYPE").await?;
            continue;
        };

        let Some(compensator) = compensators.get(action_type) else {
            let reason = format!("No compensator registered for actionType={action_type}");
            operation_log::mark_compensation_failed(pool, entry.id, &reason).await?;
            continue;
        };

        match compensator.compensate(&entry.action_payload).await {
            Ok(true) => {
                operation_log::mark_compensation_done(pool, entry.id).await?;
            }
            Ok(false) => {
                operation_log::mark_compensation_failed(pool, entry.id, "COMPENSATE_RETURNED_FALSE")
                    .await?;
            }
            Err(e) => {
                let reason = trim(&e.to_string());
                operation_log::mark_compensation_failed(pool, entry.id, &reason).await?;
            }
        }
    }

    Ok(())
}

fn trim(msg: &str) -> String {
    let collapsed: String = msg.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() > 1900 {
        collapsed.chars().take(1900).collect()
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_db::queries::{runs, tasks};
    use scheduler_test_utils::{create_test_db, drop_test_db};

    #[tokio::test]
    async fn replay_skips_entries_with_missing_action_type() {
        let (pool, _db_name) = create_test_db().await;
        let task = tasks::insert_task(&pool, "c-1", "builtin.noop", "{}", 0, 3, None)
            .await
            .unwrap();
        let run = runs::insert_run(&pool, task.id).await.unwrap();
        operation_log::append_operation(&pool, run.id, 0, None, "{}")
            .await
            .unwrap();

        let compensators = CompensatorRegistry::new();
        replay(&pool, &compensators, run.id).await.unwrap();

        let entries = operation_log::fetch_compensations_desc(&pool, run.id)
            .await
            .unwrap();
        assert_eq!(entries[0].status, CompensationStatus::Failed);
        assert_eq!(entries[0].last_error.as_deref(), Some("MISSING_ACTION_TYPE"));
        drop_test_db(&_db_name).await;
    }

    #[tokio::test]
    async fn replay_marks_unregistered_action_type_failed() {
        let (pool, _db_name) = create_test_db().await;
        let task = tasks::insert_task(&pool, "c-2", "builtin.noop", "{}", 0, 3, None)
            .await
            .unwrap();
        let run = runs::insert_run(&pool, task.id).await.unwrap();
        operation_log::append_operation(&pool, run.id, 0, Some("nope.missing"), "{}")
            .await
            .unwrap();

        let compensators = CompensatorRegistry::new();
        replay(&pool, &compensators, run.id).await.unwrap();

        let entries = operation_log::fetch_compensations_desc(&pool, run.id)
            .await
            .unwrap();
        assert_eq!(entries[0].status, CompensationStatus::Failed);
        assert!(entries[0].last_error.as_deref().unwrap().contains("nope.missing"));
        drop_test_db(&_db_name).await;
    }

    #[tokio::test]
    async fn replay_continues_after_one_entry_fails() {
        let (pool, _db_name) = create_test_db().await;
        let task = tasks::insert_task(&pool, "c-3", "builtin.noop", "{}", 0, 3, None)
            .await
            .unwrap();
        let run = runs::insert_run(&pool, task.id).await.unwrap();
        operation_log::append_operation(&pool, run.id, 0, None, "{}")
            .await
            .unwrap();
        operation_log::append_operation(&pool, run.id, 1, None, "{}")
            .await
            .unwrap();

        let compensators = CompensatorRegistry::new();
        replay(&pool, &compensators, run.id).await.unwrap();

        let entries = operation_log::fetch_compensations_desc(&pool, run.id)
            .await
            .unwrap();
        assert!(entries.iter().all(|e| e.status == CompensationStatus::Failed));
        drop_test_db(&_db_name).await;
    }

    #[tokio::test]
    async fn replay_skips_already_resolved_entries() {
        let (pool, _db_name) = create_test_db().await;
        let task = tasks::insert_task(&pool, "c-4", "builtin.noop", "{}", 0, 3, None)
            .await
            .unwrap();
        let run = runs::insert_run(&pool, task.id).await.unwrap();
        let entry = operation_log::append_operation(&pool, run.id, 0, None, "{}")
            .await
            .unwrap();
        operation_log::mark_compensation_done(&pool, entry.id).await.unwrap();

        let compensators = CompensatorRegistry::new();
        replay(&pool, &compensators, run.id).await.unwrap();

        let entries = operation_log::fetch_compensations_desc(&pool, run.id)
            .await
            .unwrap();
        assert_eq!(entries[0].status, CompensationStatus::Done);
        drop_test_db(&_db_name).await;
    }
}
