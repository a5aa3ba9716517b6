//! Per-run execution context handed to [`super::JobHandler::execute`].

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use scheduler_db::queries::operation_log;

/// What a handler sees of its run while executing.
///
/// Real execution is backed by a database connection pool and a run id;
/// unit tests can use [`ExecutionContext::for_test`] to exercise handler
/// logic without a database, recording compensation entries in memory
/// instead.
pub struct ExecutionContext {
    run_id: Uuid,
    cancel: CancellationToken,
    backend: Backend,
}

enum Backend {
    Db {
        pool: PgPool,
        next_seq: AtomicI32,
    },
    Test {
        log: Mutex<Vec<(Option<String>, String)>>,
    },
}

impl ExecutionContext {
    /// Build a context backed by the real database, starting compensation
    /// sequence numbers at `start_seq` (typically the run's current
    /// [`operation_log::next_seq_no`]).
    pub fn new(pool: PgPool, run_id: Uuid, start_seq: i32, cancel: CancellationToken) -> Self {
        Self {
            run_id,
            cancel,
            backend: Backend::Db {
                pool,
                next_seq: AtomicI32::new(start_seq),
            },
        }
    }

    /// Build an in-memory context for unit-testing handlers.
    pub fn for_test() -> Self {
        Self {
            run_id: Uuid::nil(),
            cancel: CancellationToken::new(),
            backend: Backend::Test {
                log: Mutex::new(Vec::new()),
            },
        }
    }

    /// The run this context belongs to.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append a compensation record. Handlers should call this immediately
    /// before (or as part of) performing a side-effecting, reversible step,
    /// so a crash mid-step still leaves an undo record behind.
    pub async fn log_compensation(&self, action_type: &str, payload: &str) -> Result<()> {
        match &self.backend {
            Backend::Db { pool, next_seq } => {
                let seq = next_seq.fetch_add(1, Ordering::SeqCst);
                operation_log::append_operation(pool, self.run_id, seq, Some(action_type), payload)
                    .await?;
            }
            Backend::Test { log } => {
                log.lock()
                    .unwrap()
                    .push((Some(action_type.to_owned()), payload.to_owned()));
            }
        }
        Ok(())
    }

    /// Returns `true` once the engine has observed a cancellation request
    /// for this task. Long-running handlers should poll this between steps.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A token handlers can pass to `tokio::select!` to wake up as soon as
    /// cancellation is requested, instead of polling.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Entries recorded so far. Only meaningful for [`Self::for_test`]
    /// contexts; returns an empty vec for database-backed contexts.
    #[cfg(test)]
    pub fn test_log(&self) -> Vec<(Option<String>, String)> {
        match &self.backend {
            Backend::Test { log } => log.lock().unwrap().clone(),
            Backend::Db { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_records_compensations_in_memory() {
        let ctx = ExecutionContext::for_test();
        ctx.log_compensation("sample.file_restore", "{\"file\":\"a\"}")
            .await
            .unwrap();
        ctx.log_compensation("sample.file_restore", "{\"file\":\"b\"}")
            .await
            .unwrap();

        let log = ctx.test_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0.as_deref(), Some("sample.file_restore"));
    }

    #[test]
    fn cancellation_starts_false_and_flips_on_cancel() {
        let ctx = ExecutionContext::for_test();
        assert!(!ctx.is_cancel_requested());
        ctx.cancellation_token().cancel();
        assert!(ctx.is_cancel_requested());
    }
}
