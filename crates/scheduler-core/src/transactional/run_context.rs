//! Scoped binding of the current run identity.
//!
//! A handler calls [`current_run_id`] to log a compensation without the run
//! identity being threaded through its own `execute` signature. The binding
//! is task-local, not a process-wide global, so concurrent workers never see
//! each other's run id.

use uuid::Uuid;

tokio::task_local! {
    static RUN_ID: Uuid;
}

/// Run `f` with `run_id` bound for its entire duration (and anything it
/// awaits). The binding is dropped automatically when the future completes.
pub async fn bind_run_context<F, T>(run_id: Uuid, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    RUN_ID.scope(run_id, f).await
}

/// The run id bound by the innermost enclosing [`bind_run_context`] call.
///
/// Panics if called outside a bound scope; every worker future always binds
/// one before invoking a handler, so this indicates a programming error, not
/// a runtime condition callers should handle.
pub fn current_run_id() -> Uuid {
    RUN_ID.with(|id| *id)
}

/// Same as [`current_run_id`] but returns `None` instead of panicking,
/// for callers that may run outside a bound scope (e.g. tests).
pub fn try_current_run_id() -> Option<Uuid> {
    RUN_ID.try_with(|id| *id).ok()
}
