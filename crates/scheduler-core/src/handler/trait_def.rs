//! The `JobHandler` trait -- the adapter interface for task execution logic.
//!
//! Each concrete handler implements this trait. The trait is object-safe so
//! it can be stored as `Box<dyn JobHandler>` in the [`super::HandlerRegistry`].

use anyhow::Result;
use async_trait::async_trait;

use super::context::ExecutionContext;

/// Adapter interface for running a task's business logic.
///
/// Implementors receive the task's JSON payload and an [`ExecutionContext`]
/// through which they can append compensation records, observe cooperative
/// cancellation, and emit structured progress. A handler that errors, panics
/// (caught by the engine), or whose task is canceled mid-run triggers
/// compensation replay for everything it has already logged.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the task. `payload` is the task's raw JSON payload string.
    async fn execute(&self, payload: &str, ctx: &ExecutionContext) -> Result<()>;
}

// Compile-time assertion: JobHandler must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn JobHandler) {}
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::context::ExecutionContext;

    struct NoopHandler;

    #[async_trait]
    impl JobHandler for NoopHandler {
        async fn execute(&self, _payload: &str, _ctx: &ExecutionContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn handler_is_object_safe() {
        let _handler: Box<dyn JobHandler> = Box::new(NoopHandler);
    }

    #[tokio::test]
    async fn noop_handler_succeeds() {
        let handler = NoopHandler;
        let ctx = ExecutionContext::for_test();
        handler.execute("{}", &ctx).await.unwrap();
    }
}
