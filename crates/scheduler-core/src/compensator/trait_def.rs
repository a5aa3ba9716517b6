//! The `Compensator` trait -- undoes one side-effecting step recorded in a
//! run's compensation log.

use anyhow::Result;
use async_trait::async_trait;

/// Reverses the effect of one previously logged compensation entry.
///
/// Returns `Ok(true)` when the step was undone, `Ok(false)` when the
/// compensator determined the step cannot be undone (e.g. the underlying
/// state has since changed) -- a logical failure distinct from an
/// operational error, which the replay engine reports as
/// `CompensatorReturnedFalse` rather than bubbling up an exception.
#[async_trait]
pub trait Compensator: Send + Sync {
    /// Undo the effect described by `payload`, the same JSON string that
    /// was passed to [`crate::handler::ExecutionContext::log_compensation`].
    async fn compensate(&self, payload: &str) -> Result<bool>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Compensator) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopCompensator;

    #[async_trait]
    impl Compensator for NoopCompensator {
        async fn compensate(&self, _payload: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn compensator_is_object_safe() {
        let _c: Box<dyn Compensator> = Box::new(NoopCompensator);
    }

    #[tokio::test]
    async fn noop_compensator_reports_success() {
        let c = NoopCompensator;
        assert!(c.compensate("{}").await.unwrap());
    }
}
