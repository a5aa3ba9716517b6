use thiserror::Error;

/// Errors from parsing or evaluating a schedule's cron expression.
#[derive(Debug, Error)]
pub enum CronError {
    #[error("invalid cron expression '{0}': {1}")]
    InvalidExpression(String, String),
}
