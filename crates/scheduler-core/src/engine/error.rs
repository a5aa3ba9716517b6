use thiserror::Error;

/// Engine-level errors distinct from ordinary handler failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no handler registered for type code '{0}'")]
    UnknownType(String),
}
