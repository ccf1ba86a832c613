use astra_command::CommandError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    /// The component exists but has no live controller (not initialized, or shut down).
    #[error("component unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Invalid(e) => ApiError::InvalidRequest(e.to_string()),
            CommandError::UnknownRun(run_id) => ApiError::RunNotFound(run_id.to_string()),
            CommandError::UnknownComponent(id) => ApiError::ComponentNotFound(id.to_string()),
            CommandError::InvalidConfig(msg) => ApiError::Internal(msg),
        }
    }
}
