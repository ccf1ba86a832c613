use astra_model::{ComponentId, ConfigError, LifecycleCommand, LifecycleState};
use thiserror::Error;

/// Failures of a single lifecycle transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{command} is not valid in state {from}")]
    InvalidTransition {
        from: LifecycleState,
        command: LifecycleCommand,
    },
    #[error("lifecycle handler failed: {0}")]
    HandlerFailed(String),
    #[error("registration failed: {0}")]
    RegistrationFailed(String),
    #[error("component failed: {0}")]
    ComponentFailed(String),
    #[error("heartbeat lost after {0} ms")]
    HeartbeatLost(u64),
    #[error("supervisor for {0} is gone")]
    SupervisorGone(ComponentId),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid container document: {0}")]
    Config(#[from] ConfigError),

    #[error("no handler factory for {0}")]
    NoFactory(String),

    #[error("handler factory failed for {id}: {reason}")]
    Build { id: ComponentId, reason: String },

    #[error("unknown component: {0}")]
    UnknownComponent(ComponentId),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}
