use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one component instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "reason")]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Running,
    RunningOffline,
    Restarting,
    ShuttingDown,
    Terminated,
    Error(String),
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Running => "running",
            LifecycleState::RunningOffline => "runningOffline",
            LifecycleState::Restarting => "restarting",
            LifecycleState::ShuttingDown => "shuttingDown",
            LifecycleState::Terminated => "terminated",
            LifecycleState::Error(_) => "error",
        }
    }

    /// Running either online or offline; the component holds its registration.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            LifecycleState::Running | LifecycleState::RunningOffline
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LifecycleState::Error(_))
    }

    /// Transient states exist only while a transition is in progress.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LifecycleState::Restarting | LifecycleState::ShuttingDown
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Error(reason) => write!(f, "error({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Externally requested lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleCommand {
    Initialize,
    Startup,
    GoOnline,
    GoOffline,
    Shutdown,
    Restart,
}

impl LifecycleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleCommand::Initialize => "initialize",
            LifecycleCommand::Startup => "startup",
            LifecycleCommand::GoOnline => "goOnline",
            LifecycleCommand::GoOffline => "goOffline",
            LifecycleCommand::Shutdown => "shutdown",
            LifecycleCommand::Restart => "restart",
        }
    }

    /// The state a successful transition settles in.
    pub fn target(&self) -> LifecycleState {
        match self {
            LifecycleCommand::Initialize => LifecycleState::Initialized,
            LifecycleCommand::Startup => LifecycleState::Running,
            LifecycleCommand::GoOnline => LifecycleState::Running,
            LifecycleCommand::GoOffline => LifecycleState::RunningOffline,
            LifecycleCommand::Shutdown => LifecycleState::Terminated,
            LifecycleCommand::Restart => LifecycleState::Running,
        }
    }
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
