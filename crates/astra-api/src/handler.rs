use async_trait::async_trait;
use astra_core::ContainerStatus;
use astra_model::{Command, CommandStatus, ComponentId, ObsId, RunId};

use crate::error::ApiError;

/// Command submission API handler.
///
/// Abstracts the backend so transports can be mounted over the provided
/// [`ContainerApiAdapter`](crate::ContainerApiAdapter) or a custom handler that adds
/// its own checks (auth, rate limiting, ...).
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Submit a command to one component and return its correlation key.
    async fn submit_command(
        &self,
        target: &ComponentId,
        command: Command,
        obs_id: Option<ObsId>,
    ) -> Result<RunId, ApiError>;

    /// Latest known status of a run.
    async fn command_status(&self, run_id: &RunId) -> Result<CommandStatus, ApiError>;

    /// Wait until the run reaches a terminal status.
    async fn await_completion(&self, run_id: &RunId) -> Result<CommandStatus, ApiError>;

    /// Returns `false` when the run had already finished.
    async fn cancel_command(&self, run_id: &RunId) -> Result<bool, ApiError>;

    async fn container_status(&self) -> Result<ContainerStatus, ApiError>;
}
