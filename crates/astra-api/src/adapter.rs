use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use tracing::{debug, instrument};

use astra_command::{ControllerDirectory, ControllerRef};
use astra_core::{Container, ContainerStatus};
use astra_model::{Command, CommandStatus, ComponentId, ObsId, RunId};

use crate::{error::ApiError, handler::ApiHandler};

/// [`ApiHandler`] over a running [`Container`] and the directory its controllers join.
///
/// Remembers which component owns each run so status and cancel requests can be routed
/// back by [`RunId`] alone.
pub struct ContainerApiAdapter {
    container: Arc<Container>,
    directory: ControllerDirectory,
    runs: RwLock<HashMap<RunId, ComponentId>>,
}

impl ContainerApiAdapter {
    pub fn new(container: Arc<Container>, directory: ControllerDirectory) -> Self {
        Self {
            container,
            directory,
            runs: RwLock::new(HashMap::new()),
        }
    }

    fn controller_for(&self, id: &ComponentId) -> Result<ControllerRef, ApiError> {
        if self.container.supervisor(id).is_none() {
            return Err(ApiError::ComponentNotFound(id.to_string()));
        }
        self.directory
            .get(id)
            .ok_or_else(|| ApiError::Unavailable(id.to_string()))
    }

    fn owner_of(&self, run_id: &RunId) -> Result<ComponentId, ApiError> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .cloned()
            .ok_or_else(|| ApiError::RunNotFound(run_id.to_string()))
    }

    /// Forget runs that are terminal or whose controller is gone; returns how many.
    pub fn prune(&self) -> usize {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let before = runs.len();
        runs.retain(|run_id, owner| {
            self.directory
                .get(owner)
                .and_then(|c| c.current(run_id))
                .is_some_and(|status| !status.is_terminal())
        });
        before - runs.len()
    }

    /// Number of runs the adapter can route.
    pub fn tracked_runs(&self) -> usize {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ApiHandler for ContainerApiAdapter {
    #[instrument(level = "debug", skip(self, command), fields(component = %target))]
    async fn submit_command(
        &self,
        target: &ComponentId,
        command: Command,
        obs_id: Option<ObsId>,
    ) -> Result<RunId, ApiError> {
        let controller = self.controller_for(target)?;
        let run_id = controller.submit(command, obs_id).await?;
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, target.clone());
        debug!(run_id = %run_id, "command accepted");
        Ok(run_id)
    }

    async fn command_status(&self, run_id: &RunId) -> Result<CommandStatus, ApiError> {
        let owner = self.owner_of(run_id)?;
        let controller = self.controller_for(&owner)?;
        controller
            .current(run_id)
            .ok_or_else(|| ApiError::RunNotFound(run_id.to_string()))
    }

    async fn await_completion(&self, run_id: &RunId) -> Result<CommandStatus, ApiError> {
        let owner = self.owner_of(run_id)?;
        let stream = self.controller_for(&owner)?.status_of(run_id)?;
        stream
            .terminal()
            .await
            .ok_or_else(|| ApiError::Internal(format!("status stream of {run_id} closed")))
    }

    #[instrument(level = "debug", skip(self), fields(run_id = %run_id))]
    async fn cancel_command(&self, run_id: &RunId) -> Result<bool, ApiError> {
        let owner = self.owner_of(run_id)?;
        let cancelled = self.controller_for(&owner)?.cancel(run_id).await?;
        debug!(cancelled, "cancel requested");
        Ok(cancelled)
    }

    async fn container_status(&self) -> Result<ContainerStatus, ApiError> {
        Ok(self.container.status())
    }
}
