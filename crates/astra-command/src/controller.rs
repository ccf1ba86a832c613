use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use tracing::debug;

use astra_model::{Command, CommandStatus, ComponentId, ObsId, RunId};

use crate::{CommandError, StatusStream};

/// Command entry point of one component.
#[async_trait]
pub trait CommandController: Send + Sync + 'static {
    fn id(&self) -> &ComponentId;

    /// Validate and accept a command.
    ///
    /// `Err` means the command was rejected and no RunId exists. Every later failure is a
    /// terminal status of the returned run.
    async fn submit(&self, command: Command, obs_id: Option<ObsId>) -> Result<RunId, CommandError>;

    fn status_of(&self, run_id: &RunId) -> Result<StatusStream, CommandError>;

    fn current(&self, run_id: &RunId) -> Option<CommandStatus>;

    /// Ask the run to stop.
    ///
    /// Returns `false` when the run was already terminal; its status is left untouched.
    async fn cancel(&self, run_id: &RunId) -> Result<bool, CommandError>;
}

pub type ControllerRef = Arc<dyn CommandController>;

/// Controllers of the components that currently accept commands.
#[derive(Clone, Default)]
pub struct ControllerDirectory {
    inner: Arc<RwLock<HashMap<ComponentId, ControllerRef>>>,
}

impl ControllerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, controller: ControllerRef) {
        debug!(component = %controller.id(), "controller attached");
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(controller.id().clone(), controller);
    }

    pub fn remove(&self, id: &ComponentId) -> Option<ControllerRef> {
        let removed = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            debug!(component = %id, "controller detached");
        }
        removed
    }

    pub fn get(&self, id: &ComponentId) -> Option<ControllerRef> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn require(&self, id: &ComponentId) -> Result<ControllerRef, CommandError> {
        self.get(id)
            .ok_or_else(|| CommandError::UnknownComponent(id.clone()))
    }

    pub fn ids(&self) -> Vec<ComponentId> {
        let mut ids: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
