//! A fixed set of supervisors built from one configuration document.

use std::collections::BTreeMap;

use tracing::{info, instrument, warn};

use astra_model::{ComponentId, ComponentKind, ContainerConfig, LifecycleCommand, LifecycleState};

use crate::{
    error::CoreError,
    events::EventBus,
    router::{BuildContext, HandlerRouter},
    supervisor::{Supervisor, SupervisorHandle},
};

/// Result of an aggregate lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateStatus {
    /// Every component reached the target state.
    Completed,
    /// Components that did not, with their individual reasons.
    Error(BTreeMap<ComponentId, String>),
}

impl AggregateStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, AggregateStatus::Completed)
    }

    pub fn failures(&self) -> Option<&BTreeMap<ComponentId, String>> {
        match self {
            AggregateStatus::Completed => None,
            AggregateStatus::Error(failed) => Some(failed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentStatus {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub state: LifecycleState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub components: Vec<ComponentStatus>,
}

impl ContainerStatus {
    pub fn all_in(&self, state: &LifecycleState) -> bool {
        self.components.iter().all(|c| &c.state == state)
    }

    pub fn state_of(&self, id: &ComponentId) -> Option<&LifecycleState> {
        self.components
            .iter()
            .find(|c| &c.id == id)
            .map(|c| &c.state)
    }
}

pub struct Container {
    name: String,
    supervisors: Vec<SupervisorHandle>,
}

impl Container {
    /// Validate the document, build every handler, then start one supervisor per component.
    ///
    /// Nothing is spawned unless the whole document is valid and every factory succeeded.
    #[instrument(level = "debug", skip_all, fields(container = %config.name))]
    pub fn new(
        config: ContainerConfig,
        router: &HandlerRouter,
        ctx: &BuildContext,
        events: EventBus,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let mut built = Vec::with_capacity(config.components.len());
        for descriptor in &config.components {
            let handler = router.build(descriptor, ctx)?;
            built.push((descriptor.clone(), handler));
        }

        let supervisors: Vec<_> = built
            .into_iter()
            .map(|(descriptor, handler)| Supervisor::spawn(descriptor, handler, ctx, events.clone()))
            .collect();

        info!(components = supervisors.len(), "container created");
        Ok(Self {
            name: config.name,
            supervisors,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn initialize_all(&self) -> AggregateStatus {
        self.fan_out(LifecycleCommand::Initialize).await
    }

    pub async fn startup_all(&self) -> AggregateStatus {
        self.fan_out(LifecycleCommand::Startup).await
    }

    /// Shut every component down regardless of individual outcomes.
    ///
    /// Components that are already terminated count as done.
    pub async fn shutdown_all(&self) -> AggregateStatus {
        self.fan_out(LifecycleCommand::Shutdown).await
    }

    #[instrument(level = "debug", skip(self), fields(container = %self.name))]
    pub async fn restart(&self, id: &ComponentId) -> Result<LifecycleState, CoreError> {
        let sup = self
            .supervisor(id)
            .ok_or_else(|| CoreError::UnknownComponent(id.clone()))?;
        Ok(sup.restart().await?)
    }

    pub fn status(&self) -> ContainerStatus {
        ContainerStatus {
            name: self.name.clone(),
            components: self
                .supervisors
                .iter()
                .map(|sup| ComponentStatus {
                    id: sup.id().clone(),
                    kind: sup.kind(),
                    state: sup.state(),
                })
                .collect(),
        }
    }

    pub fn supervisor(&self, id: &ComponentId) -> Option<&SupervisorHandle> {
        self.supervisors.iter().find(|s| s.id() == id)
    }

    /// Supervisors in document order.
    pub fn supervisors(&self) -> &[SupervisorHandle] {
        &self.supervisors
    }

    #[instrument(level = "debug", skip(self), fields(container = %self.name))]
    async fn fan_out(&self, command: LifecycleCommand) -> AggregateStatus {
        let target = command.target();

        let pending: Vec<_> = self
            .supervisors
            .iter()
            .cloned()
            .map(|sup| {
                tokio::spawn(async move {
                    if command == LifecycleCommand::Shutdown
                        && sup.state() == LifecycleState::Terminated
                    {
                        return Ok(LifecycleState::Terminated);
                    }
                    sup.send(command).await
                })
            })
            .collect();

        let mut failed = BTreeMap::new();
        for (sup, join) in self.supervisors.iter().zip(pending) {
            let reason = match join.await {
                Ok(Ok(state)) if state == target => continue,
                Ok(Ok(state)) => format!("settled in {state} instead of {target}"),
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("transition task failed: {e}"),
            };
            failed.insert(sup.id().clone(), reason);
        }

        if failed.is_empty() {
            info!(%command, "all components settled");
            AggregateStatus::Completed
        } else {
            warn!(%command, failed = failed.len(), "some components did not settle");
            AggregateStatus::Error(failed)
        }
    }
}
