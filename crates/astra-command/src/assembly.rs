//! Command entry point of an assembly.
//!
//! Every accepted command runs on its own task. What the task does is decided by the
//! assembly's [`AssemblyBehavior`]: finish locally, fan the command out to subordinates,
//! or wait for published state.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use astra_core::{HealthReporter, StateStore};
use astra_model::{Command, CommandStatus, ComponentId, ObsId, RunId};

use crate::{
    CommandContext, CommandController, CommandError, CommandSet, ControllerConfig,
    ControllerDirectory, DemandMatcher, DistributorController, StateMatcher, StatusHub,
    StatusStream, hcd::OFFLINE, heartbeat::spawn_heartbeat,
};

/// What an assembly does with one accepted command.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Complete,
    Fail(String),
    /// Fan `command` out to `targets`, which must be subordinates of the assembly.
    Forward {
        targets: Vec<ComponentId>,
        command: Command,
    },
    /// Complete once published state satisfies every demand.
    Match {
        demands: Vec<DemandMatcher>,
        timeout: Option<Duration>,
    },
}

/// The component-specific command logic of an assembly.
#[async_trait]
pub trait AssemblyBehavior: Send + Sync + 'static {
    async fn plan(&self, command: &Command, subordinates: &[ComponentId]) -> Plan;
}

/// Forwards every command unchanged to all subordinates.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardAll;

#[async_trait]
impl AssemblyBehavior for ForwardAll {
    async fn plan(&self, command: &Command, subordinates: &[ComponentId]) -> Plan {
        Plan::Forward {
            targets: subordinates.to_vec(),
            command: command.clone(),
        }
    }
}

struct Shared {
    id: ComponentId,
    hub: StatusHub,
    behavior: Arc<dyn AssemblyBehavior>,
    subordinates: Vec<ComponentId>,
    directory: ControllerDirectory,
    store: Arc<dyn StateStore>,
    config: ControllerConfig,
    runs: Mutex<HashMap<RunId, CancellationToken>>,
}

impl Shared {
    async fn run(self: Arc<Self>, run_id: RunId, command: Command, obs_id: Option<ObsId>, token: CancellationToken) {
        if token.is_cancelled() || !self.hub.publish(CommandStatus::Executing(run_id)) {
            self.finish(CommandStatus::Cancelled(run_id));
            return;
        }

        let plan = tokio::select! {
            _ = token.cancelled() => {
                self.finish(CommandStatus::Cancelled(run_id));
                return;
            }
            plan = self.behavior.plan(&command, &self.subordinates) => plan,
        };
        debug!(component = %self.id, %run_id, ?obs_id, "planned");

        let status = match plan {
            Plan::Complete => CommandStatus::Completed(run_id),
            Plan::Fail(reason) => CommandStatus::Error(run_id, reason),
            Plan::Forward { targets, command } => match self.resolve(&targets) {
                Ok(refs) => {
                    DistributorController::new(run_id, refs, self.config.command_timeout(), token.clone())
                        .distribute(&command, obs_id)
                        .await
                }
                Err(reason) => CommandStatus::Error(run_id, reason),
            },
            Plan::Match { demands, timeout } => {
                let timeout = timeout.unwrap_or_else(|| self.config.match_timeout());
                StateMatcher::new(Arc::clone(&self.store), demands, timeout)
                    .run(&token)
                    .await
                    .into_status(run_id)
            }
        };
        self.finish(status);
    }

    fn resolve(&self, targets: &[ComponentId]) -> Result<Vec<crate::ControllerRef>, String> {
        targets
            .iter()
            .map(|t| {
                if !self.subordinates.contains(t) {
                    return Err(format!("{t} is not a subordinate of {}", self.id));
                }
                self.directory
                    .get(t)
                    .ok_or_else(|| format!("subordinate {t} is not accepting commands"))
            })
            .collect()
    }

    fn finish(&self, status: CommandStatus) {
        let run_id = status.run_id();
        if self.hub.publish(status.clone()) {
            debug!(component = %self.id, %run_id, status = %status, "finished");
        }
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&run_id);
    }
}

pub struct AssemblyController {
    shared: Arc<Shared>,
    commands: CommandSet,
    online: AtomicBool,
    stop: CancellationToken,
}

impl AssemblyController {
    /// The controller starts offline.
    pub fn new(
        id: ComponentId,
        subordinates: Vec<ComponentId>,
        behavior: Arc<dyn AssemblyBehavior>,
        commands: CommandSet,
        directory: ControllerDirectory,
        ctx: &CommandContext,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                hub: StatusHub::new(id.clone(), Arc::clone(&ctx.metrics)),
                id,
                behavior,
                subordinates,
                directory,
                store: Arc::clone(&ctx.store),
                config: ctx.config.clone(),
                runs: Mutex::new(HashMap::new()),
            }),
            commands,
            online: AtomicBool::new(false),
            stop: CancellationToken::new(),
        }
    }

    pub fn subordinates(&self) -> &[ComponentId] {
        &self.shared.subordinates
    }

    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            info!(component = %self.shared.id, online, "command acceptance changed");
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Beat on `health` every `heartbeat` until the controller stops.
    pub fn attach_health(&self, health: HealthReporter, heartbeat: Option<Duration>) {
        if let Some(period) = heartbeat {
            spawn_heartbeat(self.shared.id.clone(), health, period, self.stop.child_token(), None);
        }
    }

    /// Stop accepting commands and cancel everything in flight.
    pub fn stop(&self) {
        self.set_online(false);
        self.stop.cancel();
    }

    /// Commands accepted and not finished yet.
    pub fn in_flight(&self) -> usize {
        self.shared
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn hub(&self) -> &StatusHub {
        &self.shared.hub
    }
}

impl Drop for AssemblyController {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[async_trait]
impl CommandController for AssemblyController {
    fn id(&self) -> &ComponentId {
        &self.shared.id
    }

    #[instrument(level = "debug", skip(self, command), fields(component = %self.shared.id, prefix = %command.prefix()))]
    async fn submit(&self, command: Command, obs_id: Option<ObsId>) -> Result<RunId, CommandError> {
        self.commands.validate(&command)?;
        let run_id = RunId::new();
        let hub = &self.shared.hub;

        if !self.is_online() {
            debug!(%run_id, "rejected while offline");
            hub.open(CommandStatus::Error(run_id, OFFLINE.into()));
            return Ok(run_id);
        }

        hub.open(CommandStatus::Accepted(run_id));
        let token = self.stop.child_token();
        self.shared
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, token.clone());
        tokio::spawn(Arc::clone(&self.shared).run(run_id, command, obs_id, token));
        Ok(run_id)
    }

    fn status_of(&self, run_id: &RunId) -> Result<StatusStream, CommandError> {
        self.shared
            .hub
            .status_of(run_id)
            .ok_or(CommandError::UnknownRun(*run_id))
    }

    fn current(&self, run_id: &RunId) -> Option<CommandStatus> {
        self.shared.hub.current(run_id)
    }

    #[instrument(level = "debug", skip(self), fields(component = %self.shared.id))]
    async fn cancel(&self, run_id: &RunId) -> Result<bool, CommandError> {
        let hub = &self.shared.hub;
        if hub.current(run_id).is_none() {
            return Err(CommandError::UnknownRun(*run_id));
        }
        if !hub.publish(CommandStatus::Cancelled(*run_id)) {
            return Ok(false);
        }
        if let Some(token) = self
            .shared
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
        {
            token.cancel();
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::InMemoryStateStore;
    use astra_model::{ConfigData, ConfigKey, Units};

    struct Scripted(Plan);

    #[async_trait]
    impl AssemblyBehavior for Scripted {
        async fn plan(&self, _: &Command, _: &[ComponentId]) -> Plan {
            self.0.clone()
        }
    }

    fn command() -> Command {
        Command::setup(ConfigData::new(ConfigKey::new("iris.imager.filter").unwrap()).with("name", "J", Units::NoUnits))
    }

    fn assembly(plan: Plan, subordinates: Vec<ComponentId>) -> AssemblyController {
        let ctx = CommandContext::new(Arc::new(InMemoryStateStore::new()));
        let asm = AssemblyController::new(
            ComponentId::new("iris", "imager"),
            subordinates,
            Arc::new(Scripted(plan)),
            CommandSet::permissive(),
            ControllerDirectory::new(),
            &ctx,
        );
        asm.set_online(true);
        asm
    }

    async fn terminal(asm: &AssemblyController, run: RunId) -> CommandStatus {
        asm.status_of(&run).unwrap().terminal().await.unwrap()
    }

    #[tokio::test]
    async fn local_plans_finish_locally() {
        let asm = assembly(Plan::Complete, vec![]);
        let run = asm.submit(command(), None).await.unwrap();
        assert_eq!(terminal(&asm, run).await, CommandStatus::Completed(run));

        let asm = assembly(Plan::Fail("filter wheel jammed".into()), vec![]);
        let run = asm.submit(command(), None).await.unwrap();
        assert_eq!(
            terminal(&asm, run).await,
            CommandStatus::Error(run, "filter wheel jammed".into())
        );
    }

    #[tokio::test]
    async fn forwarding_to_missing_subordinate_is_an_error() {
        let sub = ComponentId::new("iris", "filter");
        let asm = assembly(
            Plan::Forward {
                targets: vec![sub.clone()],
                command: command(),
            },
            vec![sub],
        );
        let run = asm.submit(command(), None).await.unwrap();
        assert!(matches!(terminal(&asm, run).await, CommandStatus::Error(..)));
    }

    #[tokio::test]
    async fn forwarding_outside_subordinates_is_refused() {
        let asm = assembly(
            Plan::Forward {
                targets: vec![ComponentId::new("tcs", "mount")],
                command: command(),
            },
            vec![],
        );
        let run = asm.submit(command(), None).await.unwrap();
        let CommandStatus::Error(_, reason) = terminal(&asm, run).await else {
            panic!("expected an error");
        };
        assert!(reason.contains("not a subordinate"));
    }

    #[tokio::test]
    async fn offline_assembly_mints_run_with_error() {
        let asm = assembly(Plan::Complete, vec![]);
        asm.set_online(false);
        let run = asm.submit(command(), None).await.unwrap();
        assert_eq!(asm.current(&run), Some(CommandStatus::Error(run, OFFLINE.into())));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_a_waiting_match() {
        let demand = ConfigData::new(ConfigKey::new("iris.imager").unwrap()).with("ready", true, Units::NoUnits);
        let asm = assembly(
            Plan::Match {
                demands: vec![DemandMatcher::new(demand)],
                timeout: Some(Duration::from_secs(60)),
            },
            vec![],
        );
        let run = asm.submit(command(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(asm.cancel(&run).await.unwrap());
        assert_eq!(terminal(&asm, run).await, CommandStatus::Cancelled(run));
        assert!(!asm.cancel(&run).await.unwrap());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(asm.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_state_ends_in_no_match() {
        let demand = ConfigData::new(ConfigKey::new("iris.imager").unwrap()).with("ready", true, Units::NoUnits);
        let asm = assembly(
            Plan::Match {
                demands: vec![DemandMatcher::new(demand)],
                timeout: Some(Duration::from_secs(1)),
            },
            vec![],
        );
        let run = asm.submit(command(), None).await.unwrap();
        assert_eq!(terminal(&asm, run).await, CommandStatus::NoMatch(run));
    }
}
