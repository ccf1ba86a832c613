//! Controller of a hardware-facing component.
//!
//! An HCD executes at most one command at a time. Commands submitted while one is running
//! wait in a FIFO queue and are reported as `Queued`. The hardware itself is reached through
//! a [`HardwareDriver`].

mod periodic;
pub use periodic::PeriodicHcdController;

mod state;
pub use state::CurrentState;

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use astra_core::{HealthReporter, StateStore, StoreError};
use astra_model::{Command, CommandStatus, ComponentId, ConfigData, ObsId, RunId};

use crate::{
    CommandContext, CommandController, CommandError, CommandSet, ControllerConfig, DemandMatcher,
    StateMatcher, StatusHub, StatusStream, heartbeat::spawn_heartbeat,
};

pub(crate) const OFFLINE: &str = "component offline";
const STOPPED: &str = "controller stopped";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// How a driver reports that a command took effect.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The hardware confirmed completion.
    Done,
    /// Completion is observed through published state.
    ///
    /// The command completes once every demand holds; `timeout` falls back to the
    /// controller's matcher deadline.
    Await {
        demands: Vec<DemandMatcher>,
        timeout: Option<Duration>,
    },
}

/// The hardware side of an HCD.
#[async_trait]
pub trait HardwareDriver: Send + Sync + 'static {
    /// State published before the first command runs. Its prefix is the state key.
    fn initial_state(&self) -> ConfigData;

    /// Carry out one command.
    ///
    /// `cancel` fires when the command is stopped; effects already issued to the hardware
    /// are not rolled back.
    async fn execute(
        &self,
        command: &Command,
        state: &CurrentState,
        cancel: CancellationToken,
    ) -> Result<Completion, DriverError>;
}

struct Job {
    run_id: RunId,
    command: Command,
    obs_id: Option<ObsId>,
    token: CancellationToken,
}

struct Shared {
    id: ComponentId,
    hub: StatusHub,
    state: CurrentState,
    driver: Arc<dyn HardwareDriver>,
    store: Arc<dyn StateStore>,
    config: ControllerConfig,
    tokens: Mutex<HashMap<RunId, CancellationToken>>,
    /// Accepted commands not yet finished, the executing one included.
    pending: AtomicUsize,
    /// Cleared when the worker exits.
    alive: Arc<AtomicBool>,
}

impl Shared {
    async fn execute(&self, job: Job, stop: &CancellationToken) {
        let run_id = job.run_id;
        if job.token.is_cancelled() {
            self.hub.publish(CommandStatus::Cancelled(run_id));
            self.forget(&run_id);
            return;
        }
        if !self.hub.publish(CommandStatus::Executing(run_id)) {
            self.forget(&run_id);
            return;
        }
        debug!(component = %self.id, %run_id, obs_id = ?job.obs_id, prefix = %job.command.prefix(), "executing");

        let status = tokio::select! {
            _ = job.token.cancelled() => CommandStatus::Cancelled(run_id),
            _ = stop.cancelled() => CommandStatus::Cancelled(run_id),
            status = self.drive(&job) => status,
        };
        debug!(component = %self.id, %run_id, status = %status, "finished");
        self.hub.publish(status);
        self.forget(&run_id);
    }

    async fn drive(&self, job: &Job) -> CommandStatus {
        let run_id = job.run_id;
        let call = self
            .driver
            .execute(&job.command, &self.state, job.token.clone());

        let completion = match tokio::time::timeout(self.config.command_timeout(), call).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => return CommandStatus::Error(run_id, e.to_string()),
            Err(_) => {
                warn!(component = %self.id, %run_id, "driver did not answer in time");
                return CommandStatus::NoMatch(run_id);
            }
        };

        match completion {
            Completion::Done => CommandStatus::Completed(run_id),
            Completion::Await { demands, timeout } => {
                let timeout = timeout.unwrap_or_else(|| self.config.match_timeout());
                StateMatcher::new(Arc::clone(&self.store), demands, timeout)
                    .run(&job.token)
                    .await
                    .into_status(run_id)
            }
        }
    }

    fn forget(&self, run_id: &RunId) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(run_id);
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct HcdController {
    shared: Arc<Shared>,
    commands: CommandSet,
    online: AtomicBool,
    tx: mpsc::UnboundedSender<Job>,
    stop: CancellationToken,
}

impl HcdController {
    /// Spawn the execution worker. The controller starts offline.
    pub fn start(
        id: ComponentId,
        driver: Arc<dyn HardwareDriver>,
        commands: CommandSet,
        ctx: &CommandContext,
    ) -> Self {
        let state = CurrentState::new(driver.initial_state(), Arc::clone(&ctx.store));
        let shared = Arc::new(Shared {
            hub: StatusHub::new(id.clone(), Arc::clone(&ctx.metrics)),
            id,
            state,
            driver,
            store: Arc::clone(&ctx.store),
            config: ctx.config.clone(),
            tokens: Mutex::new(HashMap::new()),
            pending: AtomicUsize::new(0),
            alive: Arc::new(AtomicBool::new(true)),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        tokio::spawn(work(Arc::clone(&shared), rx, stop.clone()));

        Self {
            shared,
            commands,
            online: AtomicBool::new(false),
            tx,
            stop,
        }
    }

    pub fn current_state(&self) -> &CurrentState {
        &self.shared.state
    }

    /// Republish the current snapshot and return it.
    #[instrument(level = "debug", skip(self), fields(component = %self.shared.id))]
    pub async fn request_current(&self) -> Result<ConfigData, StoreError> {
        let snapshot = self.shared.state.snapshot();
        self.shared.state.publish().await?;
        Ok(snapshot)
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

    /// Accepted commands that have not finished yet.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Report liveness and driver failures through `health`.
    ///
    /// With `heartbeat` set, the controller beats on that period while its worker runs and
    /// reports a failure if the worker dies.
    pub fn attach_health(&self, health: HealthReporter, heartbeat: Option<Duration>) {
        self.shared.state.attach_health(health.clone());
        if let Some(period) = heartbeat {
            spawn_heartbeat(
                self.shared.id.clone(),
                health,
                period,
                self.stop.child_token(),
                Some(Arc::clone(&self.shared.alive)),
            );
        }
    }

    /// Stop the worker; the running and queued commands end as `Cancelled`.
    pub fn stop(&self) {
        self.set_online(false);
        self.stop.cancel();
    }

    pub fn hub(&self) -> &StatusHub {
        &self.shared.hub
    }
}

impl Drop for HcdController {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[async_trait]
impl CommandController for HcdController {
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
        if self.stop.is_cancelled() {
            hub.open(CommandStatus::Error(run_id, STOPPED.into()));
            return Ok(run_id);
        }

        // Nothing below awaits: a run is either queued or terminal once submit returns.

        hub.open(CommandStatus::Accepted(run_id));
        let token = self.stop.child_token();
        self.shared
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, token.clone());
        if self.shared.pending.fetch_add(1, Ordering::SeqCst) > 0 {
            hub.publish(CommandStatus::Queued(run_id));
        }

        let job = Job {
            run_id,
            command,
            obs_id,
            token,
        };
        if self.tx.send(job).is_err() {
            hub.publish(CommandStatus::Error(run_id, STOPPED.into()));
            self.shared.forget(&run_id);
        }
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
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
        {
            token.cancel();
        }
        Ok(true)
    }
}

/// Clears the worker's liveness flag however the worker ends, panics included.
struct Exited(Arc<AtomicBool>);

impl Drop for Exited {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn work(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Job>, stop: CancellationToken) {
    let _exited = Exited(Arc::clone(&shared.alive));
    loop {
        let job = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        shared.execute(job, &stop).await;
    }

    rx.close();
    while let Ok(job) = rx.try_recv() {
        shared.hub.publish(CommandStatus::Cancelled(job.run_id));
        shared.forget(&job.run_id);
    }
    debug!(component = %shared.id, "hcd worker stopped");
}
