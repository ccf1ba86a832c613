//! One supervisor per component.
//!
//! The supervisor is an actor: it owns the component's [`LifecycleHandler`], its lifecycle
//! state and its discovery registration, and processes one request at a time. Callers talk
//! to it through a [`SupervisorHandle`]; the current state is exposed as a `watch` snapshot
//! that is replaced atomically on every transition.

mod transition;

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, sleep, sleep_until},
};
use tracing::{debug, error, info, instrument, trace, warn};

use astra_model::{
    ComponentDescriptor, ComponentId, ComponentKind, LifecycleCommand, LifecycleState,
    Registration, RestartPolicy,
};

use crate::{
    collab::Discovery,
    error::LifecycleError,
    events::{EventBus, EventKind, LifecycleEvent},
    handler::{ComponentContext, HandlerFailure, HealthReporter, HealthSignal, LifecycleHandler},
    metrics::MetricsHandle,
    router::BuildContext,
    system::default_location,
};

const REQUEST_QUEUE: usize = 32;

struct Request {
    command: LifecycleCommand,
    reply: oneshot::Sender<Result<LifecycleState, LifecycleError>>,
}

/// Client side of a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    id: ComponentId,
    kind: ComponentKind,
    tx: mpsc::Sender<Request>,
    state: watch::Receiver<LifecycleState>,
}

impl SupervisorHandle {
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Latest settled or in-progress state.
    pub fn state(&self) -> LifecycleState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// Request a transition and wait until it completes or fails.
    ///
    /// Returns the state the component settled in.
    #[instrument(level = "debug", skip(self), fields(component = %self.id))]
    pub async fn send(&self, command: LifecycleCommand) -> Result<LifecycleState, LifecycleError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request { command, reply })
            .await
            .map_err(|_| LifecycleError::SupervisorGone(self.id.clone()))?;
        rx.await
            .map_err(|_| LifecycleError::SupervisorGone(self.id.clone()))?
    }

    pub async fn initialize(&self) -> Result<LifecycleState, LifecycleError> {
        self.send(LifecycleCommand::Initialize).await
    }

    pub async fn startup(&self) -> Result<LifecycleState, LifecycleError> {
        self.send(LifecycleCommand::Startup).await
    }

    pub async fn go_online(&self) -> Result<LifecycleState, LifecycleError> {
        self.send(LifecycleCommand::GoOnline).await
    }

    pub async fn go_offline(&self) -> Result<LifecycleState, LifecycleError> {
        self.send(LifecycleCommand::GoOffline).await
    }

    pub async fn shutdown(&self) -> Result<LifecycleState, LifecycleError> {
        self.send(LifecycleCommand::Shutdown).await
    }

    pub async fn restart(&self) -> Result<LifecycleState, LifecycleError> {
        self.send(LifecycleCommand::Restart).await
    }

    /// Wait until the state satisfies `pred`.
    pub async fn wait_for(
        &self,
        pred: impl FnMut(&LifecycleState) -> bool,
    ) -> Result<LifecycleState, LifecycleError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(pred)
            .await
            .map_err(|_| LifecycleError::SupervisorGone(self.id.clone()))?;
        Ok((*state).clone())
    }
}

pub struct Supervisor {
    descriptor: ComponentDescriptor,
    handler: Box<dyn LifecycleHandler>,
    discovery: Arc<dyn Discovery>,
    metrics: MetricsHandle,
    events: EventBus,

    state_tx: watch::Sender<LifecycleState>,
    health_tx: mpsc::UnboundedSender<HealthSignal>,
    health_rx: mpsc::UnboundedReceiver<HealthSignal>,

    /// `on_initialize` succeeded and `on_shutdown` has not run since.
    allocated: bool,
    registered: bool,
    /// Incarnation counter; bumped on every initialize.
    epoch: u64,
    /// Automatic restarts since the last explicit restart.
    restarts: u32,
    last_heartbeat: Instant,
}

impl Supervisor {
    /// Start the supervisor task for one component in `Uninitialized`.
    pub fn spawn(
        descriptor: ComponentDescriptor,
        handler: Box<dyn LifecycleHandler>,
        ctx: &BuildContext,
        events: EventBus,
    ) -> SupervisorHandle {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        let (state_tx, state_rx) = watch::channel(LifecycleState::Uninitialized);
        let (health_tx, health_rx) = mpsc::unbounded_channel();

        let handle = SupervisorHandle {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            tx,
            state: state_rx,
        };

        let supervisor = Supervisor {
            descriptor,
            handler,
            discovery: Arc::clone(&ctx.discovery),
            metrics: Arc::clone(&ctx.metrics),
            events,
            state_tx,
            health_tx,
            health_rx,
            allocated: false,
            registered: false,
            epoch: 0,
            restarts: 0,
            last_heartbeat: Instant::now(),
        };
        tokio::spawn(supervisor.run(rx));
        handle
    }

    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        debug!(component = %self.descriptor.id, kind = %self.descriptor.kind, "supervisor started");
        loop {
            let deadline = self.heartbeat_deadline();
            tokio::select! {
                request = requests.recv() => {
                    let Some(Request { command, reply }) = request else { break };
                    let result = self.apply(command).await;
                    let _ = reply.send(result);
                }
                Some(signal) = self.health_rx.recv() => self.on_health(signal).await,
                _ = expiry(deadline) => self.on_heartbeat_lost().await,
            }
        }
        // Every handle is gone; nobody can shut the component down any more.
        self.deregister().await;
        debug!(component = %self.descriptor.id, "supervisor stopped");
    }

    fn id(&self) -> &ComponentId {
        &self.descriptor.id
    }

    fn current(&self) -> LifecycleState {
        self.state_tx.borrow().clone()
    }

    fn event(&self, kind: EventKind) -> LifecycleEvent {
        LifecycleEvent::new(self.id().clone(), kind, self.current())
    }

    fn set_state(&mut self, state: LifecycleState) {
        debug!(component = %self.id(), state = %state, "state changed");
        self.metrics.record_transition(self.id(), &state);
        self.state_tx.send_replace(state);
        self.events.publish(self.event(EventKind::StateChanged));
    }

    async fn apply(&mut self, command: LifecycleCommand) -> Result<LifecycleState, LifecycleError> {
        let from = self.current();
        if let Err(err) = transition::check(&from, command) {
            warn!(component = %self.id(), %command, state = %from, "transition rejected");
            self.events.publish(
                self.event(EventKind::TransitionRejected)
                    .with_command(command)
                    .with_reason(err.to_string()),
            );
            return Err(err);
        }
        self.events
            .publish(self.event(EventKind::TransitionRequested).with_command(command));

        match command {
            LifecycleCommand::Initialize => self.initialize().await,
            LifecycleCommand::Startup => self.startup().await,
            LifecycleCommand::GoOffline => self.go_offline().await,
            LifecycleCommand::GoOnline => self.enter_running().await,
            LifecycleCommand::Shutdown => self.shutdown().await,
            LifecycleCommand::Restart => {
                self.restarts = 0;
                self.restart().await
            }
        }?;
        Ok(self.current())
    }

    async fn initialize(&mut self) -> Result<(), LifecycleError> {
        self.epoch += 1;
        let ctx = ComponentContext {
            id: self.id().clone(),
            kind: self.descriptor.kind,
            health: HealthReporter::new(self.health_tx.clone(), self.epoch),
        };
        match self.handler.on_initialize(&ctx).await {
            Ok(()) => {
                self.allocated = true;
                self.set_state(LifecycleState::Initialized);
                Ok(())
            }
            Err(f) => Err(self.fail(LifecycleError::HandlerFailed(f.0)).await),
        }
    }

    async fn startup(&mut self) -> Result<(), LifecycleError> {
        if let Err(f) = self.handler.on_startup().await {
            return Err(self.fail(LifecycleError::HandlerFailed(f.0)).await);
        }

        let location = self
            .descriptor
            .location
            .clone()
            .unwrap_or_else(|| default_location(self.id()));
        let registration = Registration::new(self.id().clone(), location, self.descriptor.service);
        if let Err(e) = self.discovery.register(registration).await {
            return Err(self.fail(LifecycleError::RegistrationFailed(e.to_string())).await);
        }
        self.registered = true;
        self.events.publish(self.event(EventKind::Registered));

        self.enter_running().await
    }

    async fn enter_running(&mut self) -> Result<(), LifecycleError> {
        if let Err(f) = self.handler.on_running().await {
            return Err(self.fail(LifecycleError::HandlerFailed(f.0)).await);
        }
        self.last_heartbeat = Instant::now();
        self.set_state(LifecycleState::Running);
        Ok(())
    }

    async fn go_offline(&mut self) -> Result<(), LifecycleError> {
        if let Err(f) = self.handler.on_running_offline().await {
            return Err(self.fail(LifecycleError::HandlerFailed(f.0)).await);
        }
        self.set_state(LifecycleState::RunningOffline);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        let was_error = self.current().is_error();
        self.set_state(LifecycleState::ShuttingDown);
        let released = self.release().await;
        self.deregister().await;

        match released {
            Ok(()) => {
                self.set_state(LifecycleState::Terminated);
                Ok(())
            }
            Err(f) if was_error => {
                warn!(component = %self.id(), reason = %f, "shutdown hook failed; terminating errored component anyway");
                self.set_state(LifecycleState::Terminated);
                Ok(())
            }
            Err(f) => Err(self.fail(LifecycleError::HandlerFailed(f.0)).await),
        }
    }

    /// Release, deregister and replay initialize/startup.
    async fn restart(&mut self) -> Result<(), LifecycleError> {
        self.set_state(LifecycleState::Restarting);
        if let Err(f) = self.release().await {
            warn!(component = %self.id(), reason = %f, "shutdown hook failed during restart");
        }
        self.deregister().await;
        self.set_state(LifecycleState::Uninitialized);

        self.initialize().await?;
        self.startup().await
    }

    async fn release(&mut self) -> Result<(), HandlerFailure> {
        if !self.allocated {
            return Ok(());
        }
        self.allocated = false;
        self.handler.on_shutdown().await
    }

    async fn deregister(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        match self.discovery.unregister(self.id()).await {
            Ok(()) => self.events.publish(self.event(EventKind::Unregistered)),
            Err(e) => warn!(component = %self.id(), reason = %e, "unregister failed"),
        }
    }

    /// Move to `Error(reason)` and drop the registration.
    async fn fail(&mut self, err: LifecycleError) -> LifecycleError {
        let kind = match &err {
            LifecycleError::RegistrationFailed(_) => EventKind::RegistrationFailed,
            LifecycleError::HeartbeatLost(_) => EventKind::HeartbeatLost,
            LifecycleError::ComponentFailed(_) => EventKind::FailureReported,
            _ => EventKind::HandlerFailed,
        };
        error!(component = %self.id(), reason = %err, "component failed");
        self.deregister().await;
        self.set_state(LifecycleState::Error(err.to_string()));
        self.events
            .publish(self.event(kind).with_reason(err.to_string()));
        err
    }

    async fn on_health(&mut self, signal: HealthSignal) {
        match signal {
            HealthSignal::Heartbeat { epoch } if epoch == self.epoch => {
                self.last_heartbeat = Instant::now();
            }
            HealthSignal::Failure { epoch, reason } if epoch == self.epoch => {
                let state = self.current();
                if matches!(
                    state,
                    LifecycleState::Initialized | LifecycleState::Running | LifecycleState::RunningOffline
                ) {
                    self.runtime_failure(LifecycleError::ComponentFailed(reason))
                        .await;
                } else {
                    debug!(component = %self.id(), state = %state, reason = %reason, "failure signal ignored");
                }
            }
            _ => trace!(component = %self.id(), "stale health signal ignored"),
        }
    }

    async fn on_heartbeat_lost(&mut self) {
        let ms = self.descriptor.heartbeat_ms.unwrap_or_default();
        warn!(component = %self.id(), heartbeat_ms = ms, "heartbeat lost");
        self.runtime_failure(LifecycleError::HeartbeatLost(ms)).await;
    }

    async fn runtime_failure(&mut self, err: LifecycleError) {
        let _ = self.fail(err).await;
        self.auto_restart().await;
    }

    async fn auto_restart(&mut self) {
        let RestartPolicy::OnError {
            max_restarts,
            delay_ms,
        } = self.descriptor.restart
        else {
            return;
        };

        while self.current().is_error() {
            if self.restarts >= max_restarts {
                warn!(component = %self.id(), max_restarts, "restart policy exhausted");
                self.events.publish(
                    self.event(EventKind::RestartExhausted)
                        .with_attempt(self.restarts),
                );
                return;
            }
            self.restarts += 1;
            info!(component = %self.id(), attempt = self.restarts, delay_ms, "restart scheduled");
            self.events.publish(
                self.event(EventKind::RestartScheduled)
                    .with_attempt(self.restarts),
            );

            sleep(Duration::from_millis(delay_ms)).await;
            if let Err(err) = self.restart().await {
                warn!(component = %self.id(), attempt = self.restarts, reason = %err, "automatic restart failed");
            }
        }
    }

    fn heartbeat_deadline(&self) -> Option<Instant> {
        let ms = self.descriptor.heartbeat_ms?;
        if !self.current().is_running() {
            return None;
        }
        Some(self.last_heartbeat + Duration::from_millis(ms))
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
