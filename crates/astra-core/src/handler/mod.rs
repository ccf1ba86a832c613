//! The component-specific half of a supervisor.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use astra_model::{ComponentId, ComponentKind};

/// Typed reason a lifecycle hook refused to proceed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerFailure(pub String);

impl HandlerFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<String> for HandlerFailure {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

impl From<&str> for HandlerFailure {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}

/// Lifecycle hooks a component author implements.
///
/// The supervisor owns the handler exclusively and calls at most one hook at a time.
/// A hook returning `Err` moves the component to `Error(reason)` instead of the target state.
/// `on_shutdown` is only called after a successful `on_initialize`.
#[async_trait]
pub trait LifecycleHandler: Send + 'static {
    /// Allocate resources. Called on `Uninitialized -> Initialized` and on every restart.
    async fn on_initialize(&mut self, ctx: &ComponentContext) -> Result<(), HandlerFailure>;

    /// Become ready to serve. Called before the component is registered with discovery.
    async fn on_startup(&mut self) -> Result<(), HandlerFailure>;

    /// Called on every entry into `Running`.
    async fn on_running(&mut self) -> Result<(), HandlerFailure>;

    /// Called on `Running -> RunningOffline`.
    async fn on_running_offline(&mut self) -> Result<(), HandlerFailure>;

    /// Release resources.
    async fn on_shutdown(&mut self) -> Result<(), HandlerFailure>;
}

#[derive(Debug)]
pub(crate) enum HealthSignal {
    Heartbeat { epoch: u64 },
    Failure { epoch: u64, reason: String },
}

/// Channel a running component uses to report liveness and failures to its supervisor.
///
/// Each initialization hands out a reporter bound to a fresh epoch; signals from a reporter
/// of an earlier incarnation are ignored after a restart.
#[derive(Clone, Debug)]
pub struct HealthReporter {
    tx: mpsc::UnboundedSender<HealthSignal>,
    epoch: u64,
}

impl HealthReporter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<HealthSignal>, epoch: u64) -> Self {
        Self { tx, epoch }
    }

    /// Signal liveness. Only meaningful when the descriptor enables heartbeat monitoring.
    pub fn heartbeat(&self) {
        let _ = self.tx.send(HealthSignal::Heartbeat { epoch: self.epoch });
    }

    /// Report an unhandled failure; the supervisor moves the component to `Error(reason)`.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(HealthSignal::Failure {
            epoch: self.epoch,
            reason: reason.into(),
        });
    }

    /// Whether the owning supervisor still listens.
    pub fn is_attached(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// What a handler learns about itself when it is initialized.
#[derive(Clone, Debug)]
pub struct ComponentContext {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub health: HealthReporter,
}
