//! Lifecycle event fan-out.
//!
//! Supervisors publish a [`LifecycleEvent`] for every transition step. Each subscriber gets
//! its own bounded queue and worker task, so a slow subscriber never stalls a supervisor;
//! events that do not fit are dropped and logged.

use std::{sync::Arc, time::SystemTime};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use astra_model::{ComponentId, LifecycleCommand, LifecycleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // requests
    TransitionRequested,
    TransitionRejected,

    // state
    StateChanged,
    HandlerFailed,

    // discovery
    Registered,
    Unregistered,
    RegistrationFailed,

    // health
    FailureReported,
    HeartbeatLost,

    // restart policy
    RestartScheduled,
    RestartExhausted,
}

/// One step of one component's lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub component: ComponentId,
    pub kind: EventKind,
    /// State after the step.
    pub state: LifecycleState,
    pub command: Option<LifecycleCommand>,
    pub reason: Option<String>,
    pub attempt: Option<u32>,
    pub at: SystemTime,
}

impl LifecycleEvent {
    pub fn new(component: ComponentId, kind: EventKind, state: LifecycleState) -> Self {
        Self {
            component,
            kind,
            state,
            command: None,
            reason: None,
            attempt: None,
            at: SystemTime::now(),
        }
    }

    pub fn with_command(mut self, command: LifecycleCommand) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// Observer of lifecycle events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &LifecycleEvent);

    fn name(&self) -> &'static str;

    fn queue_capacity(&self) -> usize {
        1024
    }
}

struct Slot {
    name: &'static str,
    tx: mpsc::Sender<Arc<LifecycleEvent>>,
}

/// Cheap-to-clone handle publishing events to every subscriber.
#[derive(Clone, Default)]
pub struct EventBus {
    slots: Arc<Vec<Slot>>,
}

impl EventBus {
    /// Spawns one worker per subscriber; must be called inside a tokio runtime.
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let slots = subscribers
            .into_iter()
            .map(|sub| {
                let (tx, mut rx) = mpsc::channel::<Arc<LifecycleEvent>>(sub.queue_capacity().max(1));
                let name = sub.name();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        sub.on_event(&event).await;
                    }
                });
                Slot { name, tx }
            })
            .collect();
        Self {
            slots: Arc::new(slots),
        }
    }

    /// A bus without subscribers.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: LifecycleEvent) {
        if self.slots.is_empty() {
            return;
        }
        let event = Arc::new(event);
        for slot in self.slots.iter() {
            if slot.tx.try_send(Arc::clone(&event)).is_err() {
                warn!(
                    subscriber = slot.name,
                    component = %event.component,
                    "event dropped for a subscriber (queue full or worker closed)"
                );
            }
        }
    }

    pub fn subscribers(&self) -> usize {
        self.slots.len()
    }
}
