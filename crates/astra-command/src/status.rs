//! Per-controller command status table.
//!
//! Every run gets a `watch` cell. Publishing is monotone: once a run holds a terminal
//! status, later publications for it are ignored, so the first terminal status wins.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tokio::{sync::watch, time::Instant};
use tracing::trace;

use astra_core::MetricsHandle;
use astra_model::{CommandStatus, ComponentId, RunId};

struct Entry {
    tx: watch::Sender<CommandStatus>,
    opened: Instant,
}

#[derive(Clone)]
pub struct StatusHub {
    component: ComponentId,
    metrics: MetricsHandle,
    runs: Arc<RwLock<HashMap<RunId, Entry>>>,
}

impl StatusHub {
    pub fn new(component: ComponentId, metrics: MetricsHandle) -> Self {
        Self {
            component,
            metrics,
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start tracking the run `initial` belongs to.
    pub fn open(&self, initial: CommandStatus) {
        let run_id = initial.run_id();
        let terminal = initial.outcome();
        let (tx, _) = watch::channel(initial);
        let opened = Instant::now();

        self.metrics.record_command_submitted(&self.component);
        if let Some(outcome) = terminal {
            self.metrics
                .record_command_finished(&self.component, outcome, opened.elapsed());
        }
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, Entry { tx, opened });
    }

    /// Record a new status for its run.
    ///
    /// Returns `false` when the run is unknown or already terminal.
    pub fn publish(&self, status: CommandStatus) -> bool {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = runs.get(&status.run_id()) else {
            return false;
        };

        let outcome = status.outcome();
        let run_id = status.run_id();
        let name = status.name();
        let applied = entry.tx.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = status;
            true
        });

        if applied {
            trace!(component = %self.component, %run_id, status = name, "command status");
            if let Some(outcome) = outcome {
                self.metrics.record_command_finished(
                    &self.component,
                    outcome,
                    entry.opened.elapsed(),
                );
            }
        }
        applied
    }

    pub fn current(&self, run_id: &RunId) -> Option<CommandStatus> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        runs.get(run_id).map(|e| e.tx.borrow().clone())
    }

    pub fn is_terminal(&self, run_id: &RunId) -> bool {
        self.current(run_id).is_some_and(|s| s.is_terminal())
    }

    pub fn status_of(&self, run_id: &RunId) -> Option<StatusStream> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        runs.get(run_id).map(|e| StatusStream::new(e.tx.subscribe()))
    }

    /// Drop every terminal run.
    pub fn prune(&self) -> usize {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let before = runs.len();
        runs.retain(|_, e| !e.tx.borrow().is_terminal());
        before - runs.len()
    }

    pub fn len(&self) -> usize {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Status updates of one run, ending after the first terminal status.
///
/// The stream starts with the run's current status. Intermediate statuses may be
/// coalesced; the terminal status is always delivered.
pub struct StatusStream {
    rx: watch::Receiver<CommandStatus>,
    started: bool,
    done: bool,
}

impl StatusStream {
    fn new(rx: watch::Receiver<CommandStatus>) -> Self {
        Self {
            rx,
            started: false,
            done: false,
        }
    }

    pub async fn next(&mut self) -> Option<CommandStatus> {
        if self.done {
            return None;
        }
        if self.started && self.rx.changed().await.is_err() {
            self.done = true;
            return None;
        }
        self.started = true;

        let status = self.rx.borrow_and_update().clone();
        self.done = status.is_terminal();
        Some(status)
    }

    /// Skip to the terminal status.
    pub async fn terminal(mut self) -> Option<CommandStatus> {
        while let Some(status) = self.next().await {
            if status.is_terminal() {
                return Some(status);
            }
        }
        None
    }
}
