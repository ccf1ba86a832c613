//! Fan-out of one command to several subordinates.
//!
//! Each subordinate mints its own run; the distributor maps every child run back to the
//! parent run and folds the children's terminal statuses into one. An error, cancellation or
//! missed match from any child finalizes the parent immediately, but the remaining children
//! are left to finish on their own.

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use astra_model::{Command, CommandStatus, ObsId, RunId};

use crate::ControllerRef;

/// Fold subordinate statuses into the parent's status.
///
/// `None` (or a non-terminal status) marks a child that is still running. Severity:
/// error, then cancelled, then no-match, each deciding the parent as soon as one child
/// reports it; otherwise a pending child keeps the parent pending, and the parent completes
/// only when every child completed.
pub fn aggregate(parent: RunId, children: &[Option<CommandStatus>]) -> Option<CommandStatus> {
    let terminal = || children.iter().flatten().filter(|s| s.is_terminal());

    if let Some(reason) = terminal().find_map(|s| match s {
        CommandStatus::Error(_, reason) => Some(reason.clone()),
        _ => None,
    }) {
        return Some(CommandStatus::Error(parent, reason));
    }
    if terminal().any(|s| matches!(s, CommandStatus::Cancelled(_))) {
        return Some(CommandStatus::Cancelled(parent));
    }
    if terminal().any(|s| matches!(s, CommandStatus::NoMatch(_))) {
        return Some(CommandStatus::NoMatch(parent));
    }
    if children.iter().all(|s| matches!(s, Some(CommandStatus::Completed(_)))) {
        return Some(CommandStatus::Completed(parent));
    }
    None
}

/// Correlation state of one fan-out.
pub struct DistributorController {
    parent: RunId,
    targets: Vec<ControllerRef>,
    deadline: Duration,
    token: CancellationToken,
    result: OnceLock<CommandStatus>,
}

impl DistributorController {
    /// `deadline` bounds each child's run; `token` cancels the whole fan-out.
    pub fn new(
        parent: RunId,
        targets: Vec<ControllerRef>,
        deadline: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            parent,
            targets,
            deadline,
            token,
            result: OnceLock::new(),
        }
    }

    pub fn parent(&self) -> RunId {
        self.parent
    }

    /// Terminal status, once finalized.
    pub fn status(&self) -> Option<CommandStatus> {
        self.result.get().cloned()
    }

    /// Cancel the fan-out; a no-op once the parent status is final.
    pub fn cancel(&self) -> bool {
        if self.result.get().is_some() {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Submit `command` to every target and wait for the aggregate terminal status.
    #[instrument(level = "debug", skip_all, fields(run_id = %self.parent, targets = self.targets.len()))]
    pub async fn distribute(&self, command: &Command, obs_id: Option<ObsId>) -> CommandStatus {
        if let Some(done) = self.status() {
            return done;
        }
        if self.token.is_cancelled() {
            return self.finalize(CommandStatus::Cancelled(self.parent));
        }

        let deadline = Instant::now() + self.deadline;
        let (tx, mut rx) = mpsc::channel(self.targets.len().max(1));
        let mut results: Vec<Option<CommandStatus>> = vec![None; self.targets.len()];
        let mut children: Vec<(usize, RunId)> = Vec::with_capacity(self.targets.len());

        for (idx, target) in self.targets.iter().enumerate() {
            match target.submit(command.clone(), obs_id.clone()).await {
                Ok(child) => {
                    debug!(component = %target.id(), child = %child, "forwarded");
                    children.push((idx, child));
                    let target = Arc::clone(target);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let status = watch_child(&target, child, deadline).await;
                        let _ = tx.send((idx, status)).await;
                    });
                }
                Err(e) => {
                    warn!(component = %target.id(), reason = %e, "subordinate rejected command");
                    results[idx] = Some(CommandStatus::Error(self.parent, format!("{}: {e}", target.id())));
                }
            }
        }
        drop(tx);

        loop {
            if let Some(status) = aggregate(self.parent, &results) {
                return self.finalize(status);
            }
            tokio::select! {
                _ = self.token.cancelled() => {
                    for (idx, child) in &children {
                        if results[*idx].is_none() {
                            let target = &self.targets[*idx];
                            if let Err(e) = target.cancel(child).await {
                                warn!(component = %target.id(), child = %child, reason = %e, "cancel not delivered");
                            }
                        }
                    }
                    return self.finalize(CommandStatus::Cancelled(self.parent));
                }
                received = rx.recv() => match received {
                    Some((idx, status)) => {
                        let status = match status {
                            CommandStatus::Error(_, reason) => {
                                CommandStatus::Error(self.parent, format!("{}: {reason}", self.targets[idx].id()))
                            }
                            other => other.with_run_id(self.parent),
                        };
                        results[idx] = Some(status);
                    }
                    None => {
                        return self.finalize(CommandStatus::Error(self.parent, "subordinate watchers ended".into()));
                    }
                },
            }
        }
    }

    fn finalize(&self, status: CommandStatus) -> CommandStatus {
        let stored = self.result.get_or_init(|| status);
        debug!(run_id = %self.parent, status = %stored, "fan-out finalized");
        stored.clone()
    }
}

async fn watch_child(target: &ControllerRef, child: RunId, deadline: Instant) -> CommandStatus {
    let stream = match target.status_of(&child) {
        Ok(stream) => stream,
        Err(e) => return CommandStatus::Error(child, e.to_string()),
    };
    match tokio::time::timeout_at(deadline, stream.terminal()).await {
        Ok(Some(status)) => status,
        Ok(None) => CommandStatus::Error(child, "status stream closed".into()),
        Err(_) => {
            debug!(component = %target.id(), child = %child, "subordinate missed the deadline");
            CommandStatus::NoMatch(child)
        }
    }
}
