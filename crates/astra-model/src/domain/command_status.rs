use std::fmt;

use serde::{Deserialize, Serialize};

use crate::RunId;

/// Progress or outcome of one command, keyed by its [`RunId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandStatus {
    Accepted(RunId),
    Queued(RunId),
    Executing(RunId),
    Completed(RunId),
    Error(RunId, String),
    Cancelled(RunId),
    NoMatch(RunId),
}

/// Terminal outcome of a command, without its correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Completed,
    Error,
    Cancelled,
    NoMatch,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Error => "error",
            Outcome::Cancelled => "cancelled",
            Outcome::NoMatch => "noMatch",
        }
    }
}

impl CommandStatus {
    pub fn run_id(&self) -> RunId {
        match self {
            CommandStatus::Accepted(id)
            | CommandStatus::Queued(id)
            | CommandStatus::Executing(id)
            | CommandStatus::Completed(id)
            | CommandStatus::Error(id, _)
            | CommandStatus::Cancelled(id)
            | CommandStatus::NoMatch(id) => *id,
        }
    }

    /// Returns `true` for statuses after which no further status is produced.
    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            CommandStatus::Completed(_) => Some(Outcome::Completed),
            CommandStatus::Error(..) => Some(Outcome::Error),
            CommandStatus::Cancelled(_) => Some(Outcome::Cancelled),
            CommandStatus::NoMatch(_) => Some(Outcome::NoMatch),
            _ => None,
        }
    }

    /// Same status re-keyed to another run; used when mapping subordinate runs to a parent.
    pub fn with_run_id(&self, run_id: RunId) -> CommandStatus {
        match self {
            CommandStatus::Accepted(_) => CommandStatus::Accepted(run_id),
            CommandStatus::Queued(_) => CommandStatus::Queued(run_id),
            CommandStatus::Executing(_) => CommandStatus::Executing(run_id),
            CommandStatus::Completed(_) => CommandStatus::Completed(run_id),
            CommandStatus::Error(_, reason) => CommandStatus::Error(run_id, reason.clone()),
            CommandStatus::Cancelled(_) => CommandStatus::Cancelled(run_id),
            CommandStatus::NoMatch(_) => CommandStatus::NoMatch(run_id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandStatus::Accepted(_) => "accepted",
            CommandStatus::Queued(_) => "queued",
            CommandStatus::Executing(_) => "executing",
            CommandStatus::Completed(_) => "completed",
            CommandStatus::Error(..) => "error",
            CommandStatus::Cancelled(_) => "cancelled",
            CommandStatus::NoMatch(_) => "noMatch",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Error(id, reason) => write!(f, "error({id}): {reason}"),
            other => write!(f, "{}({})", other.name(), other.run_id()),
        }
    }
}
