use astra_model::{CommandKind, ComponentId, RunId, Units, ValueKind};
use thiserror::Error;

/// Reasons a command is rejected before a [`RunId`] is minted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no command accepted under prefix {0}")]
    UnknownPrefix(String),
    #[error("{kind} commands are not accepted under {prefix}")]
    KindNotAllowed { prefix: String, kind: &'static str },
    #[error("unknown parameter {key} for {prefix}")]
    UnknownKey { prefix: String, key: String },
    #[error("missing required parameter {key} for {prefix}")]
    MissingKey { prefix: String, key: String },
    #[error("parameter {key} must be {expected:?}, got {found:?}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("parameter {key} must be in {expected}, got {found}")]
    UnitsMismatch {
        key: String,
        expected: Units,
        found: Units,
    },
}

impl ValidationError {
    pub(crate) fn kind_not_allowed(prefix: &str, kind: CommandKind) -> Self {
        ValidationError::KindNotAllowed {
            prefix: prefix.to_string(),
            kind: kind.kind(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Invalid(#[from] ValidationError),
    #[error("unknown run: {0}")]
    UnknownRun(RunId),
    #[error("no controller for component {0}")]
    UnknownComponent(ComponentId),
    #[error("invalid controller config: {0}")]
    InvalidConfig(String),
}
