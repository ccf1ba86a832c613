use thiserror::Error;

use crate::ComponentId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid component id: {0} (expected: subsystem.name)")]
    InvalidComponentId(String),
    #[error("unknown component kind: {0} (expected: assembly|hcd)")]
    UnknownKind(String),
    #[error("invalid config key: {0}")]
    InvalidConfigKey(String),
    #[error("unknown units: {0}")]
    UnknownUnits(String),
}

/// Rejections of a container configuration document.
///
/// All of these are raised before any supervisor is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to parse container document: {0}")]
    Parse(String),
    #[error("container document has no components")]
    Empty,
    #[error("unknown component kind: {0}")]
    UnknownKind(String),
    #[error("duplicate component id: {0}")]
    DuplicateComponent(ComponentId),
    #[error("component {owner} references unknown subordinate {missing}")]
    DanglingSubordinate {
        owner: ComponentId,
        missing: ComponentId,
    },
    #[error("component {0} lists itself as a subordinate")]
    SelfSubordinate(ComponentId),
    #[error("subordinate cycle through component {0}")]
    SubordinateCycle(ComponentId),
    #[error("hcd {0} cannot have subordinates")]
    HcdWithSubordinates(ComponentId),
    #[error("invalid component settings for {id}: {reason}")]
    InvalidSettings { id: ComponentId, reason: String },
}
