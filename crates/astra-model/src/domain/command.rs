use serde::{Deserialize, Serialize};

use crate::{ConfigData, ConfigKey};

/// Whether a command configures a component or asks it to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandKind {
    Setup,
    Observe,
}

impl CommandKind {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandKind::Setup => "setup",
            CommandKind::Observe => "observe",
        }
    }
}

/// A command payload submitted to a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub kind: CommandKind,
    pub config: ConfigData,
}

impl Command {
    pub fn setup(config: ConfigData) -> Self {
        Self {
            kind: CommandKind::Setup,
            config,
        }
    }

    pub fn observe(config: ConfigData) -> Self {
        Self {
            kind: CommandKind::Observe,
            config,
        }
    }

    pub fn prefix(&self) -> &ConfigKey {
        self.config.prefix()
    }
}
