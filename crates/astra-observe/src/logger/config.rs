use std::io::IsTerminal;

use serde::Deserialize;

use crate::logger::{error::LoggerError, format::LoggerFormat, log::mk_filter};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `astra_core=debug,info`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}

impl LoggerConfig {
    pub fn new(format: LoggerFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
            ..Self::default()
        }
    }

    pub fn with_targets(mut self, on: bool) -> Self {
        self.with_targets = on;
        self
    }

    pub fn with_color(mut self, on: bool) -> Self {
        self.use_color = on;
        self
    }

    pub fn validate(&self) -> Result<(), LoggerError> {
        mk_filter(&self.level).map(|_| ())
    }
}
