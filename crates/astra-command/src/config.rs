use std::{sync::Arc, time::Duration};

use astra_core::{MetricsHandle, NoopMetrics, StateStore};
use astra_model::TimeoutMs;

use crate::CommandError;

/// Timing knobs shared by every controller of a container.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Bound on one subordinate's run during a fan-out, and on one driver call.
    pub command_timeout_ms: TimeoutMs,
    /// Deadline of a state matcher when the caller gives none.
    pub match_timeout_ms: TimeoutMs,
    /// Period of current-state publication for periodic HCDs; `0` disables it.
    pub publish_period_ms: TimeoutMs,
    /// How long an assembly waits for its subordinates to appear in discovery at startup.
    pub resolve_timeout_ms: TimeoutMs,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30_000,
            match_timeout_ms: 10_000,
            publish_period_ms: 1_000,
            resolve_timeout_ms: 5_000,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), CommandError> {
        if self.command_timeout_ms == 0 {
            return Err(CommandError::InvalidConfig(
                "command_timeout_ms must be positive".into(),
            ));
        }
        if self.match_timeout_ms == 0 {
            return Err(CommandError::InvalidConfig(
                "match_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn match_timeout(&self) -> Duration {
        Duration::from_millis(self.match_timeout_ms)
    }

    pub fn publish_period(&self) -> Option<Duration> {
        (self.publish_period_ms > 0).then(|| Duration::from_millis(self.publish_period_ms))
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

/// Collaborators every controller of a container shares.
#[derive(Clone)]
pub struct CommandContext {
    pub store: Arc<dyn StateStore>,
    pub metrics: MetricsHandle,
    pub config: ControllerConfig,
}

impl CommandContext {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            metrics: NoopMetrics::handle(),
            config: ControllerConfig::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }
}
