//! Metrics seam.
//!
//! Core and the command layer report through [`MetricsBackend`]; a concrete exporter lives
//! in its own crate so that core carries no metrics dependency.

use std::{sync::Arc, time::Duration};

use astra_model::{ComponentId, LifecycleState, Outcome};

pub trait MetricsBackend: Send + Sync + 'static {
    fn record_transition(&self, component: &ComponentId, state: &LifecycleState);
    fn record_command_submitted(&self, component: &ComponentId);
    fn record_command_finished(&self, component: &ComponentId, outcome: Outcome, elapsed: Duration);
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

/// Backend that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl NoopMetrics {
    pub fn handle() -> MetricsHandle {
        Arc::new(NoopMetrics)
    }
}

impl MetricsBackend for NoopMetrics {
    fn record_transition(&self, _: &ComponentId, _: &LifecycleState) {}
    fn record_command_submitted(&self, _: &ComponentId) {}
    fn record_command_finished(&self, _: &ComponentId, _: Outcome, _: Duration) {}
}
