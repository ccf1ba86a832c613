use std::sync::Arc;

use astra_model::ComponentDescriptor;
use tracing::{instrument, trace};

use crate::{
    collab::Discovery,
    error::CoreError,
    handler::{HandlerFailure, LifecycleHandler},
    metrics::{MetricsHandle, NoopMetrics},
};

/// Shared collaborators handed to every factory.
#[derive(Clone)]
pub struct BuildContext {
    pub discovery: Arc<dyn Discovery>,
    pub metrics: MetricsHandle,
}

impl BuildContext {
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        Self {
            discovery,
            metrics: NoopMetrics::handle(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Builds the lifecycle handler for one kind of component.
pub trait HandlerFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, descriptor: &ComponentDescriptor) -> bool;

    fn build_handler(
        &self,
        descriptor: &ComponentDescriptor,
        ctx: &BuildContext,
    ) -> Result<Box<dyn LifecycleHandler>, HandlerFailure>;
}

/// Picks the factory for a descriptor; first registered match wins.
#[derive(Default)]
pub struct HandlerRouter {
    factories: Vec<Arc<dyn HandlerFactory>>,
}

impl HandlerRouter {
    #[inline]
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    #[inline]
    pub fn register(&mut self, factory: Arc<dyn HandlerFactory>) {
        self.factories.push(factory);
    }

    #[inline]
    pub fn with(mut self, factory: Arc<dyn HandlerFactory>) -> Self {
        self.register(factory);
        self
    }

    pub fn pick(&self, descriptor: &ComponentDescriptor) -> Option<&Arc<dyn HandlerFactory>> {
        self.factories.iter().find(|f| f.supports(descriptor))
    }

    #[instrument(level = "trace", skip(self, descriptor, ctx), fields(component = %descriptor.id, kind = %descriptor.kind))]
    pub fn build(
        &self,
        descriptor: &ComponentDescriptor,
        ctx: &BuildContext,
    ) -> Result<Box<dyn LifecycleHandler>, CoreError> {
        let factory = self
            .pick(descriptor)
            .ok_or_else(|| CoreError::NoFactory(format!("{} ({})", descriptor.id, descriptor.kind)))?;

        let handler = factory
            .build_handler(descriptor, ctx)
            .map_err(|e| CoreError::Build {
                id: descriptor.id.clone(),
                reason: e.to_string(),
            })?;
        trace!(factory = factory.name(), "factory built handler");
        Ok(handler)
    }
}
