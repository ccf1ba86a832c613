//! Lifecycle handlers that attach command controllers to supervised components.
//!
//! A controller lives from `on_initialize` to `on_shutdown`. It accepts commands only while
//! its component is `Running`; in `RunningOffline` new commands end as `Error("component offline")`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

use astra_core::{
    BuildContext, ComponentContext, Discovery, HandlerFactory, HandlerFailure, LifecycleHandler,
};
use astra_model::{ComponentDescriptor, ComponentId, ComponentKind, TimeoutMs};

use crate::{
    AssemblyBehavior, AssemblyController, CommandContext, CommandSet, ControllerDirectory,
    ControllerRef, ForwardAll, HardwareDriver, HcdController, PeriodicHcdController,
    heartbeat::beat_period,
};

const RESOLVE_POLL: Duration = Duration::from_millis(50);

enum HcdRuntime {
    Plain(Arc<HcdController>),
    Periodic(Arc<PeriodicHcdController>),
}

impl HcdRuntime {
    fn hcd(&self) -> &HcdController {
        match self {
            HcdRuntime::Plain(hcd) => hcd,
            HcdRuntime::Periodic(periodic) => periodic.controller(),
        }
    }

    fn as_controller(&self) -> ControllerRef {
        match self {
            HcdRuntime::Plain(hcd) => Arc::clone(hcd) as ControllerRef,
            HcdRuntime::Periodic(periodic) => Arc::clone(periodic) as ControllerRef,
        }
    }

    fn stop(&self) {
        match self {
            HcdRuntime::Plain(hcd) => hcd.stop(),
            HcdRuntime::Periodic(periodic) => periodic.stop(),
        }
    }
}

pub struct HcdLifecycle {
    id: ComponentId,
    driver: Arc<dyn HardwareDriver>,
    commands: CommandSet,
    ctx: CommandContext,
    directory: ControllerDirectory,
    heartbeat: Option<Duration>,
    runtime: Option<HcdRuntime>,
}

impl HcdLifecycle {
    pub fn new(
        id: ComponentId,
        driver: Arc<dyn HardwareDriver>,
        commands: CommandSet,
        ctx: CommandContext,
        directory: ControllerDirectory,
    ) -> Self {
        Self {
            id,
            driver,
            commands,
            ctx,
            directory,
            heartbeat: None,
            runtime: None,
        }
    }

    /// Beat often enough for a supervisor that expects a heartbeat every `heartbeat_ms`.
    pub fn with_heartbeat_ms(mut self, heartbeat_ms: TimeoutMs) -> Self {
        self.heartbeat = Some(beat_period(heartbeat_ms));
        self
    }

    fn runtime(&self) -> Result<&HcdRuntime, HandlerFailure> {
        self.runtime
            .as_ref()
            .ok_or_else(|| HandlerFailure::new("controller not initialized"))
    }

    fn release(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.stop();
            self.directory.remove(&self.id);
        }
    }
}

#[async_trait]
impl LifecycleHandler for HcdLifecycle {
    async fn on_initialize(&mut self, ctx: &ComponentContext) -> Result<(), HandlerFailure> {
        self.release();
        let hcd = HcdController::start(
            ctx.id.clone(),
            Arc::clone(&self.driver),
            self.commands.clone(),
            &self.ctx,
        );
        hcd.attach_health(ctx.health.clone(), self.heartbeat);
        let runtime = match self.ctx.config.publish_period() {
            Some(period) => HcdRuntime::Periodic(Arc::new(PeriodicHcdController::start(hcd, period))),
            None => HcdRuntime::Plain(Arc::new(hcd)),
        };
        self.directory.insert(runtime.as_controller());
        self.runtime = Some(runtime);
        Ok(())
    }

    async fn on_startup(&mut self) -> Result<(), HandlerFailure> {
        self.runtime()?
            .hcd()
            .request_current()
            .await
            .map(|_| ())
            .map_err(|e| HandlerFailure::new(format!("initial state not published: {e}")))
    }

    async fn on_running(&mut self) -> Result<(), HandlerFailure> {
        self.runtime()?.hcd().set_online(true);
        Ok(())
    }

    async fn on_running_offline(&mut self) -> Result<(), HandlerFailure> {
        self.runtime()?.hcd().set_online(false);
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<(), HandlerFailure> {
        self.release();
        Ok(())
    }
}

pub struct AssemblyLifecycle {
    id: ComponentId,
    subordinates: Vec<ComponentId>,
    behavior: Arc<dyn AssemblyBehavior>,
    commands: CommandSet,
    ctx: CommandContext,
    directory: ControllerDirectory,
    discovery: Arc<dyn Discovery>,
    heartbeat: Option<Duration>,
    controller: Option<Arc<AssemblyController>>,
}

impl AssemblyLifecycle {
    pub fn new(
        descriptor: &ComponentDescriptor,
        behavior: Arc<dyn AssemblyBehavior>,
        commands: CommandSet,
        ctx: CommandContext,
        directory: ControllerDirectory,
        discovery: Arc<dyn Discovery>,
    ) -> Self {
        Self {
            id: descriptor.id.clone(),
            subordinates: descriptor.subordinates.clone(),
            behavior,
            commands,
            ctx,
            directory,
            discovery,
            heartbeat: descriptor.heartbeat_ms.map(beat_period),
            controller: None,
        }
    }

    fn controller(&self) -> Result<&AssemblyController, HandlerFailure> {
        self.controller
            .as_deref()
            .ok_or_else(|| HandlerFailure::new("controller not initialized"))
    }

    /// Wait until every subordinate is registered, bounded by the resolve timeout.
    #[instrument(level = "debug", skip(self), fields(component = %self.id))]
    async fn resolve_subordinates(&self) -> Result<(), HandlerFailure> {
        let deadline = Instant::now() + self.ctx.config.resolve_timeout();
        for sub in &self.subordinates {
            loop {
                let last = match self.discovery.resolve(sub).await {
                    Ok(Some(location)) => {
                        debug!(subordinate = %sub, uri = %location.uri, "subordinate resolved");
                        break;
                    }
                    Ok(None) => "not registered".to_string(),
                    Err(e) => e.to_string(),
                };
                if Instant::now() >= deadline {
                    warn!(subordinate = %sub, reason = %last, "subordinate unresolved");
                    return Err(HandlerFailure::new(format!(
                        "subordinate {sub} unresolved: {last}"
                    )));
                }
                sleep(RESOLVE_POLL).await;
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.stop();
            self.directory.remove(&self.id);
        }
    }
}

#[async_trait]
impl LifecycleHandler for AssemblyLifecycle {
    async fn on_initialize(&mut self, ctx: &ComponentContext) -> Result<(), HandlerFailure> {
        self.release();
        let controller = Arc::new(AssemblyController::new(
            ctx.id.clone(),
            self.subordinates.clone(),
            Arc::clone(&self.behavior),
            self.commands.clone(),
            self.directory.clone(),
            &self.ctx,
        ));
        controller.attach_health(ctx.health.clone(), self.heartbeat);
        self.directory.insert(controller.clone());
        self.controller = Some(controller);
        Ok(())
    }

    async fn on_startup(&mut self) -> Result<(), HandlerFailure> {
        self.controller()?;
        self.resolve_subordinates().await
    }

    async fn on_running(&mut self) -> Result<(), HandlerFailure> {
        self.controller()?.set_online(true);
        Ok(())
    }

    async fn on_running_offline(&mut self) -> Result<(), HandlerFailure> {
        self.controller()?.set_online(false);
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<(), HandlerFailure> {
        self.release();
        Ok(())
    }
}

/// Builds [`HcdLifecycle`]s for HCD descriptors that have a registered driver.
pub struct HcdFactory {
    ctx: CommandContext,
    directory: ControllerDirectory,
    drivers: HashMap<ComponentId, Arc<dyn HardwareDriver>>,
    commands: HashMap<ComponentId, CommandSet>,
}

impl HcdFactory {
    pub fn new(ctx: CommandContext, directory: ControllerDirectory) -> Self {
        Self {
            ctx,
            directory,
            drivers: HashMap::new(),
            commands: HashMap::new(),
        }
    }

    pub fn with_driver(mut self, id: ComponentId, driver: Arc<dyn HardwareDriver>) -> Self {
        self.drivers.insert(id, driver);
        self
    }

    pub fn with_commands(mut self, id: ComponentId, commands: CommandSet) -> Self {
        self.commands.insert(id, commands);
        self
    }
}

impl HandlerFactory for HcdFactory {
    fn name(&self) -> &'static str {
        "hcd"
    }

    fn supports(&self, descriptor: &ComponentDescriptor) -> bool {
        descriptor.kind == ComponentKind::Hcd
    }

    fn build_handler(
        &self,
        descriptor: &ComponentDescriptor,
        build: &BuildContext,
    ) -> Result<Box<dyn LifecycleHandler>, HandlerFailure> {
        let driver = self
            .drivers
            .get(&descriptor.id)
            .cloned()
            .ok_or_else(|| HandlerFailure::new(format!("no hardware driver for {}", descriptor.id)))?;
        let commands = self.commands.get(&descriptor.id).cloned().unwrap_or_default();

        let handler = HcdLifecycle::new(
            descriptor.id.clone(),
            driver,
            commands,
            self.ctx.clone().with_metrics(Arc::clone(&build.metrics)),
            self.directory.clone(),
        );
        Ok(Box::new(match descriptor.heartbeat_ms {
            Some(ms) => handler.with_heartbeat_ms(ms),
            None => handler,
        }))
    }
}

/// Builds [`AssemblyLifecycle`]s; assemblies without a registered behavior forward to all
/// subordinates.
pub struct AssemblyFactory {
    ctx: CommandContext,
    directory: ControllerDirectory,
    behaviors: HashMap<ComponentId, Arc<dyn AssemblyBehavior>>,
    commands: HashMap<ComponentId, CommandSet>,
}

impl AssemblyFactory {
    pub fn new(ctx: CommandContext, directory: ControllerDirectory) -> Self {
        Self {
            ctx,
            directory,
            behaviors: HashMap::new(),
            commands: HashMap::new(),
        }
    }

    pub fn with_behavior(mut self, id: ComponentId, behavior: Arc<dyn AssemblyBehavior>) -> Self {
        self.behaviors.insert(id, behavior);
        self
    }

    pub fn with_commands(mut self, id: ComponentId, commands: CommandSet) -> Self {
        self.commands.insert(id, commands);
        self
    }
}

impl HandlerFactory for AssemblyFactory {
    fn name(&self) -> &'static str {
        "assembly"
    }

    fn supports(&self, descriptor: &ComponentDescriptor) -> bool {
        descriptor.kind == ComponentKind::Assembly
    }

    fn build_handler(
        &self,
        descriptor: &ComponentDescriptor,
        build: &BuildContext,
    ) -> Result<Box<dyn LifecycleHandler>, HandlerFailure> {
        let behavior = self
            .behaviors
            .get(&descriptor.id)
            .cloned()
            .unwrap_or_else(|| Arc::new(ForwardAll) as Arc<dyn AssemblyBehavior>);
        let commands = self.commands.get(&descriptor.id).cloned().unwrap_or_default();

        Ok(Box::new(AssemblyLifecycle::new(
            descriptor,
            behavior,
            commands,
            self.ctx.clone().with_metrics(Arc::clone(&build.metrics)),
            self.directory.clone(),
            Arc::clone(&build.discovery),
        )))
    }
}
