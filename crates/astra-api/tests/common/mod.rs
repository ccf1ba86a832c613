#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use astra_api::ContainerApiAdapter;
use astra_command::{
    CommandContext, CommandSchema, CommandSet, Completion, ControllerConfig, ControllerDirectory,
    CurrentState, DriverError, HardwareDriver, HcdFactory, ParamSpec,
};
use astra_core::{BuildContext, Container, EventBus, HandlerRouter, InMemoryDiscovery, InMemoryStateStore};
use astra_model::{
    Command, CommandKind, ComponentDescriptor, ComponentId, ConfigData, ConfigKey, ContainerConfig,
    Units, ValueKind,
};

pub fn key(s: &str) -> ConfigKey {
    ConfigKey::new(s).unwrap()
}

pub fn mount() -> ComponentId {
    ComponentId::new("tcs", "mount")
}

pub fn slew(az: f64) -> Command {
    Command::setup(ConfigData::new(key("tcs.mount.slew")).with("az", az, Units::Degree))
}

/// A slew with a negative azimuth never finishes on its own.
pub struct Mount;

#[async_trait]
impl HardwareDriver for Mount {
    fn initial_state(&self) -> ConfigData {
        ConfigData::new(key("tcs.mount")).with("az", 0.0, Units::Degree)
    }

    async fn execute(
        &self,
        command: &Command,
        state: &CurrentState,
        cancel: CancellationToken,
    ) -> Result<Completion, DriverError> {
        let az = command.config.value("az").and_then(|v| v.as_f64()).unwrap_or_default();
        if az < 0.0 {
            cancel.cancelled().await;
            return Err(DriverError::new("slew aborted"));
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(DriverError::new("slew aborted")),
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }
        state
            .update(|s| s.clone().with("az", az, Units::Degree))
            .await
            .map_err(|e| DriverError::new(e.to_string()))?;
        Ok(Completion::Done)
    }
}

/// Container holding `tcs.mount`, optionally brought up to Running.
pub async fn adapter(start: bool) -> Arc<ContainerApiAdapter> {
    let store = Arc::new(InMemoryStateStore::new());
    let directory = ControllerDirectory::new();
    let ctx = CommandContext::new(store).with_config(ControllerConfig {
        publish_period_ms: 0,
        ..Default::default()
    });
    let commands = CommandSet::strict([CommandSchema::new(key("tcs.mount.slew"))
        .only(CommandKind::Setup)
        .param("az", ParamSpec::required(ValueKind::Double, Units::Degree))]);
    let factory = HcdFactory::new(ctx, directory.clone())
        .with_driver(mount(), Arc::new(Mount))
        .with_commands(mount(), commands);

    let container = Container::new(
        ContainerConfig::new("tcs", vec![ComponentDescriptor::hcd(mount())]),
        &HandlerRouter::new().with(Arc::new(factory)),
        &BuildContext::new(Arc::new(InMemoryDiscovery::new())),
        EventBus::empty(),
    )
    .unwrap();

    if start {
        assert!(container.initialize_all().await.is_completed());
        assert!(container.startup_all().await.is_completed());
    }
    Arc::new(ContainerApiAdapter::new(Arc::new(container), directory))
}
