use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use astra_command::prelude::*;
use astra_command::{ControllerConfig, CommandContext, ControllerRef};
use astra_core::{
    BuildContext, Container, EventBus, HandlerRouter, InMemoryDiscovery, InMemoryStateStore,
    StateStore,
};
use astra_model::{
    Command, CommandStatus, ComponentDescriptor, ComponentId, ConfigData, ConfigKey,
    ContainerConfig, LifecycleState, RunId, Units,
};

fn key(s: &str) -> ConfigKey {
    ConfigKey::new(s).unwrap()
}

fn id(subsystem: &str, name: &str) -> ComponentId {
    ComponentId::new(subsystem, name)
}

#[derive(Clone, Copy)]
enum Behaviour {
    Move,
    Fail,
    /// Never finishes on its own.
    Stall,
    /// Leaves completion to published state that nobody publishes.
    AwaitForever,
    /// Loses its encoder and takes the component down.
    Fault,
    /// Brings the command worker down with it.
    Crash,
}

struct SimDriver {
    state_key: ConfigKey,
    delay: Duration,
    behaviour: Behaviour,
}

impl SimDriver {
    fn new(state_key: &str, delay_ms: u64, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            state_key: key(state_key),
            delay: Duration::from_millis(delay_ms),
            behaviour,
        })
    }
}

#[async_trait]
impl HardwareDriver for SimDriver {
    fn initial_state(&self) -> ConfigData {
        ConfigData::new(self.state_key.clone()).with("pos", 0.0, Units::Millimeter)
    }

    async fn execute(
        &self,
        command: &Command,
        state: &CurrentState,
        cancel: CancellationToken,
    ) -> Result<Completion, DriverError> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(DriverError::new("stopped")),
            _ = tokio::time::sleep(self.delay) => {}
        }
        match self.behaviour {
            Behaviour::Move => {
                let pos = command.config.value("pos").and_then(|v| v.as_f64()).unwrap_or_default();
                state
                    .update(|s| s.clone().with("pos", pos, Units::Millimeter))
                    .await
                    .map_err(|e| DriverError::new(e.to_string()))?;
                Ok(Completion::Done)
            }
            Behaviour::Fail => Err(DriverError::new("motor stalled")),
            Behaviour::Fault => {
                state.report_failure("encoder lost");
                Err(DriverError::new("encoder lost"))
            }
            Behaviour::Crash => panic!("firmware trap"),
            Behaviour::Stall => {
                cancel.cancelled().await;
                Err(DriverError::new("stopped"))
            }
            Behaviour::AwaitForever => Ok(Completion::Await {
                demands: vec![DemandMatcher::new(
                    ConfigData::new(self.state_key.clone()).with("pos", -1.0, Units::Millimeter),
                )],
                timeout: Some(Duration::from_secs(2)),
            }),
        }
    }
}

struct Rig {
    container: Container,
    directory: ControllerDirectory,
    store: Arc<InMemoryStateStore>,
}

impl Rig {
    /// `assembly` coordinates every HCD in `hcds`.
    async fn build(hcds: Vec<(&str, Arc<SimDriver>)>, config: ControllerConfig) -> Rig {
        let mut components = Vec::new();
        let mut drivers = Vec::new();
        for (name, driver) in hcds {
            components.push(ComponentDescriptor::hcd(id("tcs", name)));
            drivers.push((id("tcs", name), driver));
        }
        let subordinates = drivers.iter().map(|(id, _)| id.clone()).collect();
        components.push(ComponentDescriptor::assembly(id("tcs", "assembly"), subordinates));
        Rig::assemble(components, drivers, config).await
    }

    /// Start `components`, HCDs driven by `drivers`, and bring them all to `Running`.
    async fn assemble(
        components: Vec<ComponentDescriptor>,
        drivers: Vec<(ComponentId, Arc<SimDriver>)>,
        config: ControllerConfig,
    ) -> Rig {
        let store = Arc::new(InMemoryStateStore::new());
        let discovery = Arc::new(InMemoryDiscovery::new());
        let directory = ControllerDirectory::new();
        let ctx = CommandContext::new(store.clone()).with_config(config);

        let mut factory = HcdFactory::new(ctx.clone(), directory.clone());
        for (id, driver) in drivers {
            factory = factory.with_driver(id, driver);
        }

        let router = HandlerRouter::new()
            .with(Arc::new(factory))
            .with(Arc::new(AssemblyFactory::new(ctx, directory.clone())));
        let container = Container::new(
            ContainerConfig::new("tcs", components),
            &router,
            &BuildContext::new(discovery),
            EventBus::empty(),
        )
        .unwrap();

        assert!(container.initialize_all().await.is_completed());
        assert!(container.startup_all().await.is_completed());
        Rig {
            container,
            directory,
            store,
        }
    }

    fn assembly(&self) -> ControllerRef {
        self.directory.require(&id("tcs", "assembly")).unwrap()
    }

    fn state_of(&self, component: &ComponentId) -> LifecycleState {
        self.container.supervisor(component).unwrap().state()
    }
}

fn quick() -> ControllerConfig {
    ControllerConfig {
        publish_period_ms: 0,
        command_timeout_ms: 5_000,
        ..Default::default()
    }
}

fn move_to(pos: f64) -> Command {
    Command::setup(ConfigData::new(key("tcs.assembly.move")).with("pos", pos, Units::Millimeter))
}

async fn terminal(controller: &ControllerRef, run: RunId) -> CommandStatus {
    controller.status_of(&run).unwrap().terminal().await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn fan_out_completes_when_every_hcd_completes() {
    let rig = Rig::build(
        vec![
            ("m1", SimDriver::new("tcs.m1", 100, Behaviour::Move)),
            ("m2", SimDriver::new("tcs.m2", 300, Behaviour::Move)),
        ],
        quick(),
    )
    .await;
    let asm = rig.assembly();

    let run = asm.submit(move_to(12.5), None).await.unwrap();
    let mut stream = asm.status_of(&run).unwrap();
    assert_eq!(stream.next().await, Some(CommandStatus::Accepted(run)));
    assert_eq!(terminal(&asm, run).await, CommandStatus::Completed(run));

    for name in ["tcs.m1", "tcs.m2"] {
        let state = rig.store.get(&key(name)).await.unwrap().unwrap();
        assert_eq!(state.value("pos").and_then(|v| v.as_f64()), Some(12.5));
    }
}

#[tokio::test(start_paused = true)]
async fn error_finalizes_parent_while_sibling_keeps_going() {
    let rig = Rig::build(
        vec![
            ("m1", SimDriver::new("tcs.m1", 1_000, Behaviour::Move)),
            ("m2", SimDriver::new("tcs.m2", 100, Behaviour::Fail)),
        ],
        quick(),
    )
    .await;
    let asm = rig.assembly();

    let started = tokio::time::Instant::now();
    let run = asm.submit(move_to(3.0), None).await.unwrap();
    let status = terminal(&asm, run).await;
    let CommandStatus::Error(parent, reason) = status else {
        panic!("expected error, got {status}");
    };
    assert_eq!(parent, run);
    assert!(reason.contains("motor stalled"), "{reason}");
    assert!(started.elapsed() < Duration::from_millis(1_000));

    // m1 was not cancelled and still reaches its target
    tokio::time::sleep(Duration::from_secs(2)).await;
    let state = rig.store.get(&key("tcs.m1")).await.unwrap().unwrap();
    assert_eq!(state.value("pos").and_then(|v| v.as_f64()), Some(3.0));
}

#[tokio::test(start_paused = true)]
async fn unmatched_state_yields_no_match() {
    let rig = Rig::build(
        vec![
            ("m1", SimDriver::new("tcs.m1", 10, Behaviour::Move)),
            ("m2", SimDriver::new("tcs.m2", 10, Behaviour::AwaitForever)),
        ],
        quick(),
    )
    .await;
    let asm = rig.assembly();

    let run = asm.submit(move_to(1.0), None).await.unwrap();
    assert_eq!(terminal(&asm, run).await, CommandStatus::NoMatch(run));
}

#[tokio::test(start_paused = true)]
async fn slow_subordinate_hits_the_fan_out_deadline() {
    let config = ControllerConfig {
        command_timeout_ms: 500,
        ..quick()
    };
    let rig = Rig::build(
        vec![("m1", SimDriver::new("tcs.m1", 10, Behaviour::Stall))],
        config,
    )
    .await;
    let asm = rig.assembly();

    let started = tokio::time::Instant::now();
    let run = asm.submit(move_to(1.0), None).await.unwrap();
    assert_eq!(terminal(&asm, run).await, CommandStatus::NoMatch(run));
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn cancel_reaches_subordinates() {
    let rig = Rig::build(
        vec![("m1", SimDriver::new("tcs.m1", 10, Behaviour::Stall))],
        quick(),
    )
    .await;
    let asm = rig.assembly();
    let hcd = rig.directory.require(&id("tcs", "m1")).unwrap();

    let run = asm.submit(move_to(1.0), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(asm.cancel(&run).await.unwrap());
    assert_eq!(terminal(&asm, run).await, CommandStatus::Cancelled(run));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let next = hcd.submit(move_to(2.0), None).await.unwrap();
    // the stalled run was cancelled, so the next command starts right away
    let mut stream = hcd.status_of(&next).unwrap();
    assert!(matches!(
        stream.next().await,
        Some(CommandStatus::Accepted(_) | CommandStatus::Executing(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn cancel_after_terminal_is_a_no_op() {
    let rig = Rig::build(
        vec![("m1", SimDriver::new("tcs.m1", 10, Behaviour::Move))],
        quick(),
    )
    .await;
    let asm = rig.assembly();

    let run = asm.submit(move_to(1.0), None).await.unwrap();
    assert_eq!(terminal(&asm, run).await, CommandStatus::Completed(run));

    assert!(!asm.cancel(&run).await.unwrap());
    assert_eq!(asm.current(&run), Some(CommandStatus::Completed(run)));
}

#[tokio::test(start_paused = true)]
async fn offline_assembly_rejects_with_terminal_error() {
    let rig = Rig::build(
        vec![("m1", SimDriver::new("tcs.m1", 10, Behaviour::Move))],
        quick(),
    )
    .await;
    let sup = rig.container.supervisor(&id("tcs", "assembly")).unwrap();
    assert_eq!(sup.go_offline().await.unwrap(), LifecycleState::RunningOffline);

    let asm = rig.assembly();
    let run = asm.submit(move_to(1.0), None).await.unwrap();
    assert_eq!(
        asm.current(&run),
        Some(CommandStatus::Error(run, "component offline".into()))
    );

    sup.go_online().await.unwrap();
    let run = asm.submit(move_to(1.0), None).await.unwrap();
    assert_eq!(terminal(&asm, run).await, CommandStatus::Completed(run));
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_the_controller() {
    let rig = Rig::build(
        vec![("m1", SimDriver::new("tcs.m1", 10, Behaviour::Move))],
        quick(),
    )
    .await;
    let before = rig.directory.require(&id("tcs", "m1")).unwrap();

    assert_eq!(
        rig.container.restart(&id("tcs", "m1")).await.unwrap(),
        LifecycleState::Running
    );
    let after = rig.directory.require(&id("tcs", "m1")).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));

    let asm = rig.assembly();
    let run = asm.submit(move_to(4.0), None).await.unwrap();
    assert_eq!(terminal(&asm, run).await, CommandStatus::Completed(run));
}

#[tokio::test(start_paused = true)]
async fn shutdown_detaches_every_controller() {
    let rig = Rig::build(
        vec![("m1", SimDriver::new("tcs.m1", 10, Behaviour::Move))],
        quick(),
    )
    .await;
    assert_eq!(rig.directory.len(), 2);
    assert!(rig.container.shutdown_all().await.is_completed());
    assert!(rig.directory.is_empty());
}

#[tokio::test(start_paused = true)]
async fn periodic_hcd_publishes_while_running() {
    let config = ControllerConfig {
        publish_period_ms: 100,
        ..quick()
    };
    let rig = Rig::build(
        vec![("m1", SimDriver::new("tcs.m1", 10, Behaviour::Move))],
        config,
    )
    .await;

    let mut updates = rig.store.subscribe(&[key("tcs.m1")]).await.unwrap();
    let horizon = tokio::time::Instant::now() + Duration::from_millis(1_000);
    let mut seen = 0;
    while let Ok(Some(Ok(_))) = tokio::time::timeout_at(horizon, updates.recv()).await {
        seen += 1;
    }
    assert!(seen >= 10, "only {seen} publications");
}

#[tokio::test(start_paused = true)]
async fn nested_assembly_reports_a_leaf_error_at_the_top() {
    let drivers = vec![
        (id("tcs", "m1"), SimDriver::new("tcs.m1", 100, Behaviour::Move)),
        (id("tcs", "m2"), SimDriver::new("tcs.m2", 200, Behaviour::Fail)),
        (id("tcs", "m3"), SimDriver::new("tcs.m3", 50, Behaviour::Move)),
    ];
    let components = vec![
        ComponentDescriptor::hcd(id("tcs", "m1")),
        ComponentDescriptor::hcd(id("tcs", "m2")),
        ComponentDescriptor::hcd(id("tcs", "m3")),
        ComponentDescriptor::assembly(id("tcs", "optics"), vec![id("tcs", "m1"), id("tcs", "m2")]),
        ComponentDescriptor::assembly(id("tcs", "assembly"), vec![id("tcs", "optics"), id("tcs", "m3")]),
    ];
    let rig = Rig::assemble(components, drivers, quick()).await;
    let top = rig.assembly();
    let optics = rig.directory.require(&id("tcs", "optics")).unwrap();

    let run = top.submit(move_to(7.0), None).await.unwrap();
    let status = terminal(&top, run).await;
    let CommandStatus::Error(parent, reason) = status else {
        panic!("expected error, got {status}");
    };
    assert_eq!(parent, run);
    assert!(reason.contains("motor stalled"), "{reason}");
    assert_eq!(optics.current(&run), None);

    // the healthy leaves still moved
    tokio::time::sleep(Duration::from_secs(1)).await;
    for name in ["tcs.m1", "tcs.m3"] {
        let state = rig.store.get(&key(name)).await.unwrap().unwrap();
        assert_eq!(state.value("pos").and_then(|v| v.as_f64()), Some(7.0));
    }
}

#[tokio::test(start_paused = true)]
async fn heartbeats_keep_supervised_controllers_running() {
    let components = vec![
        ComponentDescriptor::hcd(id("tcs", "m1")).with_heartbeat_ms(500),
        ComponentDescriptor::assembly(id("tcs", "assembly"), vec![id("tcs", "m1")])
            .with_heartbeat_ms(500),
    ];
    let drivers = vec![(id("tcs", "m1"), SimDriver::new("tcs.m1", 10, Behaviour::Move))];
    let rig = Rig::assemble(components, drivers, quick()).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(rig.state_of(&id("tcs", "m1")), LifecycleState::Running);
    assert_eq!(rig.state_of(&id("tcs", "assembly")), LifecycleState::Running);

    let asm = rig.assembly();
    let run = asm.submit(move_to(1.0), None).await.unwrap();
    assert_eq!(terminal(&asm, run).await, CommandStatus::Completed(run));
}

#[tokio::test(start_paused = true)]
async fn driver_fault_moves_the_hcd_to_error() {
    let rig = Rig::build(
        vec![("m1", SimDriver::new("tcs.m1", 10, Behaviour::Fault))],
        quick(),
    )
    .await;
    let hcd = rig.directory.require(&id("tcs", "m1")).unwrap();

    let run = hcd.submit(move_to(1.0), None).await.unwrap();
    assert_eq!(
        terminal(&hcd, run).await,
        CommandStatus::Error(run, "encoder lost".into())
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    let state = rig.state_of(&id("tcs", "m1"));
    assert!(
        matches!(&state, LifecycleState::Error(reason) if reason.contains("encoder lost")),
        "{state:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn crashed_worker_stops_the_heartbeat() {
    let components = vec![ComponentDescriptor::hcd(id("tcs", "m1")).with_heartbeat_ms(300)];
    let drivers = vec![(id("tcs", "m1"), SimDriver::new("tcs.m1", 10, Behaviour::Crash))];
    let rig = Rig::assemble(components, drivers, quick()).await;
    let hcd = rig.directory.require(&id("tcs", "m1")).unwrap();

    hcd.submit(move_to(1.0), None).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let state = rig.state_of(&id("tcs", "m1"));
    assert!(
        matches!(&state, LifecycleState::Error(reason) if reason.contains("command worker exited")),
        "{state:?}"
    );
}
