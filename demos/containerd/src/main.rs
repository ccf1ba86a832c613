mod stage;

use std::{env, sync::Arc};

use anyhow::Context;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use tracing::{error, info, warn};

use astra_api::{ApiHandler, ContainerApiAdapter, HttpApi};
use astra_command::{
    AssemblyFactory, CommandContext, CommandSchema, CommandSet, ControllerConfig,
    ControllerDirectory, HcdFactory, ParamSpec,
};
use astra_core::{
    BuildContext, Container, Discovery, EventBus, HandlerRouter, InMemoryDiscovery,
    InMemoryStateStore, MetricsHandle, Subscribe,
};
use astra_discover::{DiscoverConfig, HttpDiscovery};
use astra_model::{Command, ComponentId, ConfigData, ConfigKey, ContainerConfig, Units, ValueKind};
use astra_observe::{Journal, LoggerConfig, LoggerFormat, logger_init};
use astra_prometheus::PrometheusMetrics;

use crate::stage::TromboneStage;

const DEFAULT_DOC: &str = include_str!("../container.json");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    let format: LoggerFormat = env::var("ASTRA_LOG_FORMAT")
        .unwrap_or_else(|_| "text".into())
        .parse()?;
    let level = env::var("ASTRA_LOG").unwrap_or_else(|_| "info".into());
    logger_init(&LoggerConfig::new(format, level))?;
    info!("logger initialized");

    // 2) Container document
    let doc = match env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?,
        None => DEFAULT_DOC.to_string(),
    };
    let config = ContainerConfig::from_json(&doc)?;
    info!(container = %config.name, components = config.components.len(), "document loaded");

    // 3) Collaborators
    let metrics = PrometheusMetrics::new()?;
    let metrics_handle: MetricsHandle = Arc::new(metrics.clone());
    let discovery: Arc<dyn Discovery> = match env::var("ASTRA_DISCOVERY") {
        Ok(endpoint) => {
            info!(%endpoint, "using http discovery");
            Arc::new(HttpDiscovery::new(DiscoverConfig::new(endpoint))?)
        }
        Err(_) => Arc::new(InMemoryDiscovery::new()),
    };
    let store = Arc::new(InMemoryStateStore::new());
    let directory = ControllerDirectory::new();
    let ctx = CommandContext::new(store)
        .with_metrics(metrics_handle.clone())
        .with_config(ControllerConfig::default());

    // 4) Handler factories
    let hcd_id = ComponentId::new("nfiraos", "trombone-hcd");
    let asm_id = ComponentId::new("nfiraos", "trombone-assembly");
    let stage = TromboneStage::new(ConfigKey::new("nfiraos.trombone")?);
    let hcd_commands = CommandSet::strict([
        CommandSchema::new(ConfigKey::new("nfiraos.trombone.move")?)
            .param("target", ParamSpec::required(ValueKind::Double, Units::Millimeter)),
        CommandSchema::new(ConfigKey::new("nfiraos.trombone.datum")?),
    ]);
    let router = HandlerRouter::new()
        .with(Arc::new(
            HcdFactory::new(ctx.clone(), directory.clone())
                .with_driver(hcd_id.clone(), Arc::new(stage))
                .with_commands(hcd_id, hcd_commands),
        ))
        .with(Arc::new(AssemblyFactory::new(ctx, directory.clone())));

    // 5) Container
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Journal::new())];
    let container = Arc::new(Container::new(
        config,
        &router,
        &BuildContext::new(discovery).with_metrics(metrics_handle),
        EventBus::new(subscribers),
    )?);

    let init = container.initialize_all().await;
    if let Some(failed) = init.failures() {
        warn!(?failed, "some components failed to initialize");
    }
    let startup = container.startup_all().await;
    if let Some(failed) = startup.failures() {
        warn!(?failed, "some components failed to start");
    }
    info!("container ready");

    // 6) HTTP surface
    let api = Arc::new(ContainerApiAdapter::new(Arc::clone(&container), directory));
    let app = HttpApi::new(Arc::clone(&api))
        .router()
        .merge(metrics_router(metrics));
    let addr = env::var("ASTRA_HTTP").unwrap_or_else(|_| "127.0.0.1:8080".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "http api listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "http api stopped");
        }
    });

    // 7) Demo command through the assembly
    let command = Command::setup(
        ConfigData::new(ConfigKey::new("nfiraos.trombone.move")?).with("target", 25.0, Units::Millimeter),
    );
    match api.submit_command(&asm_id, command, None).await {
        Ok(run_id) => {
            let status = api.await_completion(&run_id).await?;
            info!(%run_id, %status, "demo move finished");
        }
        Err(e) => warn!(error = %e, "demo move rejected"),
    }

    // 8) Keep running
    info!("press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down...");

    let shutdown = container.shutdown_all().await;
    if let Some(failed) = shutdown.failures() {
        warn!(?failed, "some components did not shut down cleanly");
    }
    Ok(())
}

fn metrics_router(metrics: PrometheusMetrics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<PrometheusMetrics>) -> Result<String, StatusCode> {
    metrics.render().map_err(|e| {
        error!(error = %e, "metrics encoding failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
