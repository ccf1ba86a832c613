use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use astra_core::{Discovery, DiscoveryError};
use astra_discover::{DiscoverConfig, HttpDiscovery, RegisterRequest, RegisterResponse};
use astra_model::{ComponentId, Location, Registration, ServiceType};

type Table = Arc<Mutex<HashMap<String, Location>>>;

async fn register(State(table): State<Table>, Json(req): Json<RegisterRequest>) -> Json<RegisterResponse> {
    if req.id.name() == "forbidden" {
        return Json(RegisterResponse {
            success: false,
            message: "name is reserved".into(),
        });
    }
    let location = Location {
        id: req.id.clone(),
        uri: req.location,
        service: req.service,
    };
    table.lock().unwrap().insert(req.id.to_string(), location);
    Json(RegisterResponse {
        success: true,
        message: String::new(),
    })
}

async fn resolve(State(table): State<Table>, Path(id): Path<String>) -> Result<Json<Location>, StatusCode> {
    table
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn unregister(State(table): State<Table>, Path(id): Path<String>) -> StatusCode {
    match table.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn serve() -> String {
    let table: Table = Arc::default();
    let app = Router::new()
        .route("/v1/components", post(register))
        .route("/v1/components/{id}", get(resolve).delete(unregister))
        .with_state(table);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn register_resolve_unregister_over_http() {
    let endpoint = serve().await;
    let discovery = HttpDiscovery::new(DiscoverConfig::new(endpoint)).unwrap();
    let id = ComponentId::new("tcs", "mount");

    assert_eq!(discovery.resolve(&id).await.unwrap(), None);

    discovery
        .register(Registration::new(id.clone(), "http://mount:9000", ServiceType::Http))
        .await
        .unwrap();
    let location = discovery.resolve(&id).await.unwrap().unwrap();
    assert_eq!(location.uri, "http://mount:9000");
    assert_eq!(location.service, ServiceType::Http);

    discovery.unregister(&id).await.unwrap();
    assert_eq!(discovery.resolve(&id).await.unwrap(), None);
    // unregistering twice is harmless
    discovery.unregister(&id).await.unwrap();
}

#[tokio::test]
async fn rejection_is_reported_as_rejected() {
    let endpoint = serve().await;
    let discovery = HttpDiscovery::new(DiscoverConfig::new(endpoint)).unwrap();

    let err = discovery
        .register(Registration::new(
            ComponentId::new("tcs", "forbidden"),
            "http://x",
            ServiceType::Command,
        ))
        .await
        .unwrap_err();
    assert_eq!(err, DiscoveryError::Rejected("name is reserved".into()));
}

#[tokio::test]
async fn unreachable_service_is_unavailable() {
    // nothing listens on the discard port
    let discovery = HttpDiscovery::new(DiscoverConfig {
        endpoint: "http://127.0.0.1:9".into(),
        timeout_ms: 500,
        ..Default::default()
    })
    .unwrap();

    let err = discovery
        .resolve(&ComponentId::new("tcs", "mount"))
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Unavailable(_)));
}
