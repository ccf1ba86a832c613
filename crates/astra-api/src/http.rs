use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use astra_model::{Command, CommandStatus, ComponentId, ObsId, RunId};

use crate::{error::ApiError, handler::ApiHandler, view::ContainerView};

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - POST /api/v1/components/{id}/commands - Submit command
    /// - GET /api/v1/commands/{run_id} - Command status (`?wait=true` blocks until terminal)
    /// - DELETE /api/v1/commands/{run_id} - Cancel command
    /// - GET /api/v1/container - Lifecycle state of every component
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/components/{id}/commands", post(submit_command::<H>))
            .route(
                "/api/v1/commands/{run_id}",
                get(command_status::<H>).delete(cancel_command::<H>),
            )
            .route("/api/v1/container", get(container_status::<H>))
            .with_state(self.handler)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ComponentNotFound(_) | ApiError::RunNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitCommandRequest {
    command: Command,
    #[serde(default)]
    obs_id: Option<ObsId>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitCommandResponse {
    run_id: RunId,
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    /// Block until the run is terminal.
    #[serde(default)]
    wait: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandStatusResponse {
    run_id: RunId,
    terminal: bool,
    status: CommandStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelCommandResponse {
    run_id: RunId,
    cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Handlers
// ============================================================================

fn parse_component(id: &str) -> Result<ComponentId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::InvalidRequest(format!("invalid component id: '{id}'")))
}

fn parse_run(id: &str) -> Result<RunId, ApiError> {
    RunId::parse_str(id).ok_or_else(|| ApiError::InvalidRequest(format!("invalid run id: '{id}'")))
}

/// POST /api/v1/components/{id}/commands
async fn submit_command<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
    Json(req): Json<SubmitCommandRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let target = parse_component(&id)?;
    debug!(component = %target, prefix = %req.command.prefix(), "submitting command");
    let run_id = handler.submit_command(&target, req.command, req.obs_id).await?;

    Ok((StatusCode::ACCEPTED, Json(SubmitCommandResponse { run_id })))
}

/// GET /api/v1/commands/{run_id}
async fn command_status<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
    Query(params): Query<StatusParams>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let run_id = parse_run(&id)?;
    let status = if params.wait {
        handler.await_completion(&run_id).await?
    } else {
        handler.command_status(&run_id).await?
    };

    Ok(Json(CommandStatusResponse {
        run_id,
        terminal: status.is_terminal(),
        status,
    }))
}

/// DELETE /api/v1/commands/{run_id}
async fn cancel_command<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let run_id = parse_run(&id)?;
    let cancelled = handler.cancel_command(&run_id).await?;
    debug!(%run_id, cancelled, "cancel handled");

    Ok(Json(CancelCommandResponse { run_id, cancelled }))
}

/// GET /api/v1/container
async fn container_status<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let status = handler.container_status().await?;
    Ok(Json(ContainerView::from(status)))
}
