//! JSON API routes.
//!
//! - `POST /api/process`                    run a natural-language request
//! - `GET  /api/boards`                     list boards
//! - `GET  /api/workspaces`                 list workspaces
//! - `GET  /api/memory/conversations`       recent conversations (`?limit=`)
//! - `GET  /api/memory/creations`           recent creations (`?limit=`)
//! - `GET  /api/memory/resources/{type}`    registered resources of one type
//! - `POST /api/memory/clear`               reset memory

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::services::ServeDir;
use tracing::{error, info};

use boardpilot_agent::{AgentRuntime, Strategy};
use boardpilot_core::domain::plan::ResourceType;
use boardpilot_core::ExecutionReport;

const DEFAULT_LIST_LIMIT: usize = 10;

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<AgentRuntime>,
}

impl ApiState {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default, alias = "useLangChain")]
    pub use_agent: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn limit(&self) -> usize {
        self.limit.filter(|limit| *limit > 0).unwrap_or(DEFAULT_LIST_LIMIT)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiFailure {
    pub success: bool,
    pub message: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiFailure>)>;

fn failure(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiFailure>) {
    (status, Json(ApiFailure { success: false, message: message.into() }))
}

pub fn router(state: ApiState, static_dir: Option<&FsPath>) -> Router {
    let router = Router::new()
        .route("/api/process", post(process))
        .route("/api/boards", get(boards))
        .route("/api/workspaces", get(workspaces))
        .route("/api/memory/conversations", get(conversations))
        .route("/api/memory/creations", get(creations))
        .route("/api/memory/resources/{type}", get(resources))
        .route("/api/memory/clear", post(clear))
        .with_state(state);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

pub async fn process(
    State(state): State<ApiState>,
    Json(body): Json<ProcessRequest>,
) -> ApiResult<ExecutionReport> {
    let user_input = body.user_input.as_deref().map(str::trim).unwrap_or_default();
    if user_input.is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "User input is required"));
    }

    let strategy = if body.use_agent { Strategy::Autonomous } else { Strategy::Dispatcher };
    info!(event_name = "api.process.received", strategy = ?strategy, "processing request");
    Ok(Json(state.runtime.process(user_input, strategy).await))
}

pub async fn boards(State(state): State<ApiState>) -> ApiResult<Value> {
    let boards = state.runtime.api().get_boards().await.map_err(|error| {
        error!(event_name = "api.boards.failed", error = %error, "board listing failed");
        failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Error getting boards: {error}"))
    })?;
    Ok(Json(json!(boards)))
}

pub async fn workspaces(State(state): State<ApiState>) -> ApiResult<Value> {
    let workspaces = state.runtime.api().get_workspaces().await.map_err(|error| {
        error!(event_name = "api.workspaces.failed", error = %error, "workspace listing failed");
        failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Error getting workspaces: {error}"))
    })?;
    Ok(Json(json!(workspaces)))
}

pub async fn conversations(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Value> {
    let conversations = state.runtime.memory().get_recent_conversations(query.limit()).await;
    Ok(Json(json!({ "success": true, "conversations": conversations })))
}

pub async fn creations(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Value> {
    let creations = state.runtime.memory().get_recent_creations(query.limit()).await;
    Ok(Json(json!({ "success": true, "creations": creations })))
}

pub async fn resources(
    State(state): State<ApiState>,
    Path(resource_type): Path<String>,
) -> ApiResult<Value> {
    let Some(resource_type) = ResourceType::parse(&resource_type) else {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            format!("Unknown resource type: {resource_type}"),
        ));
    };
    let resources = state.runtime.memory().get_resources(resource_type).await;
    Ok(Json(json!({ "success": true, "resources": resources })))
}

pub async fn clear(State(state): State<ApiState>) -> ApiResult<Value> {
    state.runtime.memory().clear_memory().await.map_err(|error| {
        error!(event_name = "api.memory.clear_failed", error = %error, "memory clear failed");
        failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Error clearing memory: {error}"))
    })?;
    Ok(Json(json!({ "success": true, "message": "Memory cleared successfully" })))
}
