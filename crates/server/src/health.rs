use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use boardpilot_agent::AgentRuntime;

#[derive(Clone)]
pub struct HealthState {
    runtime: Arc<AgentRuntime>,
    workspace_mode: &'static str,
}

impl HealthState {
    pub fn new(runtime: Arc<AgentRuntime>, workspace_mode: &'static str) -> Self {
        Self { runtime, workspace_mode }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub memory: HealthCheck,
    pub workspace: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let memory = state.runtime.memory();
    let conversations = memory.conversation_count().await;

    let memory_check = if memory.is_persisting() {
        HealthCheck {
            status: "ready",
            detail: format!("{conversations} conversations at {}", memory.location()),
        }
    } else {
        HealthCheck {
            status: "degraded",
            detail: format!("last write to {} failed", memory.location()),
        }
    };
    let ready = memory_check.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!(
                "boardpilot-server runtime initialized (autonomous agent {})",
                if state.runtime.autonomous_enabled() { "enabled" } else { "disabled" }
            ),
        },
        memory: memory_check,
        workspace: HealthCheck { status: "ready", detail: format!("{} workspace", state.workspace_mode) },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(payload))
}
