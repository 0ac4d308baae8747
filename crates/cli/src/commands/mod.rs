pub mod ask;
pub mod config;
pub mod doctor;
pub mod memory;
pub mod repl;

use std::sync::Arc;

use boardpilot_agent::AgentRuntime;
use boardpilot_core::config::{AppConfig, LoadOptions};
use boardpilot_core::workspace::{InMemoryWorkspace, ResourceApi};
use boardpilot_db::MemoryStore;
use boardpilot_monday::MondayClient;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_WORKSPACE: u8 = 4;
pub const EXIT_AGENT: u8 = 5;
pub const EXIT_REQUEST_FAILED: u8 = 6;
pub const EXIT_MEMORY: u8 = 7;
pub const EXIT_USAGE: u8 = 64;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with(command, error_class, message, exit_code, None)
    }

    pub fn failure_with(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

/// Config for commands that only touch the memory file.
pub(crate) fn load_memory_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load_memory_section(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn async_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

pub(crate) async fn open_memory(config: &AppConfig) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::open_file(&config.memory.path, config.memory.max_conversations).await)
}

/// Wires the request pipeline the same way the server does: sandbox
/// workspace or monday.com client, file-backed memory, OpenRouter models.
pub(crate) async fn agent_runtime(
    command: &str,
    config: &AppConfig,
) -> Result<AgentRuntime, CommandResult> {
    let api: Arc<dyn ResourceApi> = if config.monday.sandbox {
        Arc::new(InMemoryWorkspace::new())
    } else {
        let client = MondayClient::from_config(&config.monday).map_err(|error| {
            CommandResult::failure(command, "workspace_client", error.to_string(), EXIT_WORKSPACE)
        })?;
        Arc::new(client)
    };
    let memory = open_memory(config).await;

    AgentRuntime::from_config(config, api, memory).map_err(|error| {
        CommandResult::failure(command, "agent_init", format!("{error:#}"), EXIT_AGENT)
    })
}
