use std::sync::Arc;

use boardpilot_agent::AgentRuntime;
use boardpilot_core::config::{AppConfig, ConfigError, LoadOptions};
use boardpilot_core::workspace::{ApiError, InMemoryWorkspace, ResourceApi};
use boardpilot_db::MemoryStore;
use boardpilot_monday::MondayClient;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
    pub workspace_mode: &'static str,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("workspace client setup failed: {0}")]
    Workspace(#[source] ApiError),
    #[error("agent runtime setup failed: {0}")]
    Agent(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let (api, workspace_mode): (Arc<dyn ResourceApi>, &'static str) = if config.monday.sandbox {
        (Arc::new(InMemoryWorkspace::new()), "sandbox")
    } else {
        let client = MondayClient::from_config(&config.monday).map_err(BootstrapError::Workspace)?;
        (Arc::new(client), "monday")
    };
    info!(
        event_name = "system.bootstrap.workspace_ready",
        correlation_id = "bootstrap",
        workspace_mode,
        "workspace client ready"
    );

    let memory =
        Arc::new(MemoryStore::open_file(&config.memory.path, config.memory.max_conversations).await);
    info!(
        event_name = "system.bootstrap.memory_opened",
        correlation_id = "bootstrap",
        location = %memory.location(),
        "memory store opened"
    );

    let runtime = AgentRuntime::from_config(&config, api, memory)
        .map_err(|error| BootstrapError::Agent(format!("{error:#}")))?;

    Ok(Application { config, runtime: Arc::new(runtime), workspace_mode })
}

#[cfg(test)]
mod tests {
    use boardpilot_core::config::{ConfigOverrides, LoadOptions};
    use tempfile::TempDir;

    use crate::bootstrap::bootstrap;

    fn options(dir: &TempDir, overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions {
            config_path: Some(dir.path().join("absent.toml")),
            overrides: ConfigOverrides {
                memory_path: Some(dir.path().join("memory.json")),
                ..overrides
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_workspace_token() {
        let dir = TempDir::new().expect("temp dir");
        let result = bootstrap(options(
            &dir,
            ConfigOverrides {
                monday_api_key: Some(String::new()),
                monday_sandbox: Some(false),
                llm_api_key: Some("sk-or-test".to_string()),
                ..ConfigOverrides::default()
            },
        ))
        .await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("monday.api_key"), "unexpected: {message}");
    }

    #[tokio::test]
    async fn sandbox_bootstrap_opens_memory_file() {
        let dir = TempDir::new().expect("temp dir");
        let app = bootstrap(options(
            &dir,
            ConfigOverrides {
                monday_sandbox: Some(true),
                llm_api_key: Some("sk-or-test".to_string()),
                ..ConfigOverrides::default()
            },
        ))
        .await
        .expect("sandbox bootstrap");

        assert_eq!(app.workspace_mode, "sandbox");
        assert!(dir.path().join("memory.json").exists());
        assert!(app.runtime.memory().get_recent_conversations(5).await.is_empty());
    }
}
