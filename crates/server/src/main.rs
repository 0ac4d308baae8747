mod api;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use boardpilot_core::config::{AppConfig, LoadOptions};
use tokio::net::TcpListener;

fn init_logging(config: &AppConfig) {
    use boardpilot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let server = &app.config.server;

    let router = api::router(api::ApiState::new(app.runtime.clone()), server.static_dir.as_deref())
        .merge(health::router(health::HealthState::new(app.runtime.clone(), app.workspace_mode)));

    let address = format!("{}:{}", server.bind_address, server.port);
    let listener = TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        workspace_mode = app.workspace_mode,
        "boardpilot-server listening"
    );

    let grace = Duration::from_secs(server.graceful_shutdown_secs);
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown(grace)).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "boardpilot-server stopped"
    );
    Ok(())
}

/// Resolves on ctrl-c. In-flight requests then get `grace` before the
/// process exits regardless.
async fn wait_for_shutdown(grace: Duration) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(event_name = "system.server.signal_failed", error = %error, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!(
        event_name = "system.server.draining",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "shutdown requested; draining in-flight requests"
    );
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::warn!(event_name = "system.server.forced_exit", correlation_id = "shutdown", "grace period elapsed");
        std::process::exit(0);
    });
}
