//! Conveyor server.

use anyhow::Context;
use conveyor_api::{AppState, routes};
use conveyor_config::{ConfigError, SystemConfig};
use conveyor_engine::{BuildQueue, Orchestrator};
use conveyor_executor::DockerRuntime;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("CONVEYOR_CONFIG").unwrap_or_else(|_| "conveyor.kdl".to_string());
    let config = match SystemConfig::load(&config_path) {
        Ok(config) => config,
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %config_path, "No configuration file, using defaults");
            SystemConfig::default()
        }
        Err(e) => return Err(e).context(format!("loading {config_path}")),
    };

    let template = std::fs::read_to_string(&config.pipeline_template).with_context(|| {
        format!(
            "reading pipeline template {}",
            config.pipeline_template.display()
        )
    })?;

    info!("Connecting to Docker daemon...");
    let runtime = DockerRuntime::connect().context("connecting to Docker")?;

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(runtime),
        config.scratch_root.clone(),
        config.workspace_cleanup,
    ));
    let queue = Arc::new(BuildQueue::start(
        orchestrator,
        template,
        config.queue_capacity,
        config.max_concurrent_builds,
    ));
    let state = AppState::new(queue);

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    info!("Starting server on {}", config.listen);
    let listener = TcpListener::bind(config.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
