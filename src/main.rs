mod config;
mod executor;
mod runner;
mod server;
mod validator;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{BackendPolicy, SandboxConfig};
use crate::executor::Executor;
use crate::runner::ContainerRunner;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("code_executor=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = SandboxConfig::load().context("Failed to load sandbox configuration")?;
    info!(
        "Sandbox config: backend={:?}, image={}, default_timeout={}s, max_timeout={}s",
        config.backend,
        config.container.image,
        config.default_timeout_secs,
        config.max_timeout_secs
    );

    let container = ContainerRunner::new(&config);
    let executor = Arc::new(Executor::new(config));

    match executor.config().backend {
        BackendPolicy::Process => {
            warn!("Container backend disabled; submissions run as plain processes (weak isolation)")
        }
        policy => {
            if executor.container_available().await {
                info!("Container runtime is reachable");
                if let Err(e) = container.ensure_image().await {
                    warn!("Sandbox image {} unavailable: {}", executor.config().container.image, e);
                }
            } else if policy == BackendPolicy::Auto {
                warn!(
                    "Container runtime unreachable; submissions will run as plain processes (weak isolation) until it comes back"
                );
            } else {
                warn!("Container runtime unreachable; submissions will fail until it comes back");
            }
        }
    }

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Code executor listening on {}", bind_addr);

    axum::serve(listener, server::router(executor))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Code executor stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
