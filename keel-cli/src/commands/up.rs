//! `keel up`
//!
//! Materializes whichever component the mode flag selects: the compute
//! stack, or the pipeline service listening for source-control webhooks.

use anyhow::{Context, Result};
use colored::*;
use keel_orchestrator::api::{AppState, create_router};
use tracing::info;

use crate::assembly::{self, AssemblyMode, Component};
use crate::commands::stack;
use crate::config::Config;

pub async fn handle_up(
    config: &Config,
    mode: Option<AssemblyMode>,
    bind: &str,
    dry_run: bool,
    wait_checks: u32,
) -> Result<()> {
    match assembly::select(mode) {
        Some(Component::ComputeStack) => stack::provision(config, dry_run, wait_checks).await,
        Some(Component::PipelineService) => serve(config, bind).await,
        None => {
            println!(
                "{}",
                "No component selected; set --mode (or KEEL_MODE) to stack or pipeline".yellow()
            );
            Ok(())
        }
    }
}

/// Serve the pipeline's webhook API until interrupted
async fn serve(config: &Config, bind: &str) -> Result<()> {
    let orchestrator = config.orchestrator().await?;
    let definition = orchestrator.definition();
    let trigger = definition.trigger();

    info!(
        "Pipeline {} listening to {}/{}@{} ({} stage(s))",
        definition.name(),
        trigger.owner,
        trigger.repo,
        trigger.branch,
        definition.stages().len()
    );

    let app = create_router(AppState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;

    info!("Listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    info!("Pipeline service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
