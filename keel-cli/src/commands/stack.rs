//! Compute stack command handlers
//!
//! Plans, provisions and tears down the service described by the cluster
//! settings.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use keel_compute::plan::BACKEND_URL_OUTPUT;
use keel_compute::{
    DryRunProvisioner, HealthMonitor, HealthState, HttpProbe, PodmanProvisioner, Provisioner,
};
use keel_core::domain::compute::RunningService;

use crate::config::Config;

/// Stack subcommands
#[derive(Subcommand)]
pub enum StackCommands {
    /// Print the resource plan without creating anything
    Plan,
    /// Provision the service
    Provision {
        /// Render the plan and synthesize the endpoint only
        #[arg(long)]
        dry_run: bool,

        /// Health checks to wait for after provisioning (0 to skip)
        #[arg(long, default_value = "0")]
        wait_checks: u32,
    },
    /// Remove every replica and the network of the service
    Down,
}

/// Handle stack commands
pub async fn handle_stack_command(command: StackCommands, config: &Config) -> Result<()> {
    match command {
        StackCommands::Plan => show_plan(config),
        StackCommands::Provision {
            dry_run,
            wait_checks,
        } => provision(config, dry_run, wait_checks).await,
        StackCommands::Down => teardown(config).await,
    }
}

/// Print the resource plan
fn show_plan(config: &Config) -> Result<()> {
    let spec = config.settings.cluster.spec();
    let plan = DryRunProvisioner::default()
        .plan(&spec)
        .context("Failed to plan the compute stack")?;

    println!("{}", format!("Resource plan for {}:", spec.name).bold());
    for resource in &plan.resources {
        println!("  {} {}", resource.kind.cyan(), resource.name.bold());
        for (key, value) in &resource.properties {
            println!("      {} = {}", key.dimmed(), value);
        }
        if !resource.depends_on.is_empty() {
            println!(
                "      {} {}",
                "depends on".dimmed(),
                resource.depends_on.join(", ").dimmed()
            );
        }
    }

    if !plan.outputs.is_empty() {
        println!("\n{}", "Outputs:".bold());
        for (name, source) in &plan.outputs {
            println!("  {} <- {}", name.cyan(), source.dimmed());
        }
    }

    Ok(())
}

/// Provision the service and print its outputs
///
/// With `wait_checks > 0`, polls the endpoint's health path until the
/// health state settles or the checks run out.
pub async fn provision(config: &Config, dry_run: bool, wait_checks: u32) -> Result<()> {
    let spec = config.settings.cluster.spec();
    let provisioner = config.provisioner(dry_run);

    let service = provisioner
        .provision(&spec)
        .await
        .with_context(|| format!("Failed to provision {}", spec.name))?;

    print_service(&service, dry_run);

    if wait_checks > 0 && !dry_run {
        let monitor = HealthMonitor::new(HttpProbe::new(), spec.health_check.clone());
        match monitor.wait_until_settled(&service.endpoint, wait_checks).await {
            HealthState::Healthy => println!("{}", "✓ Service is healthy".green().bold()),
            HealthState::Unhealthy => {
                anyhow::bail!("service {} is unhealthy", service.name)
            }
            HealthState::Initial => println!(
                "{}",
                format!("⚠ Health not settled after {} check(s)", wait_checks).yellow()
            ),
        }
    }

    Ok(())
}

async fn teardown(config: &Config) -> Result<()> {
    let spec = config.settings.cluster.spec();
    PodmanProvisioner::new(config.settings.cluster.host.clone())
        .teardown(&spec)
        .await
        .with_context(|| format!("Failed to tear down {}", spec.name))?;

    println!("{}", format!("✓ Removed {}", spec.name).green().bold());
    Ok(())
}

fn print_service(service: &RunningService, dry_run: bool) {
    let headline = if dry_run {
        "✓ Stack planned (dry run)"
    } else {
        "✓ Stack provisioned"
    };
    println!("{}", headline.green().bold());
    println!("  Service:  {}", service.name.bold());
    println!("  Replicas: {}", service.replicas);
    println!("  Endpoint: {}", service.endpoint.to_string().cyan());
    println!("  Target:   {}", service.target.dimmed());

    if let Some(url) = service.outputs.get(BACKEND_URL_OUTPUT) {
        println!("  {}: {}", BACKEND_URL_OUTPUT, url.cyan());
    }
}
