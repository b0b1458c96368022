//! Keel CLI
//!
//! Operator entry point. `keel up` assembles the stack selected by the mode
//! flag; the other commands inspect or exercise the pipeline locally.

mod assembly;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::{Config, Executor, Settings};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Keel deployment pipeline and compute provisioning", long_about = None)]
struct Cli {
    /// Deployment environment to resolve
    #[arg(long, env = "KEEL_ENVIRONMENT", default_value = "Production", global = true)]
    environment: String,

    /// Directory holding `.env.<environment>` secret files (default: process environment)
    #[arg(long, env = "KEEL_SECRETS_DIR", global = true)]
    secrets_dir: Option<PathBuf>,

    /// JSON catalog of environment profiles (default: built-in catalog)
    #[arg(long, env = "KEEL_PROFILES", global = true)]
    profiles: Option<PathBuf>,

    /// JSON file with the deployment recipe, assessment and cluster settings
    #[arg(long, env = "KEEL_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    /// Root directory for run workspaces
    #[arg(long, env = "KEEL_WORKSPACE", default_value = ".keel/runs", global = true)]
    workspace: PathBuf,

    /// Keep run workspaces after runs end
    #[arg(long, global = true)]
    keep_workspaces: bool,

    /// Runs kept in memory; past this the oldest finished runs are dropped
    #[arg(long, env = "KEEL_RETAIN_RUNS", default_value = "100", global = true)]
    retain_runs: usize,

    /// Base URL of the assessment service
    #[arg(
        long,
        env = "KEEL_ASSESSMENT_URL",
        default_value = "http://localhost:8090",
        global = true
    )]
    assessment_url: String,

    /// Where build commands run: an isolated privileged podman container,
    /// or `local` to run them in a shell on this host during development
    #[arg(long, env = "KEEL_EXECUTOR", value_enum, default_value = "podman", global = true)]
    executor: Executor,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel=info,keel_orchestrator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config {
        environment: cli.environment,
        secrets_dir: cli.secrets_dir,
        profiles: cli.profiles,
        workspace: cli.workspace,
        keep_workspaces: cli.keep_workspaces,
        retain_runs: cli.retain_runs,
        assessment_url: cli.assessment_url,
        executor: cli.executor,
        settings: Settings::load(cli.settings.as_deref())?,
    };
    config.validate()?;

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_run_in_podman_by_default() {
        let cli = Cli::try_parse_from(["keel", "pipeline", "env"]).unwrap();
        assert_eq!(cli.executor, Executor::Podman);
        assert_eq!(cli.retain_runs, 100);

        let cli = Cli::try_parse_from([
            "keel",
            "--executor",
            "local",
            "--retain-runs",
            "5",
            "pipeline",
            "env",
        ])
        .unwrap();
        assert_eq!(cli.executor, Executor::Local);
        assert_eq!(cli.retain_runs, 5);
    }
}
