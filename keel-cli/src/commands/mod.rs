//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod pipeline;
mod run;
mod stack;
mod up;

pub use pipeline::PipelineCommands;
pub use stack::StackCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::assembly::AssemblyMode;
use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Materialize the component selected by the mode flag
    Up {
        /// Component to materialize; nothing when unset
        #[arg(long, env = "KEEL_MODE", value_enum)]
        mode: Option<AssemblyMode>,

        /// Address the pipeline service listens on
        #[arg(long, env = "KEEL_BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: String,

        /// Render the compute stack without creating it
        #[arg(long)]
        dry_run: bool,

        /// Health checks to wait for after provisioning (0 to skip)
        #[arg(long, default_value = "0")]
        wait_checks: u32,
    },
    /// Run the pipeline once for a commit and print the result
    Run {
        /// Commit to build
        commit: String,

        /// Branch the commit was pushed to (default: the pipeline's branch)
        #[arg(long)]
        branch: Option<String>,
    },
    /// Pipeline inspection
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Compute stack management
    Stack {
        #[command(subcommand)]
        command: StackCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Up {
            mode,
            bind,
            dry_run,
            wait_checks,
        } => up::handle_up(config, mode, &bind, dry_run, wait_checks).await,
        Commands::Run { commit, branch } => run::handle_run(config, &commit, branch).await,
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Stack { command } => stack::handle_stack_command(command, config).await,
    }
}
