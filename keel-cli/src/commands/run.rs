//! `keel run`
//!
//! Runs the pipeline once, in the foreground, for a given commit.

use anyhow::{Result, bail};
use colored::*;
use keel_core::domain::log::{LogEntry, LogLevel};
use keel_core::domain::run::{PipelineRun, RunStatus, StageStatus};

use crate::config::Config;

pub async fn handle_run(config: &Config, commit: &str, branch: Option<String>) -> Result<()> {
    let orchestrator = config.orchestrator().await?;

    let mut event = orchestrator.definition().trigger().event(commit);
    if let Some(branch) = branch {
        event.branch = branch;
    }

    let Some(run) = orchestrator.run(event.clone()).await else {
        println!(
            "{}",
            format!(
                "Branch '{}' does not trigger pipeline {}; nothing to do",
                event.branch,
                orchestrator.definition().name()
            )
            .yellow()
        );
        return Ok(());
    };

    if let Some(logs) = orchestrator.store().logs(run.id).await {
        for entry in &logs {
            print_log_entry(entry);
        }
        println!();
    }

    print_run(&run);

    match &run.status {
        RunStatus::Failed { stage, cause } => bail!("run failed in {} stage: {}", stage, cause),
        _ => Ok(()),
    }
}

fn print_run(run: &PipelineRun) {
    println!("{}", "Run Details:".bold());
    println!("  ID:       {}", run.id.to_string().cyan());
    println!("  Pipeline: {}", run.pipeline.bold());
    println!(
        "  Commit:   {} ({}/{}@{})",
        run.trigger.commit_ref,
        run.trigger.owner,
        run.trigger.repo,
        run.trigger.branch
    );
    println!("  Status:   {}", colorize_run_status(&run.status));

    if let Some(completed) = run.completed_at {
        let seconds = completed.signed_duration_since(run.created_at).num_seconds();
        println!("  Duration: {}s", seconds);
    }

    println!("\n{}", "Stages:".bold());
    for stage in &run.stages {
        let marker = match stage.status {
            StageStatus::Succeeded => "✓".green(),
            StageStatus::Failed => "✗".red(),
            StageStatus::Skipped => "-".dimmed(),
            StageStatus::Pending | StageStatus::Running => "·".yellow(),
        };
        println!(
            "  {} {} {}",
            marker,
            stage.name.bold(),
            format!("({:?})", stage.status).dimmed()
        );
        if let Some(detail) = &stage.detail {
            println!("      {}", detail.dimmed());
        }
    }
}

/// Print a log entry
fn print_log_entry(log: &LogEntry) {
    let level_str = format!("{:?}", log.level).to_uppercase();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}

fn colorize_run_status(status: &RunStatus) -> ColoredString {
    match status {
        RunStatus::Pending => "Pending".yellow(),
        RunStatus::Running { stage } => format!("Running ({})", stage).cyan(),
        RunStatus::Succeeded => "Succeeded".green(),
        RunStatus::Failed { stage, .. } => format!("Failed ({})", stage).red(),
    }
}
