//! Pipeline command handlers
//!
//! Shows the resolved environment and the pipeline definition built from
//! it. Nothing here touches the source repository or the target.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use keel_core::domain::assessment::Identifier;
use keel_core::domain::environment::EnvironmentConfig;
use keel_core::domain::pipeline::{PipelineDefinition, StageAction};

use crate::config::Config;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Show the pipeline definition for the environment
    Show {
        /// Print the definition as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved environment configuration (secrets redacted)
    Env,
}

/// Handle pipeline commands
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let env = config.resolve_environment()?;

    match command {
        PipelineCommands::Show { json } => {
            let definition = config.definition(&env)?;
            if json {
                let text = serde_json::to_string_pretty(&definition)
                    .context("Failed to serialize pipeline definition")?;
                println!("{}", text);
            } else {
                print_definition(&definition);
            }
            Ok(())
        }
        PipelineCommands::Env => {
            print_environment(&env);
            Ok(())
        }
    }
}

fn print_environment(env: &EnvironmentConfig) {
    println!("{}", format!("Environment {}:", env.environment).bold());
    println!("  Repository:     {}/{}", env.repo_owner, env.repo_name);
    println!("  Branch:         {}", env.branch.cyan());
    println!("  Tag:            {}", env.tag);
    println!("  Deploy command: {}", env.deploy_command.dimmed());
    println!("  Source token:   {}", env.source_token);

    match env.registry_credentials() {
        Some(creds) => println!(
            "  Registry login: {} ({} / {})",
            "enabled".green(),
            creds.username,
            creds.password
        ),
        None => println!("  Registry login: {}", "skipped".yellow()),
    }
}

fn print_definition(definition: &PipelineDefinition) {
    println!("{}", format!("Pipeline {}:", definition.name()).bold());

    if !definition.tags().is_empty() {
        let tags = definition
            .tags()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  Tags: {}", tags.dimmed());
    }

    for (i, stage) in definition.stages().iter().enumerate() {
        println!(
            "\n  {} {} {}",
            format!("{}.", i + 1).dimmed(),
            stage.name.bold(),
            format!("[{}]", stage.kind()).cyan()
        );

        match &stage.action {
            StageAction::Fetch(fetch) => {
                let trigger = &fetch.trigger;
                println!(
                    "     on push to {}/{}@{}",
                    trigger.owner, trigger.repo, trigger.branch
                );
            }
            StageAction::Build(build) => {
                let project = &build.project;
                println!(
                    "     project {} ({}, {:?}{})",
                    project.name,
                    project.environment.image.dimmed(),
                    project.environment.compute_type,
                    if project.environment.privileged {
                        ", privileged"
                    } else {
                        ""
                    }
                );
                for phase in project.phases.iter() {
                    println!(
                        "     {} {}",
                        format!("{}:", phase.name).cyan(),
                        format!("on failure {:?}", phase.failure_policy).dimmed()
                    );
                    for command in &phase.commands {
                        println!("       $ {}", command);
                    }
                }
                if !project.exported_variables.is_empty() {
                    println!(
                        "     exports {}",
                        project.exported_variables.join(", ")
                    );
                }
            }
            StageAction::Assess(assess) => {
                println!(
                    "     start {} (executions named {}-<id>)",
                    assess.state_machine_id, assess.execution_name_prefix
                );
                println!(
                    "     stack:       {}",
                    describe_identifier(&assess.stack_identifier)
                );
                println!(
                    "     application: {}",
                    describe_identifier(&assess.application_identifier)
                );
            }
        }
    }
}

fn describe_identifier(identifier: &Identifier) -> String {
    match identifier {
        Identifier::Fixed(value) => value.clone(),
        Identifier::FromBuild(var) => format!("${} from the build", var),
    }
}
