//! Build phase runner
//!
//! Runs install, pre_build, build and post_build in order inside one
//! execution context. Commands within a phase run in order.
//!
//! A non-zero exit code:
//! - in an ABORT phase stops the build; later commands and phases never run
//! - in a CONTINUE phase is recorded and the phase goes on

use keel_core::domain::build::{BuildProject, FailurePolicy, PhaseName};
use keel_core::domain::environment::Secret;
use keel_core::error::{BuildError, BuildPhaseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::build::backend::ExecutionContext;
use crate::run_log::RunLog;

/// A command whose failure was tolerated by a CONTINUE phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub phase: PhaseName,
    pub command: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    Succeeded,
    /// Some commands failed under a CONTINUE policy
    SucceededWithFailures,
    /// The phase has no commands
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: PhaseName,
    pub outcome: PhaseOutcome,
    pub commands_run: usize,
}

/// Result of a build that ran every phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub phases: Vec<PhaseReport>,
    pub suppressed: Vec<CommandFailure>,
    /// Variables read back from the session after the last phase
    pub exported: BTreeMap<String, String>,
}

impl BuildReport {
    /// One-line description for the stage record
    pub fn summary(&self) -> String {
        let commands: usize = self.phases.iter().map(|p| p.commands_run).sum();
        let mut summary = format!("{} command(s) in {} phase(s)", commands, self.phases.len());
        if !self.suppressed.is_empty() {
            let failures: Vec<String> = self
                .suppressed
                .iter()
                .map(|f| format!("{} `{}` -> {}", f.phase, f.command, f.exit_code))
                .collect();
            summary.push_str(&format!("; tolerated failures: {}", failures.join(", ")));
        }
        if !self.exported.is_empty() {
            let names: Vec<&str> = self.exported.keys().map(String::as_str).collect();
            summary.push_str(&format!("; exported {}", names.join(", ")));
        }
        summary
    }
}

/// Runs the phases of a build project
#[derive(Debug, Clone, Default)]
pub struct BuildRunner {
    /// Exported into the session before any phase; values never reach the log
    secrets: Vec<(String, Secret)>,
}

impl BuildRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: Secret) -> Self {
        self.secrets.push((name.into(), value));
        self
    }

    /// Runs every phase of `project` in `context`
    ///
    /// Returns the first ABORT-phase failure as `BuildError::Phase`.
    pub async fn run(
        &self,
        context: &mut dyn ExecutionContext,
        project: &BuildProject,
        log: &RunLog,
    ) -> Result<BuildReport, BuildError> {
        info!(
            "Running build project {} ({} command(s))",
            project.name,
            project.phases.command_count()
        );

        for (name, value) in &project.variables {
            context.export(name, value).await?;
        }
        for (name, secret) in &self.secrets {
            context.export(name, secret.expose()).await?;
            log.debug(format!("Secret variable {} set", name));
        }

        let mut report = BuildReport::default();

        for phase in project.phases.iter() {
            if phase.commands.is_empty() {
                report.phases.push(PhaseReport {
                    phase: phase.name,
                    outcome: PhaseOutcome::Empty,
                    commands_run: 0,
                });
                continue;
            }

            log.info(format!("Entering phase {}", phase.name));
            let mut failures = 0;

            for (idx, command) in phase.commands.iter().enumerate() {
                log.info(format!("[{}] $ {}", phase.name, command));
                let exit_code = context.run(command, log).await?;

                if exit_code == 0 {
                    continue;
                }

                match phase.failure_policy {
                    FailurePolicy::Abort => {
                        let error = BuildPhaseError {
                            phase: phase.name,
                            command: command.clone(),
                            exit_code,
                        };
                        log.error(error.to_string());
                        let skipped = skipped_after(project, phase.name);
                        if !skipped.is_empty() || idx + 1 < phase.commands.len() {
                            log.info(format!(
                                "Skipping {} remaining command(s) in {} and phase(s) [{}]",
                                phase.commands.len() - idx - 1,
                                phase.name,
                                skipped.join(", ")
                            ));
                        }
                        return Err(error.into());
                    }
                    FailurePolicy::Continue => {
                        warn!(
                            "Command `{}` in phase {} exited with {}, continuing",
                            command, phase.name, exit_code
                        );
                        log.warning(format!(
                            "[{}] command `{}` exited with code {}; continuing",
                            phase.name, command, exit_code
                        ));
                        failures += 1;
                        report.suppressed.push(CommandFailure {
                            phase: phase.name,
                            command: command.clone(),
                            exit_code,
                        });
                    }
                }
            }

            report.phases.push(PhaseReport {
                phase: phase.name,
                outcome: if failures == 0 {
                    PhaseOutcome::Succeeded
                } else {
                    PhaseOutcome::SucceededWithFailures
                },
                commands_run: phase.commands.len(),
            });
        }

        for name in &project.exported_variables {
            match context.read_var(name).await? {
                Some(value) => {
                    log.info(format!("Build exported {}", name));
                    report.exported.insert(name.clone(), value);
                }
                None => log.warning(format!("Build did not export {}", name)),
            }
        }

        Ok(report)
    }
}

/// Names of the non-empty phases after `phase`
fn skipped_after(project: &BuildProject, phase: PhaseName) -> Vec<&'static str> {
    project
        .phases
        .iter()
        .filter(|p| p.name > phase && !p.commands.is_empty())
        .map(|p| p.name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::session::ShellSession;
    use keel_core::domain::build::{BuildEnvironment, BuildPhaseSet, Phase};
    use uuid::Uuid;

    fn project(phases: BuildPhaseSet) -> BuildProject {
        BuildProject {
            name: "deploy".to_string(),
            environment: BuildEnvironment::default(),
            variables: BTreeMap::new(),
            phases,
            exported_variables: vec!["STACK_ARN".to_string()],
        }
    }

    async fn run(
        project: &BuildProject,
        runner: BuildRunner,
    ) -> (Result<BuildReport, BuildError>, RunLog) {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ShellSession::local(dir.path()).await.unwrap();
        let log = RunLog::new(Uuid::new_v4());
        let result = runner.run(&mut session, project, &log).await;
        session.shutdown().await;
        (result, log)
    }

    #[tokio::test]
    async fn test_all_phases_share_one_session() {
        let phases = BuildPhaseSet::new()
            .with_phase(Phase::new(PhaseName::PreBuild).commands(["mkdir infra", "cd infra"]))
            .with_phase(Phase::new(PhaseName::Build).command("touch deployed"))
            .with_phase(
                Phase::new(PhaseName::PostBuild)
                    .command("test -f deployed && export STACK_ARN=stack-A"),
            );

        let (result, _log) = run(&project(phases), BuildRunner::new()).await;
        let report = result.unwrap();

        assert_eq!(report.exported["STACK_ARN"], "stack-A");
        assert_eq!(report.phases[0].outcome, PhaseOutcome::Empty);
        assert!(report.phases[1..]
            .iter()
            .all(|p| p.outcome == PhaseOutcome::Succeeded));
    }

    #[tokio::test]
    async fn test_abort_stops_build() {
        let phases = BuildPhaseSet::new()
            .with_phase(Phase::new(PhaseName::Build).commands([
                "echo deploying",
                "sh -c 'exit 4'",
                "echo unreachable",
            ]))
            .with_phase(Phase::new(PhaseName::PostBuild).command("echo post"));

        let (result, log) = run(&project(phases), BuildRunner::new()).await;

        match result {
            Err(BuildError::Phase(e)) => {
                assert_eq!(e.phase, PhaseName::Build);
                assert_eq!(e.exit_code, 4);
            }
            other => panic!("expected phase error, got {:?}", other),
        }
        assert!(log.contains("deploying"));
        assert!(!log.contains("unreachable"));
        assert!(!log.contains("$ echo post"));
    }

    #[tokio::test]
    async fn test_first_build_command_failure_skips_post_build() {
        let phases = BuildPhaseSet::new()
            .with_phase(Phase::new(PhaseName::PreBuild).command("echo prepared"))
            .with_phase(
                Phase::new(PhaseName::Build).commands(["sh -c 'exit 5'", "echo unreachable"]),
            )
            .with_phase(Phase::new(PhaseName::PostBuild).command("echo exporting"));

        let (result, log) = run(&project(phases), BuildRunner::new()).await;

        match result {
            Err(BuildError::Phase(e)) => {
                assert_eq!(e.phase, PhaseName::Build);
                assert_eq!(e.command, "sh -c 'exit 5'");
                assert_eq!(e.exit_code, 5);
            }
            other => panic!("expected phase error, got {:?}", other),
        }
        assert!(log.contains("prepared"));
        assert!(!log.contains("unreachable"));
        assert!(!log.contains("exporting"));
    }

    #[tokio::test]
    async fn test_continue_tolerates_failure() {
        let phases = BuildPhaseSet::new()
            .with_phase(
                Phase::new(PhaseName::Install)
                    .commands(["false", "echo after"])
                    .failure_policy(FailurePolicy::Continue),
            )
            .with_phase(Phase::new(PhaseName::Build).command("echo built"));

        let (result, log) = run(&project(phases), BuildRunner::new()).await;
        let report = result.unwrap();

        assert_eq!(report.suppressed.len(), 1);
        assert_eq!(report.suppressed[0].exit_code, 1);
        assert_eq!(report.phases[0].outcome, PhaseOutcome::SucceededWithFailures);
        assert!(log.contains("after"));
        assert!(log.contains("built"));
        assert!(report.summary().contains("tolerated failures"));
    }

    #[tokio::test]
    async fn test_secrets_are_exported_but_not_logged() {
        let phases = BuildPhaseSet::new().with_phase(
            Phase::new(PhaseName::Build).command("test \"${#REGISTRY_PASSWORD}\" -eq 7"),
        );
        let runner = BuildRunner::new().with_secret("REGISTRY_PASSWORD", Secret::new("hunter2"));

        let (result, log) = run(&project(phases), runner).await;
        assert!(result.is_ok());
        assert!(!log.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_missing_export_is_not_an_error() {
        let phases = BuildPhaseSet::new().with_phase(Phase::new(PhaseName::Build).command("true"));
        let (result, log) = run(&project(phases), BuildRunner::new()).await;
        assert!(result.unwrap().exported.is_empty());
        assert!(log.contains("did not export STACK_ARN"));
    }
}
