//! Pipeline definitions
//!
//! `PipelineBuilder` assembles the fixed [Fetch, Build, (Assess)?] stage list
//! and validates it. `DeploymentRecipe` turns an `EnvironmentConfig` into the
//! build project that deploys the application.

use keel_core::domain::build::{
    BuildEnvironment, BuildPhaseSet, BuildProject, FailurePolicy, Phase, PhaseName,
};
use keel_core::domain::environment::EnvironmentConfig;
use keel_core::domain::pipeline::{
    AssessAction, BuildAction, FetchAction, PipelineDefinition, Stage, StageAction,
};
use keel_core::domain::trigger::SourceTrigger;
use keel_core::error::DefinitionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::build::session::quote;

pub const SOURCE_STAGE: &str = "Source";
pub const BUILD_STAGE: &str = "Build-and-Deploy";
pub const ASSESS_STAGE: &str = "Run-Resilience-Assessment";

/// Tag carrying the environment's pipeline tag
pub const CONTEXT_TAG: &str = "Context";
/// Tag carrying the project name
pub const PROJECT_TAG: &str = "Project";

/// Session variable holding the deployed stack's identity
pub const STACK_IDENTITY_VAR: &str = "STACK_ARN";
/// Session variables holding the registry credentials
pub const REGISTRY_USERNAME_VAR: &str = "REGISTRY_USERNAME";
pub const REGISTRY_PASSWORD_VAR: &str = "REGISTRY_PASSWORD";

/// Builds a validated `PipelineDefinition`
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    name: String,
    source: Option<SourceTrigger>,
    build: Option<BuildProject>,
    assess: Option<AssessAction>,
    tags: BTreeMap<String, String>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Pipeline for one environment: source from the config, build from the
    /// recipe, tagged with the environment tag
    pub fn for_environment(config: &EnvironmentConfig, recipe: &DeploymentRecipe) -> Self {
        Self::new(config.tag.clone())
            .source(SourceTrigger::new(
                &config.repo_owner,
                &config.repo_name,
                &config.branch,
            ))
            .build(recipe.project(config))
            .tag(CONTEXT_TAG, &config.tag)
            .tag(PROJECT_TAG, &config.repo_name)
    }

    pub fn source(mut self, trigger: SourceTrigger) -> Self {
        self.source = Some(trigger);
        self
    }

    pub fn build(mut self, project: BuildProject) -> Self {
        self.build = Some(project);
        self
    }

    pub fn assess(mut self, action: AssessAction) -> Self {
        self.assess = Some(action);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Validates and returns the definition
    pub fn finish(self) -> Result<PipelineDefinition, DefinitionError> {
        let mut stages = Vec::with_capacity(3);

        if let Some(trigger) = self.source {
            stages.push(Stage::new(
                SOURCE_STAGE,
                StageAction::Fetch(FetchAction { trigger }),
            ));
        }
        if let Some(project) = self.build {
            stages.push(Stage::new(
                BUILD_STAGE,
                StageAction::Build(BuildAction { project }),
            ));
        }
        if let Some(action) = self.assess {
            stages.push(Stage::new(ASSESS_STAGE, StageAction::Assess(action)));
        }

        PipelineDefinition::new(self.name, stages, self.tags)
    }
}

/// How the deployment build is laid out
///
/// Phases:
/// - install: `install_commands`
/// - pre_build: `cd '<working_dir>'` then `setup_commands`
/// - build: registry login (when enabled and credentials exist), then the
///   environment's deploy command
/// - post_build: exports the stack identity, when a command for it is set
///
/// Every phase aborts on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentRecipe {
    pub project_name: String,
    pub environment: BuildEnvironment,
    pub working_dir: Option<String>,
    pub install_commands: Vec<String>,
    pub setup_commands: Vec<String>,
    pub registry_login: bool,
    /// Prints the deployed stack's identity; its output becomes `STACK_ARN`
    pub stack_identity_command: Option<String>,
}

impl Default for DeploymentRecipe {
    fn default() -> Self {
        Self {
            project_name: "deploy".to_string(),
            environment: BuildEnvironment::default(),
            working_dir: Some("infrastructure".to_string()),
            install_commands: Vec::new(),
            setup_commands: vec!["npm install".to_string()],
            registry_login: true,
            stack_identity_command: None,
        }
    }
}

impl DeploymentRecipe {
    /// Command that logs in to the registry from the session variables
    ///
    /// The password is piped on stdin and never appears in the command text.
    pub fn login_command() -> String {
        format!(
            "echo \"${}\" | docker login --username \"${}\" --password-stdin",
            REGISTRY_PASSWORD_VAR, REGISTRY_USERNAME_VAR
        )
    }

    /// True if the build for `config` includes the registry login
    pub fn logs_in(&self, config: &EnvironmentConfig) -> bool {
        self.registry_login && config.registry_credentials().is_some()
    }

    /// The build project deploying `config`
    pub fn project(&self, config: &EnvironmentConfig) -> BuildProject {
        let install = Phase::new(PhaseName::Install).commands(self.install_commands.clone());

        let mut pre_build = Phase::new(PhaseName::PreBuild);
        if let Some(dir) = &self.working_dir {
            pre_build = pre_build.command(format!("cd {}", quote(dir)));
        }
        let pre_build = pre_build.commands(self.setup_commands.clone());

        let mut build = Phase::new(PhaseName::Build);
        if self.logs_in(config) {
            build = build.command(Self::login_command());
        }
        let build = build.command(config.deploy_command.clone());

        let mut post_build = Phase::new(PhaseName::PostBuild);
        let mut exported_variables = Vec::new();
        if let Some(command) = &self.stack_identity_command {
            post_build = post_build
                .command(format!("export {}=$({})", STACK_IDENTITY_VAR, command))
                .command(format!(
                    "echo \"Exporting stack identity: ${}\"",
                    STACK_IDENTITY_VAR
                ));
            exported_variables.push(STACK_IDENTITY_VAR.to_string());
        }

        let phases = BuildPhaseSet::new()
            .with_phase(install.failure_policy(FailurePolicy::Abort))
            .with_phase(pre_build.failure_policy(FailurePolicy::Abort))
            .with_phase(build.failure_policy(FailurePolicy::Abort))
            .with_phase(post_build.failure_policy(FailurePolicy::Abort));

        BuildProject {
            name: format!("{}-{}", config.tag, self.project_name),
            environment: self.environment.clone(),
            variables: BTreeMap::from([(
                "KEEL_ENVIRONMENT".to_string(),
                config.environment.clone(),
            )]),
            phases,
            exported_variables,
        }
    }
}
