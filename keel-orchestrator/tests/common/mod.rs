//! Shared fixtures for orchestrator integration tests
//!
//! Builds run in a real local shell. The source tree comes from a fake
//! fetcher, `docker` is a script that records the login, and the assessment
//! process is an in-memory recorder.

#![allow(dead_code)]

use async_trait::async_trait;
use keel_core::domain::assessment::{AssessmentReceipt, AssessmentRequest, Identifier};
use keel_core::domain::environment::{EnvironmentConfig, Secret};
use keel_core::domain::pipeline::{AssessAction, PipelineDefinition};
use keel_core::domain::run::Artifact;
use keel_core::error::{AssessmentInvocationError, SourceFetchError};
use keel_orchestrator::assess::AssessmentInvoker;
use keel_orchestrator::build::LocalShellBackend;
use keel_orchestrator::definition::{DeploymentRecipe, PipelineBuilder, STACK_IDENTITY_VAR};
use keel_orchestrator::fetch::{FetchRequest, SourceFetcher};
use keel_orchestrator::orchestrator::{Components, WorkspaceSettings};
use keel_orchestrator::Orchestrator;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

pub const PASSWORD: &str = "hunter2";

/// Writes a fake source tree: `REVISION`, `DELAY` and `infrastructure/`
///
/// Commits starting with `slow` deploy after a short sleep.
#[derive(Default)]
pub struct FakeFetcher {
    pub fail_auth: bool,
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Artifact, SourceFetchError> {
        let event = &request.event;
        if self.fail_auth {
            return Err(SourceFetchError::Authentication {
                owner: event.owner.clone(),
                repo: event.repo.clone(),
            });
        }

        let root = &request.destination;
        std::fs::create_dir_all(root.join("infrastructure")).unwrap();
        std::fs::write(root.join("infrastructure/package.json"), "{}").unwrap();
        std::fs::write(root.join("REVISION"), &event.commit_ref).unwrap();
        let delay = if event.commit_ref.starts_with("slow") { "0.4" } else { "0" };
        std::fs::write(root.join("DELAY"), delay).unwrap();

        Ok(Artifact {
            id: Uuid::new_v4(),
            run_id: request.run_id,
            owner: event.owner.clone(),
            repo: event.repo.clone(),
            branch: event.branch.clone(),
            revision: event.commit_ref.clone(),
            path: root.clone(),
            fetched_at: chrono::Utc::now(),
        })
    }
}

/// Records every request; optionally refuses them all
#[derive(Default)]
pub struct FakeInvoker {
    pub requests: Mutex<Vec<AssessmentRequest>>,
    pub missing_process: bool,
}

impl FakeInvoker {
    pub fn requests(&self) -> Vec<AssessmentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssessmentInvoker for FakeInvoker {
    async fn start(
        &self,
        request: &AssessmentRequest,
    ) -> Result<AssessmentReceipt, AssessmentInvocationError> {
        if self.missing_process {
            return Err(AssessmentInvocationError::ProcessNotFound(
                request.state_machine_id.clone(),
            ));
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(AssessmentReceipt {
            execution_name: request.execution_name.clone(),
            execution_id: Some(format!("exec-{}", self.requests.lock().unwrap().len())),
            accepted_at: chrono::Utc::now(),
        })
    }
}

/// Temporary layout: workspaces, a fake `docker` and the deploy target
pub struct Harness {
    pub dir: TempDir,
    pub fetcher: Arc<FakeFetcher>,
    pub invoker: Arc<FakeInvoker>,
    pub keep_workspaces: bool,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeFetcher::default(), FakeInvoker::default())
    }

    pub fn with(fetcher: FakeFetcher, invoker: FakeInvoker) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();

        let docker = bin.join("docker");
        std::fs::write(
            &docker,
            format!(
                "#!/bin/sh\nprintf '%s\\n' \"$*\" > '{0}/docker-args'\ncat > '{0}/docker-stdin'\necho 'Login Succeeded'\n",
                dir.path().display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&docker, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            dir,
            fetcher: Arc::new(fetcher),
            invoker: Arc::new(invoker),
            keep_workspaces: false,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn workspaces(&self) -> PathBuf {
        self.path().join("workspaces")
    }

    pub fn target(&self) -> PathBuf {
        self.path().join("target")
    }

    pub fn read(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.path().join(name)).ok()
    }

    /// Recipe deploying `REVISION` into the target directory
    pub fn recipe(&self) -> DeploymentRecipe {
        DeploymentRecipe {
            install_commands: vec![format!(
                "export PATH=\"{}:$PATH\"",
                self.path().join("bin").display()
            )],
            setup_commands: vec!["test -f package.json".to_string()],
            stack_identity_command: Some("cat stack-id".to_string()),
            ..Default::default()
        }
    }

    /// Deploy command that records the revision and writes the stack id
    pub fn deploy_command(&self) -> String {
        let target = self.target();
        format!(
            "sleep \"$(cat ../DELAY)\" && cp ../REVISION '{0}/current' && cat ../REVISION >> '{0}/history' && echo >> '{0}/history' && echo stack-A > stack-id",
            target.display()
        )
    }

    pub fn config(&self, password: Option<&str>) -> EnvironmentConfig {
        EnvironmentConfig {
            environment: "Production".to_string(),
            deploy_command: self.deploy_command(),
            repo_owner: "acme".to_string(),
            repo_name: "service".to_string(),
            branch: "main".to_string(),
            tag: "service-production-pipeline".to_string(),
            source_token: Secret::new("ghp_abc"),
            registry_username: Some("acme-bot".to_string()),
            registry_password: password.map(Secret::new),
        }
    }

    pub fn assess_action() -> AssessAction {
        AssessAction {
            state_machine_id: "AppAssessment".to_string(),
            execution_name_prefix: "codepipeline".to_string(),
            stack_identifier: Identifier::FromBuild(STACK_IDENTITY_VAR.to_string()),
            application_identifier: Identifier::Fixed("app-A".to_string()),
        }
    }

    /// Full [Fetch, Build, Assess] pipeline for `config`
    pub fn definition(&self, config: &EnvironmentConfig) -> PipelineDefinition {
        PipelineBuilder::for_environment(config, &self.recipe())
            .assess(Self::assess_action())
            .finish()
            .unwrap()
    }

    pub fn orchestrator(
        &self,
        definition: PipelineDefinition,
        config: EnvironmentConfig,
    ) -> Orchestrator {
        let components = Components {
            fetcher: self.fetcher.clone(),
            backend: Arc::new(LocalShellBackend::new()),
            invoker: self.invoker.clone(),
        };
        let mut workspace = WorkspaceSettings::new(self.workspaces());
        workspace.keep = self.keep_workspaces;
        Orchestrator::new(definition, config, components, workspace)
    }

    /// The standard production pipeline
    pub fn production(&self, password: Option<&str>) -> Orchestrator {
        let config = self.config(password);
        self.orchestrator(self.definition(&config), config)
    }
}
