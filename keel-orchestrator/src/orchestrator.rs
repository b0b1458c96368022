//! Pipeline orchestrator
//!
//! Drives runs through the stages of one pipeline definition:
//! - Fetch: check the event against the trigger, then retrieve the tree
//! - Build: open an execution context on the tree and run the phases
//! - Assess: start the assessment process with the build's identities
//!
//! A stage starts only after the previous one succeeded. The first failure
//! ends the run and marks every later stage skipped; nothing is retried.
//!
//! Each trigger gets its own run, workspace directory and execution context,
//! so runs may overlap freely. Deployments they make to a shared target
//! land in completion order.

use keel_core::domain::assessment::AssessmentReceipt;
use keel_core::domain::environment::{EnvironmentConfig, Secret};
use keel_core::domain::pipeline::{
    AssessAction, BuildAction, FetchAction, PipelineDefinition, StageAction,
};
use keel_core::domain::run::{Artifact, PipelineRun};
use keel_core::domain::trigger::TriggerEvent;
use keel_core::error::{AssessmentInvocationError, BuildError, RunError, SourceFetchError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::assess::{self, AssessmentInvoker};
use crate::build::{BuildReport, BuildRunner, ContextRequest, ExecutionBackend};
use crate::definition::{REGISTRY_PASSWORD_VAR, REGISTRY_USERNAME_VAR};
use crate::fetch::{FetchRequest, SourceFetcher};
use crate::run_log::RunLog;
use crate::store::RunStore;

/// The pluggable parts of the orchestrator
#[derive(Clone)]
pub struct Components {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub backend: Arc<dyn ExecutionBackend>,
    pub invoker: Arc<dyn AssessmentInvoker>,
}

/// Where runs keep their files
#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    /// Each run works in `<root>/<run id>`
    pub root: PathBuf,
    /// Keep run directories after the run ends
    pub keep: bool,
    /// Most runs kept in the store; `None` keeps all of them
    pub retain_runs: Option<usize>,
}

impl WorkspaceSettings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            keep: false,
            retain_runs: None,
        }
    }
}

struct Inner {
    definition: PipelineDefinition,
    config: EnvironmentConfig,
    components: Components,
    workspace: WorkspaceSettings,
    store: Arc<RunStore>,
}

/// Runs one pipeline definition; cheap to clone
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

/// A run executing in the background
pub struct RunHandle {
    pub run_id: Uuid,
    task: JoinHandle<PipelineRun>,
}

impl RunHandle {
    /// Waits for the run to end
    pub async fn finished(self) -> Option<PipelineRun> {
        match self.task.await {
            Ok(run) => Some(run),
            Err(e) => {
                error!("Run {} task failed: {}", self.run_id, e);
                None
            }
        }
    }
}

impl Orchestrator {
    pub fn new(
        definition: PipelineDefinition,
        config: EnvironmentConfig,
        components: Components,
        workspace: WorkspaceSettings,
    ) -> Self {
        let store = match workspace.retain_runs {
            Some(capacity) => RunStore::with_capacity(capacity),
            None => RunStore::new(),
        };

        Self {
            inner: Arc::new(Inner {
                definition,
                config,
                components,
                workspace,
                store: Arc::new(store),
            }),
        }
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.inner.definition
    }

    pub fn store(&self) -> &RunStore {
        &self.inner.store
    }

    /// Whether `event` activates this pipeline
    pub fn accepts(&self, event: &TriggerEvent) -> bool {
        self.inner.definition.trigger().matches(event)
    }

    /// Starts a run for `event` in the background
    ///
    /// Returns `None` without creating a run if the event does not match the
    /// pipeline's trigger.
    pub async fn submit(&self, event: TriggerEvent) -> Option<RunHandle> {
        let (run, log) = self.prepare(event).await?;
        let run_id = run.id;
        let span = info_span!("run", %run_id);

        let this = self.clone();
        let task = tokio::spawn(async move { this.execute(run, log).await }.instrument(span));

        Some(RunHandle { run_id, task })
    }

    /// Runs `event` to completion on the current task
    pub async fn run(&self, event: TriggerEvent) -> Option<PipelineRun> {
        let (run, log) = self.prepare(event).await?;
        let span = info_span!("run", run_id = %run.id);
        Some(self.execute(run, log).instrument(span).await)
    }

    async fn prepare(&self, event: TriggerEvent) -> Option<(PipelineRun, RunLog)> {
        if !self.accepts(&event) {
            info!(
                "Ignoring event for {}/{}@{}: pipeline {} listens to {}/{}@{}",
                event.owner,
                event.repo,
                event.branch,
                self.inner.definition.name(),
                self.inner.definition.trigger().owner,
                self.inner.definition.trigger().repo,
                self.inner.definition.trigger().branch
            );
            return None;
        }

        let run = PipelineRun::new(&self.inner.definition, event);
        let log = RunLog::new(run.id);
        log.info(format!(
            "Run {} of {} triggered by {}/{}@{} ({})",
            run.id,
            run.pipeline,
            run.trigger.owner,
            run.trigger.repo,
            run.trigger.branch,
            run.trigger.commit_ref
        ));
        self.inner.store.insert(&run, log.clone()).await;
        info!("Created run {} for pipeline {}", run.id, run.pipeline);

        Some((run, log))
    }

    async fn execute(&self, mut run: PipelineRun, log: RunLog) -> PipelineRun {
        let store = &self.inner.store;
        let run_dir = self.inner.workspace.root.join(run.id.to_string());

        let mut artifact: Option<Artifact> = None;
        let mut exported = BTreeMap::new();

        for (idx, stage) in self.inner.definition.stages().iter().enumerate() {
            run.start_stage(idx);
            store.update(&run).await;
            log.info(format!("Stage {} ({}) started", stage.name, stage.kind()));
            info!("Stage {} started", stage.name);

            let result: Result<Option<String>, RunError> = match &stage.action {
                StageAction::Fetch(action) => {
                    match self.fetch(&run, action, &run_dir).await {
                        Ok(fetched) => {
                            let detail = format!("revision {}", fetched.revision);
                            run.artifact = Some(fetched.clone());
                            artifact = Some(fetched);
                            Ok(Some(detail))
                        }
                        Err(e) => Err(e.into()),
                    }
                }
                StageAction::Build(action) => match &artifact {
                    Some(source) => match self.build(run.id, source, action, &log).await {
                        Ok(report) => {
                            let detail = report.summary();
                            exported = report.exported;
                            Ok(Some(detail))
                        }
                        Err(e) => Err(e.into()),
                    },
                    None => Err(BuildError::Environment("no fetched artifact".to_string()).into()),
                },
                StageAction::Assess(action) => match self.assess(action, &exported).await {
                    Ok(receipt) => Ok(Some(format!(
                        "execution {} accepted",
                        receipt.execution_name
                    ))),
                    Err(e) => Err(e.into()),
                },
            };

            match result {
                Ok(detail) => {
                    if let Some(detail) = &detail {
                        log.info(format!("Stage {} succeeded: {}", stage.name, detail));
                    }
                    run.complete_stage(idx, detail);
                    store.update(&run).await;
                }
                Err(e) => {
                    error!("Stage {} failed: {}", stage.name, e);
                    log.error(format!("Stage {} failed: {}", stage.name, e));
                    run.fail_stage(idx, e.to_string());
                    store.update(&run).await;
                    self.cleanup(&run_dir).await;
                    return run;
                }
            }
        }

        run.succeed();
        store.update(&run).await;
        log.info(format!("Run {} succeeded", run.id));
        info!("Run {} succeeded", run.id);
        self.cleanup(&run_dir).await;
        run
    }

    async fn fetch(
        &self,
        run: &PipelineRun,
        action: &FetchAction,
        run_dir: &Path,
    ) -> Result<Artifact, SourceFetchError> {
        let event = &run.trigger;
        if !action.trigger.matches(event) {
            return Err(SourceFetchError::TriggerMismatch {
                owner: event.owner.clone(),
                repo: event.repo.clone(),
                branch: event.branch.clone(),
            });
        }

        self.inner
            .components
            .fetcher
            .fetch(FetchRequest {
                run_id: run.id,
                event: event.clone(),
                token: self.inner.config.source_token.clone(),
                destination: run_dir.join("source"),
            })
            .await
    }

    async fn build(
        &self,
        run_id: Uuid,
        source: &Artifact,
        action: &BuildAction,
        log: &RunLog,
    ) -> Result<BuildReport, BuildError> {
        let request = ContextRequest {
            run_id,
            workspace: source.path.clone(),
            environment: action.project.environment.clone(),
        };

        let mut context = self.inner.components.backend.open(&request).await?;

        let mut runner = BuildRunner::new();
        if let Some(credentials) = self.inner.config.registry_credentials() {
            runner = runner
                .with_secret(REGISTRY_USERNAME_VAR, Secret::new(credentials.username))
                .with_secret(REGISTRY_PASSWORD_VAR, credentials.password);
        }

        let result = runner.run(context.as_mut(), &action.project, log).await;
        context.close().await;
        result
    }

    async fn assess(
        &self,
        action: &AssessAction,
        exported: &BTreeMap<String, String>,
    ) -> Result<AssessmentReceipt, AssessmentInvocationError> {
        let request = assess::prepare_request(action, exported)?;
        info!(
            "Starting assessment {} for stack {}",
            request.execution_name, request.stack_identifier
        );
        self.inner.components.invoker.start(&request).await
    }

    async fn cleanup(&self, run_dir: &Path) {
        if self.inner.workspace.keep {
            debug!("Keeping workspace {}", run_dir.display());
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(run_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove workspace {}: {}", run_dir.display(), e);
            }
        }
    }
}
