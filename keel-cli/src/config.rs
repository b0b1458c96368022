//! CLI configuration
//!
//! Flags and environment variables select the environment, the secret and
//! profile sources, and where builds run. An optional JSON settings file
//! carries the deployment recipe, the assessment action and the cluster.

use anyhow::{Context, Result, bail};
use keel_compute::{DryRunProvisioner, PodmanProvisioner, Provisioner};
use keel_config::{ConfigurationProvider, DotenvFileSource, ProcessEnvSource, ProfileCatalog, SecretSource};
use keel_core::domain::compute::ClusterSpec;
use keel_core::domain::environment::EnvironmentConfig;
use keel_core::domain::pipeline::{AssessAction, PipelineDefinition};
use keel_orchestrator::Orchestrator;
use keel_orchestrator::assess::HttpAssessmentInvoker;
use keel_orchestrator::build::{ExecutionBackend, LocalShellBackend, PodmanBackend};
use keel_orchestrator::definition::{DeploymentRecipe, PipelineBuilder};
use keel_orchestrator::fetch::GitFetcher;
use keel_orchestrator::orchestrator::{Components, WorkspaceSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where build commands run
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Executor {
    /// A shell on this host, sharing its files and tools (development only)
    Local,
    /// A privileged podman container from the build image
    Podman,
}

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    /// `.env.<environment>` directory; the process environment when unset
    pub secrets_dir: Option<PathBuf>,
    /// Profile catalog file; the built-in catalog when unset
    pub profiles: Option<PathBuf>,
    pub workspace: PathBuf,
    pub keep_workspaces: bool,
    /// Most runs the service remembers; the oldest finished ones go first
    pub retain_runs: usize,
    pub assessment_url: String,
    pub executor: Executor,
    pub settings: Settings,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.environment.trim().is_empty() {
            bail!("environment cannot be empty");
        }
        if self.workspace.as_os_str().is_empty() {
            bail!("workspace directory cannot be empty");
        }
        if self.retain_runs == 0 {
            bail!("retain-runs must be at least 1");
        }
        if !self.assessment_url.starts_with("http://") && !self.assessment_url.starts_with("https://")
        {
            bail!(
                "assessment URL must start with http:// or https:// (got '{}')",
                self.assessment_url
            );
        }
        if let Some(action) = &self.settings.assessment {
            if action.state_machine_id.trim().is_empty() {
                bail!("assessment state machine id cannot be empty");
            }
        }
        self.settings.cluster.validate()?;
        Ok(())
    }

    fn secret_source(&self) -> Box<dyn SecretSource> {
        match &self.secrets_dir {
            Some(dir) => Box::new(DotenvFileSource::new(dir)),
            None => Box::new(ProcessEnvSource),
        }
    }

    fn profile_catalog(&self) -> Result<ProfileCatalog> {
        match &self.profiles {
            Some(path) => ProfileCatalog::from_file(path)
                .with_context(|| format!("Failed to load profiles from {}", path.display())),
            None => Ok(ProfileCatalog::builtin()),
        }
    }

    /// Resolves the selected environment
    pub fn resolve_environment(&self) -> Result<EnvironmentConfig> {
        let provider = ConfigurationProvider::new(self.profile_catalog()?, self.secret_source());
        provider
            .resolve(&self.environment)
            .with_context(|| format!("Failed to resolve environment '{}'", self.environment))
    }

    /// The pipeline definition for a resolved environment
    pub fn definition(&self, env: &EnvironmentConfig) -> Result<PipelineDefinition> {
        let mut builder = PipelineBuilder::for_environment(env, &self.settings.recipe);
        if let Some(action) = &self.settings.assessment {
            builder = builder.assess(action.clone());
        }
        builder.finish().context("Invalid pipeline definition")
    }

    /// Fetcher, execution backend and assessment invoker
    pub async fn components(&self) -> Result<Components> {
        let backend: Arc<dyn ExecutionBackend> = match self.executor {
            Executor::Local => Arc::new(LocalShellBackend::new()),
            Executor::Podman => {
                let backend = PodmanBackend::new();
                backend.check_available().await?;
                Arc::new(backend)
            }
        };

        Ok(Components {
            fetcher: Arc::new(GitFetcher::github()),
            backend,
            invoker: Arc::new(HttpAssessmentInvoker::new(&self.assessment_url)),
        })
    }

    /// Resolves the environment and wires an orchestrator for it
    pub async fn orchestrator(&self) -> Result<Orchestrator> {
        let env = self.resolve_environment()?;
        let definition = self.definition(&env)?;
        let components = self.components().await?;

        let mut workspace = WorkspaceSettings::new(&self.workspace);
        workspace.keep = self.keep_workspaces;
        workspace.retain_runs = Some(self.retain_runs);

        Ok(Orchestrator::new(definition, env, components, workspace))
    }

    /// The provisioner for the cluster
    pub fn provisioner(&self, dry_run: bool) -> Box<dyn Provisioner> {
        if dry_run {
            Box::new(DryRunProvisioner::default())
        } else {
            Box::new(PodmanProvisioner::new(self.settings.cluster.host.clone()))
        }
    }
}

/// Contents of the settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recipe: DeploymentRecipe,
    /// Assess stage; the pipeline ends after Build when absent
    pub assessment: Option<AssessAction>,
    pub cluster: ClusterSettings,
}

impl Settings {
    /// Loads settings from a JSON file, or the defaults without one
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }
}

/// Cluster layout preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterPreset {
    /// One replica
    #[default]
    Standard,
    /// Two replicas spread across instances
    Spread,
}

/// The service the stack runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub name: String,
    pub image: String,
    pub preset: ClusterPreset,
    /// Host name published for the endpoint
    pub host: String,
    /// Replica count override
    pub replicas: Option<u32>,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            name: "resilience".to_string(),
            image: "docker.io/library/nginx:stable".to_string(),
            preset: ClusterPreset::Standard,
            host: "localhost".to_string(),
            replicas: None,
        }
    }
}

impl ClusterSettings {
    /// The cluster spec for these settings
    pub fn spec(&self) -> ClusterSpec {
        let mut spec = match self.preset {
            ClusterPreset::Standard => ClusterSpec::standard(&self.name, &self.image),
            ClusterPreset::Spread => ClusterSpec::spread(&self.name, &self.image),
        };
        if let Some(replicas) = self.replicas {
            spec.replicas = replicas;
        }
        spec
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("cluster host cannot be empty");
        }
        self.spec().validate().context("Invalid cluster settings")
    }
}
