//! Build domain types
//!
//! A build project runs a fixed set of four phases, in order, inside a single
//! execution environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of a build phase, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Install,
    PreBuild,
    Build,
    PostBuild,
}

impl PhaseName {
    /// All phases in execution order
    pub const ALL: [PhaseName; 4] = [
        PhaseName::Install,
        PhaseName::PreBuild,
        PhaseName::Build,
        PhaseName::PostBuild,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::Install => "install",
            PhaseName::PreBuild => "pre_build",
            PhaseName::Build => "build",
            PhaseName::PostBuild => "post_build",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens when a command in a phase exits non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FailurePolicy {
    /// Stop the whole build immediately
    #[default]
    Abort,
    /// Record the failure and keep going
    Continue,
}

/// A named build phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: PhaseName,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Phase {
    /// Creates an empty phase with the ABORT policy
    pub fn new(name: PhaseName) -> Self {
        Self {
            name,
            commands: Vec::new(),
            failure_policy: FailurePolicy::Abort,
        }
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    pub fn commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// The four build phases
///
/// Always holds exactly one phase per `PhaseName`, stored in execution order.
/// Phases can be replaced but never reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Phase>", into = "Vec<Phase>")]
pub struct BuildPhaseSet {
    phases: [Phase; 4],
}

impl BuildPhaseSet {
    /// Creates a phase set with four empty ABORT phases
    pub fn new() -> Self {
        Self {
            phases: PhaseName::ALL.map(Phase::new),
        }
    }

    /// Replaces the phase with the same name
    pub fn with_phase(mut self, phase: Phase) -> Self {
        let idx = phase.name.index();
        self.phases[idx] = phase;
        self
    }

    pub fn phase(&self, name: PhaseName) -> &Phase {
        &self.phases[name.index()]
    }

    /// Iterates phases in execution order
    pub fn iter(&self) -> impl Iterator<Item = &Phase> {
        self.phases.iter()
    }

    pub fn command_count(&self) -> usize {
        self.phases.iter().map(|p| p.commands.len()).sum()
    }
}

impl Default for BuildPhaseSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<Phase>> for BuildPhaseSet {
    type Error = String;

    /// Accepts any subset of phases in execution order, each at most once
    fn try_from(phases: Vec<Phase>) -> Result<Self, Self::Error> {
        let mut set = BuildPhaseSet::new();
        let mut last: Option<PhaseName> = None;

        for phase in phases {
            if let Some(prev) = last {
                if phase.name <= prev {
                    return Err(format!(
                        "phase '{}' is out of order or duplicated (after '{}')",
                        phase.name, prev
                    ));
                }
            }
            last = Some(phase.name);
            set = set.with_phase(phase);
        }

        Ok(set)
    }
}

impl From<BuildPhaseSet> for Vec<Phase> {
    fn from(set: BuildPhaseSet) -> Self {
        set.phases.into_iter().collect()
    }
}

/// Size class of the build execution environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeType {
    Small,
    #[default]
    Medium,
    Large,
}

impl ComputeType {
    /// CPU and memory (MiB) limits applied to the execution environment
    pub fn limits(&self) -> (u32, u32) {
        match self {
            ComputeType::Small => (2, 3072),
            ComputeType::Medium => (4, 7168),
            ComputeType::Large => (8, 15360),
        }
    }
}

/// Execution environment the build runs in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEnvironment {
    /// Container image for the execution environment
    pub image: String,
    /// Whether the environment may run a container engine (needed for image builds)
    pub privileged: bool,
    pub compute_type: ComputeType,
}

impl Default for BuildEnvironment {
    fn default() -> Self {
        Self {
            image: "public.ecr.aws/codebuild/amazonlinux2-x86_64-standard:4.0".to_string(),
            privileged: true,
            compute_type: ComputeType::Medium,
        }
    }
}

/// A build project: environment, variables and phases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProject {
    pub name: String,
    #[serde(default)]
    pub environment: BuildEnvironment,
    /// Variables set in the session before any phase runs
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub phases: BuildPhaseSet,
    /// Session variables read back after the last phase
    #[serde(default)]
    pub exported_variables: Vec<String>,
}
