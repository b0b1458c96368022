//! Pipeline domain types
//!
//! A pipeline definition is an ordered list of tagged stages, validated once
//! at construction: exactly one Fetch first, exactly one Build second, and at
//! most one Assess last.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::assessment::Identifier;
use crate::domain::build::BuildProject;
use crate::domain::trigger::SourceTrigger;
use crate::error::DefinitionError;

/// Kind of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Fetch,
    Build,
    Assess,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Fetch => write!(f, "Fetch"),
            StageKind::Build => write!(f, "Build"),
            StageKind::Assess => write!(f, "Assess"),
        }
    }
}

/// Fetch source on webhook trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAction {
    pub trigger: SourceTrigger,
}

/// Run a build project against the fetched artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAction {
    pub project: BuildProject,
}

/// Start an external assessment process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessAction {
    /// Identifier of the state machine to start
    pub state_machine_id: String,
    pub execution_name_prefix: String,
    pub stack_identifier: Identifier,
    pub application_identifier: Identifier,
}

/// What a stage does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StageAction {
    Fetch(FetchAction),
    Build(BuildAction),
    Assess(AssessAction),
}

impl StageAction {
    pub fn kind(&self) -> StageKind {
        match self {
            StageAction::Fetch(_) => StageKind::Fetch,
            StageAction::Build(_) => StageKind::Build,
            StageAction::Assess(_) => StageKind::Assess,
        }
    }
}

/// A named stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub action: StageAction,
}

impl Stage {
    pub fn new(name: impl Into<String>, action: StageAction) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.action.kind()
    }
}

/// A validated pipeline definition
///
/// Only constructible through `PipelineDefinition::new`, which enforces the
/// stage shape, so every value of this type is runnable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineDefinition {
    name: String,
    stages: Vec<Stage>,
    tags: BTreeMap<String, String>,
}

impl PipelineDefinition {
    /// Validates a stage list and creates the definition
    pub fn new(
        name: impl Into<String>,
        stages: Vec<Stage>,
        tags: BTreeMap<String, String>,
    ) -> Result<Self, DefinitionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DefinitionError::EmptyName);
        }

        validate_stage_order(&stages)?;

        let mut seen = std::collections::HashSet::new();
        for stage in &stages {
            if stage.name.trim().is_empty() {
                return Err(DefinitionError::EmptyStageName(stage.kind()));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(DefinitionError::DuplicateStageName(stage.name.clone()));
            }
        }

        Ok(Self { name, stages, tags })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Stage kinds in execution order
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    /// The source trigger of the Fetch stage
    pub fn trigger(&self) -> &SourceTrigger {
        match &self.stages[0].action {
            StageAction::Fetch(fetch) => &fetch.trigger,
            _ => unreachable!("validated definitions start with a Fetch stage"),
        }
    }
}

impl<'de> Deserialize<'de> for PipelineDefinition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            name: String,
            stages: Vec<Stage>,
            #[serde(default)]
            tags: BTreeMap<String, String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        PipelineDefinition::new(raw.name, raw.stages, raw.tags).map_err(serde::de::Error::custom)
    }
}

/// Checks the [Fetch, Build, (Assess)?] shape
fn validate_stage_order(stages: &[Stage]) -> Result<(), DefinitionError> {
    let kinds: Vec<StageKind> = stages.iter().map(Stage::kind).collect();

    match kinds.as_slice() {
        [StageKind::Fetch, StageKind::Build] => Ok(()),
        [StageKind::Fetch, StageKind::Build, StageKind::Assess] => Ok(()),
        [] => Err(DefinitionError::MissingStage(StageKind::Fetch)),
        [first, ..] if *first != StageKind::Fetch => Err(DefinitionError::OutOfOrder {
            position: 0,
            expected: StageKind::Fetch,
            found: *first,
        }),
        [_] => Err(DefinitionError::MissingStage(StageKind::Build)),
        [_, second, ..] if *second != StageKind::Build => Err(DefinitionError::OutOfOrder {
            position: 1,
            expected: StageKind::Build,
            found: *second,
        }),
        [_, _, third] => Err(DefinitionError::OutOfOrder {
            position: 2,
            expected: StageKind::Assess,
            found: *third,
        }),
        _ => Err(DefinitionError::TooManyStages(kinds.len())),
    }
}
