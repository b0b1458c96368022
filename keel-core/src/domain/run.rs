//! Pipeline run domain types
//!
//! A run is created for every trigger that matches a pipeline. Its stage list
//! is copied from the definition at creation time and never changes; only the
//! status fields move forward.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::pipeline::{PipelineDefinition, StageKind};
use crate::domain::trigger::TriggerEvent;

/// The fetched source snapshot shared by the stages of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub run_id: Uuid,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Commit actually checked out
    pub revision: String,
    /// Directory holding the source tree
    pub path: PathBuf,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

/// Run status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum RunStatus {
    Pending,
    Running { stage: StageKind },
    Succeeded,
    Failed { stage: StageKind, cause: String },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed { .. })
    }
}

/// Stage execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never reached because an earlier stage failed
    Skipped,
}

/// Execution record for one stage of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub kind: StageKind,
    pub status: StageStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Short outcome note (e.g. suppressed failures, execution name)
    pub detail: Option<String>,
}

/// A pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub pipeline: String,
    pub trigger: TriggerEvent,
    pub status: RunStatus,
    pub stages: Vec<StageRecord>,
    pub artifact: Option<Artifact>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PipelineRun {
    /// Creates a pending run with one record per defined stage
    pub fn new(definition: &PipelineDefinition, trigger: TriggerEvent) -> Self {
        let stages = definition
            .stages()
            .iter()
            .map(|stage| StageRecord {
                name: stage.name.clone(),
                kind: stage.kind(),
                status: StageStatus::Pending,
                started_at: None,
                completed_at: None,
                detail: None,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            pipeline: definition.name().to_string(),
            trigger,
            status: RunStatus::Pending,
            stages,
            artifact: None,
            created_at: chrono::Utc::now(),
            completed_at: None,
        }
    }

    /// Marks the stage at `idx` as running
    pub fn start_stage(&mut self, idx: usize) {
        let now = chrono::Utc::now();
        if let Some(record) = self.stages.get_mut(idx) {
            record.status = StageStatus::Running;
            record.started_at = Some(now);
            self.status = RunStatus::Running { stage: record.kind };
        }
    }

    /// Marks the stage at `idx` as succeeded
    pub fn complete_stage(&mut self, idx: usize, detail: Option<String>) {
        if let Some(record) = self.stages.get_mut(idx) {
            record.status = StageStatus::Succeeded;
            record.completed_at = Some(chrono::Utc::now());
            record.detail = detail;
        }
    }

    /// Fails the stage at `idx`, skips every later stage and ends the run
    pub fn fail_stage(&mut self, idx: usize, cause: String) {
        let now = chrono::Utc::now();
        let mut failed_kind = None;

        for (i, record) in self.stages.iter_mut().enumerate() {
            if i == idx {
                record.status = StageStatus::Failed;
                record.completed_at = Some(now);
                record.detail = Some(cause.clone());
                failed_kind = Some(record.kind);
            } else if i > idx {
                record.status = StageStatus::Skipped;
            }
        }

        if let Some(stage) = failed_kind {
            self.status = RunStatus::Failed { stage, cause };
            self.completed_at = Some(now);
        }
    }

    /// Ends the run successfully
    pub fn succeed(&mut self) {
        self.status = RunStatus::Succeeded;
        self.completed_at = Some(chrono::Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::build::{BuildPhaseSet, BuildProject};
    use crate::domain::pipeline::{BuildAction, FetchAction, Stage, StageAction};
    use crate::domain::trigger::SourceTrigger;
    use std::collections::BTreeMap;

    fn definition() -> PipelineDefinition {
        let trigger = SourceTrigger::new("acme", "service", "main");
        PipelineDefinition::new(
            "service",
            vec![
                Stage::new("Source", StageAction::Fetch(FetchAction { trigger })),
                Stage::new(
                    "Build",
                    StageAction::Build(BuildAction {
                        project: BuildProject {
                            name: "deploy".to_string(),
                            environment: Default::default(),
                            variables: BTreeMap::new(),
                            phases: BuildPhaseSet::new(),
                            exported_variables: vec![],
                        },
                    }),
                ),
            ],
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_run_mirrors_definition() {
        let def = definition();
        let run = PipelineRun::new(&def, def.trigger().event("abc"));
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.stages.len(), 2);
        assert!(run.stages.iter().all(|s| s.status == StageStatus::Pending));
        assert!(run.artifact.is_none());
    }

    #[test]
    fn test_fail_stage_skips_rest() {
        let def = definition();
        let mut run = PipelineRun::new(&def, def.trigger().event("abc"));

        run.start_stage(0);
        assert_eq!(
            run.status,
            RunStatus::Running {
                stage: StageKind::Fetch
            }
        );
        run.fail_stage(0, "branch not found".to_string());

        assert_eq!(run.stages[0].status, StageStatus::Failed);
        assert_eq!(run.stages[1].status, StageStatus::Skipped);
        assert!(run.status.is_terminal());
        assert!(matches!(
            run.status,
            RunStatus::Failed {
                stage: StageKind::Fetch,
                ..
            }
        ));
    }

    #[test]
    fn test_success_path() {
        let def = definition();
        let mut run = PipelineRun::new(&def, def.trigger().event("abc"));
        for idx in 0..run.stages.len() {
            run.start_stage(idx);
            run.complete_stage(idx, None);
        }
        run.succeed();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert!(run.completed_at.is_some());
    }
}
