//! Error taxonomy shared by every Keel component
//!
//! Each stage has its own error type. `RunError` wraps them and reports the
//! stage that failed. None of these errors is retried.

use thiserror::Error;

use crate::domain::build::PhaseName;
use crate::domain::pipeline::StageKind;

/// Missing or invalid environment configuration
///
/// Raised before any stage runs.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("unknown environment '{0}'")]
    UnknownEnvironment(String),

    #[error("required secret '{key}' is missing for environment '{environment}'")]
    MissingSecret { environment: String, key: String },

    #[error("required field '{field}' is empty for environment '{environment}'")]
    EmptyField { environment: String, field: String },

    #[error("failed to read secret source: {0}")]
    Source(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Invalid pipeline stage list
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("pipeline name cannot be empty")]
    EmptyName,

    #[error("pipeline is missing its {0} stage")]
    MissingStage(StageKind),

    #[error("stage at position {position} must be {expected}, found {found}")]
    OutOfOrder {
        position: usize,
        expected: StageKind,
        found: StageKind,
    },

    #[error("pipeline has {0} stages, at most 3 are allowed")]
    TooManyStages(usize),

    #[error("{0} stage has an empty name")]
    EmptyStageName(StageKind),

    #[error("stage name '{0}' is used twice")]
    DuplicateStageName(String),
}

/// Failure to retrieve the source tree
#[derive(Debug, Error)]
pub enum SourceFetchError {
    #[error("event for {owner}/{repo}@{branch} does not match the pipeline trigger")]
    TriggerMismatch {
        owner: String,
        repo: String,
        branch: String,
    },

    #[error("authentication failed for {owner}/{repo}")]
    Authentication { owner: String, repo: String },

    #[error("branch '{branch}' not found in {owner}/{repo}")]
    BranchNotFound {
        owner: String,
        repo: String,
        branch: String,
    },

    #[error("revision '{0}' not found")]
    RevisionNotFound(String),

    #[error("source fetch failed: {0}")]
    Other(String),
}

/// A command in an ABORT phase exited non-zero
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("phase '{phase}' failed: command `{command}` exited with code {exit_code}")]
pub struct BuildPhaseError {
    pub phase: PhaseName,
    pub command: String,
    pub exit_code: i32,
}

/// Build stage failure
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Phase(#[from] BuildPhaseError),

    /// The execution environment could not be started or died
    #[error("execution environment error: {0}")]
    Environment(String),
}

/// The assessment process did not accept the invocation
#[derive(Debug, Error)]
pub enum AssessmentInvocationError {
    #[error("assessment process '{0}' not found")]
    ProcessNotFound(String),

    #[error("malformed assessment request: {0}")]
    MalformedRequest(String),

    #[error("assessment invocation rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("assessment invocation failed: {0}")]
    Transport(String),
}

/// Fatal error while materializing the compute layer
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("invalid cluster spec: {0}")]
    InvalidSpec(String),

    #[error("provisioning backend failed: {0}")]
    Backend(String),
}

/// Why a pipeline run failed
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    SourceFetch(#[from] SourceFetchError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Assessment(#[from] AssessmentInvocationError),
}

impl RunError {
    /// Stage the error belongs to
    pub fn stage(&self) -> StageKind {
        match self {
            RunError::SourceFetch(_) => StageKind::Fetch,
            RunError::Build(_) => StageKind::Build,
            RunError::Assessment(_) => StageKind::Assess,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_phase_error_message() {
        let err = BuildPhaseError {
            phase: PhaseName::Build,
            command: "npm run deploy".to_string(),
            exit_code: 2,
        };
        assert_eq!(
            err.to_string(),
            "phase 'build' failed: command `npm run deploy` exited with code 2"
        );
    }

    #[test]
    fn test_run_error_stage() {
        let err: RunError = SourceFetchError::Other("boom".to_string()).into();
        assert_eq!(err.stage(), StageKind::Fetch);

        let err: RunError = BuildError::Environment("gone".to_string()).into();
        assert_eq!(err.stage(), StageKind::Build);

        let err: RunError = AssessmentInvocationError::ProcessNotFound("x".to_string()).into();
        assert_eq!(err.stage(), StageKind::Assess);
    }
}
