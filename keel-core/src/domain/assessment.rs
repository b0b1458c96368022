//! Assessment domain types
//!
//! The assessment process is an external, independently owned workflow. Keel
//! only starts it; it never waits for or reads the verdict.

use serde::{Deserialize, Serialize};

/// Where an identifier passed to the assessment process comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "value")]
pub enum Identifier {
    /// A value known when the pipeline is defined
    Fixed(String),
    /// A variable exported by the build session (e.g. `STACK_ARN`)
    FromBuild(String),
}

/// Payload handed to the assessment process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    /// Identifier of the state machine to start
    pub state_machine_id: String,
    /// Unique execution name (`<prefix>-<uuid>`)
    pub execution_name: String,
    /// Identity of the stack just deployed
    pub stack_identifier: String,
    /// Identity of the logical application
    pub application_identifier: String,
}

/// Acknowledgement that an assessment execution was accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentReceipt {
    pub execution_name: String,
    /// Execution handle reported by the process, if any
    pub execution_id: Option<String>,
    pub accepted_at: chrono::DateTime<chrono::Utc>,
}
