//! Assessment invocation
//!
//! Starts one execution of the external assessment process with the stack
//! and application identities. The invocation completes as soon as the
//! process accepts the execution; its verdict is never read.

use async_trait::async_trait;
use keel_core::domain::assessment::{AssessmentReceipt, AssessmentRequest, Identifier};
use keel_core::domain::pipeline::AssessAction;
use keel_core::error::AssessmentInvocationError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Longest execution name the assessment process accepts
pub const MAX_EXECUTION_NAME_LEN: usize = 80;

/// Starts assessment executions
#[async_trait]
pub trait AssessmentInvoker: Send + Sync {
    async fn start(
        &self,
        request: &AssessmentRequest,
    ) -> Result<AssessmentReceipt, AssessmentInvocationError>;
}

/// Builds the request for an Assess stage
///
/// Identifiers sourced from the build are read from `exported`; a missing
/// or empty value makes the request malformed.
pub fn prepare_request(
    action: &AssessAction,
    exported: &BTreeMap<String, String>,
) -> Result<AssessmentRequest, AssessmentInvocationError> {
    if action.state_machine_id.trim().is_empty() {
        return Err(AssessmentInvocationError::MalformedRequest(
            "state machine id is empty".to_string(),
        ));
    }

    Ok(AssessmentRequest {
        state_machine_id: action.state_machine_id.clone(),
        execution_name: execution_name(&action.execution_name_prefix)?,
        stack_identifier: resolve(&action.stack_identifier, exported, "stack identifier")?,
        application_identifier: resolve(
            &action.application_identifier,
            exported,
            "application identifier",
        )?,
    })
}

/// `<prefix>-<uuid>`, unique per invocation
pub fn execution_name(prefix: &str) -> Result<String, AssessmentInvocationError> {
    let valid = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(AssessmentInvocationError::MalformedRequest(format!(
            "invalid execution name prefix '{}'",
            prefix
        )));
    }

    let name = format!("{}-{}", prefix, Uuid::new_v4());
    if name.len() > MAX_EXECUTION_NAME_LEN {
        return Err(AssessmentInvocationError::MalformedRequest(format!(
            "execution name prefix '{}' is too long",
            prefix
        )));
    }
    Ok(name)
}

fn resolve(
    identifier: &Identifier,
    exported: &BTreeMap<String, String>,
    what: &str,
) -> Result<String, AssessmentInvocationError> {
    let value = match identifier {
        Identifier::Fixed(value) => Some(value.as_str()),
        Identifier::FromBuild(name) => exported.get(name).map(String::as_str),
    };

    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(AssessmentInvocationError::MalformedRequest(match identifier {
            Identifier::Fixed(_) => format!("{} is empty", what),
            Identifier::FromBuild(name) => {
                format!("{} comes from {}, which the build did not export", what, name)
            }
        })),
    }
}

// =============================================================================
// HTTP invoker
// =============================================================================

/// Body of `POST /executions`
#[derive(Debug, Serialize, Deserialize)]
pub struct StartExecution {
    pub state_machine_id: String,
    pub name: String,
    pub input: ExecutionInput,
}

/// Input document handed to the state machine
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionInput {
    #[serde(rename = "StackArn")]
    pub stack_arn: String,
    #[serde(rename = "AppArn")]
    pub app_arn: String,
}

#[derive(Debug, Deserialize)]
struct StartedExecution {
    #[serde(default)]
    execution_id: Option<String>,
}

/// Starts executions through the assessment service's HTTP API
#[derive(Debug, Clone)]
pub struct HttpAssessmentInvoker {
    client: Client,
    base_url: String,
}

impl HttpAssessmentInvoker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AssessmentInvoker for HttpAssessmentInvoker {
    async fn start(
        &self,
        request: &AssessmentRequest,
    ) -> Result<AssessmentReceipt, AssessmentInvocationError> {
        let url = format!("{}/executions", self.base_url);
        let body = StartExecution {
            state_machine_id: request.state_machine_id.clone(),
            name: request.execution_name.clone(),
            input: ExecutionInput {
                stack_arn: request.stack_identifier.clone(),
                app_arn: request.application_identifier.clone(),
            },
        };

        debug!("Starting assessment execution {} at {}", body.name, url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssessmentInvocationError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if !status.is_success() {
            return Err(match status.as_u16() {
                404 => AssessmentInvocationError::ProcessNotFound(request.state_machine_id.clone()),
                400 | 422 => AssessmentInvocationError::MalformedRequest(text),
                code => AssessmentInvocationError::Rejected {
                    status: code,
                    message: text,
                },
            });
        }

        let execution_id = serde_json::from_str::<StartedExecution>(&text)
            .ok()
            .and_then(|started| started.execution_id);

        info!(
            "Assessment execution {} accepted by {}",
            request.execution_name, request.state_machine_id
        );

        Ok(AssessmentReceipt {
            execution_name: request.execution_name.clone(),
            execution_id,
            accepted_at: chrono::Utc::now(),
        })
    }
}
