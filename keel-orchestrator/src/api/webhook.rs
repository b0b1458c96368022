//! Webhook API Handlers
//!
//! Inbound source-control events. An event that matches a subscription
//! starts a run and is answered with `202 Accepted`; anything else is
//! acknowledged with `200 OK` and the reason it was ignored.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use keel_core::domain::trigger::TriggerEvent;
use keel_core::dto::run::RunAccepted;
use keel_core::dto::webhook::{PushEvent, WebhookIgnored};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::trigger::Subscription;

const EVENT_HEADER: &str = "x-github-event";

/// POST /webhook
/// Receive a GitHub webhook delivery
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let kind = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("push");

    tracing::debug!("Received {} webhook ({} bytes)", kind, body.len());

    match kind {
        "ping" => Ok(ignored("ping")),
        "push" => {
            let push: PushEvent = serde_json::from_slice(&body)
                .map_err(|e| ApiError::BadRequest(format!("Invalid push payload: {}", e)))?;

            match push.into_trigger() {
                Some(event) => dispatch(&state, event).await,
                None => Ok(ignored("not a branch push")),
            }
        }
        other => Ok(ignored(&format!("event '{}' is not handled", other))),
    }
}

/// POST /trigger
/// Start a run from a bare trigger event
pub async fn trigger_run(
    State(state): State<AppState>,
    Json(event): Json<TriggerEvent>,
) -> ApiResult<Response> {
    if event.commit_ref.trim().is_empty() {
        return Err(ApiError::BadRequest("commit_ref cannot be empty".to_string()));
    }
    dispatch(&state, event).await
}

/// GET /subscriptions
pub async fn list_subscriptions(State(state): State<AppState>) -> Json<Vec<Subscription>> {
    Json(state.registry.list())
}

async fn dispatch(state: &AppState, event: TriggerEvent) -> ApiResult<Response> {
    if state.registry.matching(&event).is_empty() {
        tracing::info!(
            "No pipeline subscribed to {}/{}@{}",
            event.owner,
            event.repo,
            event.branch
        );
        return Ok(ignored(&format!(
            "no pipeline subscribed to {}/{}@{}",
            event.owner, event.repo, event.branch
        )));
    }

    let handle = state.orchestrator.submit(event).await.ok_or_else(|| {
        ApiError::InternalError("subscribed event was rejected by the pipeline".to_string())
    })?;

    tracing::info!("Accepted run {}", handle.run_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            run_id: handle.run_id,
        }),
    )
        .into_response())
}

fn ignored(reason: &str) -> Response {
    (
        StatusCode::OK,
        Json(WebhookIgnored {
            ignored: reason.to_string(),
        }),
    )
        .into_response()
}
