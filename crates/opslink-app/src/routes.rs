//! Intake endpoints for the chat and tracker platforms.
//!
//! Every endpoint answers 200 even when the payload is unusable. Both
//! platforms retry deliveries on failure statuses, and a malformed payload
//! will not become well-formed on the second attempt; logging is the only
//! useful reaction.

use std::sync::Arc;

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use opslink_core::TriggerEvent;
use opslink_jira::parse_webhook;
use opslink_slack::{parse_event, parse_interaction, SlackEvent};

use crate::server::AppState;

type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/slack/interactions", post(slack_interactions))
        .route("/slack/events", post(slack_events))
        .route("/jira/webhook", post(jira_webhook))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

// Slack delivers interactivity as a form whose `payload` field holds the
// JSON document.
#[derive(Deserialize)]
struct InteractionForm {
    payload: String,
}

async fn slack_interactions(
    State(state): State<SharedState>,
    form: Result<Form<InteractionForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            warn!(error = %rejection, "undecodable interaction form");
            return StatusCode::OK.into_response();
        }
    };
    let payload: Value = match serde_json::from_str(&form.payload) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(error = %error, "interaction payload is not JSON");
            return StatusCode::OK.into_response();
        }
    };
    let Some(trigger) = parse_interaction(&payload) else {
        return StatusCode::OK.into_response();
    };
    let outcome = state.orchestrator.handle_trigger(trigger);
    match outcome.response {
        Some(response) => Json(response).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

async fn slack_events(
    State(state): State<SharedState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "undecodable event payload");
            return StatusCode::OK.into_response();
        }
    };
    match parse_event(&payload) {
        SlackEvent::Challenge(challenge) => Json(json!({ "challenge": challenge })).into_response(),
        SlackEvent::Trigger(trigger) => {
            state.orchestrator.handle_trigger(trigger);
            StatusCode::OK.into_response()
        }
        SlackEvent::Ignored => StatusCode::OK.into_response(),
    }
}

async fn jira_webhook(
    State(state): State<SharedState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> StatusCode {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "undecodable webhook payload");
            return StatusCode::OK;
        }
    };
    if let Some(trigger) = parse_webhook(&payload, &state.property_key) {
        state
            .orchestrator
            .handle_trigger(TriggerEvent::TicketChanged(trigger));
    }
    StatusCode::OK
}
