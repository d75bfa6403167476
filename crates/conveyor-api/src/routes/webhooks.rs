//! Push-event webhook endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(usage_hint).post(push_webhook))
}

/// What went wrong extracting the trigger pair from a push payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("request body is not valid JSON")]
    MalformedJson,

    #[error("payload has no commits[0].id")]
    MissingCommitId,

    #[error("payload has no repository.clone_url")]
    MissingCloneUrl,
}

impl From<PayloadError> for ApiError {
    fn from(err: PayloadError) -> Self {
        ApiError::UnprocessableEntity(err.to_string())
    }
}

/// The trigger pair: which commit to build, and where to clone it from.
#[derive(Debug, PartialEq, Eq)]
struct PushEvent {
    commit_id: String,
    clone_url: String,
}

impl PushEvent {
    fn from_payload(payload: &Value) -> Result<Self, PayloadError> {
        let commit_id = payload
            .get("commits")
            .and_then(|commits| commits.get(0))
            .and_then(|commit| commit.get("id"))
            .and_then(Value::as_str)
            .ok_or(PayloadError::MissingCommitId)?;

        let clone_url = payload
            .get("repository")
            .and_then(|repo| repo.get("clone_url"))
            .and_then(Value::as_str)
            .ok_or(PayloadError::MissingCloneUrl)?;

        Ok(Self {
            commit_id: commit_id.to_string(),
            clone_url: clone_url.to_string(),
        })
    }
}

async fn usage_hint() -> Json<Value> {
    Json(json!({
        "message": "POST a push event to this endpoint to trigger a build"
    }))
}

/// Accept a push event and admit a build for it.
///
/// Responds as soon as the build is queued; its outcome is observable
/// only through the process log stream.
async fn push_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let payload: Value =
        serde_json::from_slice(&body).map_err(|_| PayloadError::MalformedJson)?;

    let push = PushEvent::from_payload(&payload)?;
    info!(sha = %push.commit_id, repo = %push.clone_url, "Received push event");

    let build = state.queue.submit(&push.commit_id, &push.clone_url)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "build": build.to_string() })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_payload() -> Value {
        json!({
            "commits": [
                { "id": "abc123def456", "message": "fix the build" },
                { "id": "000aaa111bbb", "message": "older commit" }
            ],
            "repository": {
                "clone_url": "https://example.com/owner/repo.git",
                "full_name": "owner/repo"
            }
        })
    }

    #[test]
    fn test_extracts_head_commit_and_clone_url() {
        let event = PushEvent::from_payload(&push_payload()).unwrap();
        assert_eq!(event.commit_id, "abc123def456");
        assert_eq!(event.clone_url, "https://example.com/owner/repo.git");
    }

    #[test]
    fn test_missing_commits_is_a_specific_error() {
        let mut payload = push_payload();
        payload.as_object_mut().unwrap().remove("commits");

        assert_eq!(
            PushEvent::from_payload(&payload),
            Err(PayloadError::MissingCommitId)
        );
    }

    #[test]
    fn test_empty_commit_list_is_a_specific_error() {
        let mut payload = push_payload();
        payload["commits"] = json!([]);

        assert_eq!(
            PushEvent::from_payload(&payload),
            Err(PayloadError::MissingCommitId)
        );
    }

    #[test]
    fn test_missing_clone_url_is_a_specific_error() {
        let mut payload = push_payload();
        payload["repository"] = json!({ "full_name": "owner/repo" });

        assert_eq!(
            PushEvent::from_payload(&payload),
            Err(PayloadError::MissingCloneUrl)
        );
    }

    #[test]
    fn test_non_string_commit_id_is_rejected() {
        let mut payload = push_payload();
        payload["commits"][0]["id"] = json!(12345);

        assert_eq!(
            PushEvent::from_payload(&payload),
            Err(PayloadError::MissingCommitId)
        );
    }
}
