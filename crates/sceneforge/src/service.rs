//! Pipeline entry point for an embedding UI or HTTP layer.
//!
//! Accepts `{ prompt, projectId }`, obtains the model reply through an
//! injected [`ReplyProvider`], runs the orchestrator, and hands back
//! either an accepted job or a typed error payload. Tracking runs as a
//! detached background task — the submitting caller never waits for the
//! render to finish.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::TrackerSettings;
use crate::db::Database;
use crate::pipeline::{PipelineError, RenderJobOrchestrator};
use crate::render::{RenderApi, RenderJobTracker, TrackEvent, TrackerHandle};

/// Produces the model reply for a user prompt. The actual LLM call lives
/// outside this crate; implementations wrap whatever provider is in use.
#[async_trait]
pub trait ReplyProvider: Send + Sync {
    async fn reply(&self, prompt: &str) -> Result<String, ReplyError>;
}

/// Failure from the model provider.
#[derive(Error, Debug)]
#[error("model provider error: {0}")]
pub struct ReplyError(pub String);

/// Incoming request from the embedding layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub prompt: String,
    pub project_id: String,
}

/// A job was accepted; poll or track separately.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAccepted {
    pub task_id: String,
    /// Id of the SYSTEM prompt record the job's result will be written to.
    pub prompt_id: String,
}

/// Coarse classification separating caller-side problems from
/// service-side ones, the way an HTTP layer splits 4xx from 5xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request itself was unusable (e.g. empty prompt).
    InvalidRequest,
    /// The model reply contained no recoverable code.
    ExtractionFailed,
    /// The renderer could not be reached or rejected the code.
    SubmissionFailed,
    /// The model provider failed.
    ProviderFailed,
    /// Storage or another internal collaborator failed.
    Internal,
}

/// Error payload returned to the embedding layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    fn new(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind,
            details: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<PipelineError> for ErrorBody {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Extraction(cause) => {
                ErrorBody::new(ErrorKind::ExtractionFailed, "No code found in model reply")
                    .with_details(cause.to_string())
            }
            PipelineError::Submission(cause) => {
                ErrorBody::new(ErrorKind::SubmissionFailed, "Failed to submit render job")
                    .with_details(cause.to_string())
            }
            PipelineError::Database(cause) => {
                ErrorBody::new(ErrorKind::Internal, "Conversation store failure")
                    .with_details(cause.to_string())
            }
            PipelineError::CompensationFailed { .. } => {
                ErrorBody::new(ErrorKind::Internal, "Failed to submit render job")
                    .with_details(e.to_string())
            }
        }
    }
}

/// Wires the conversation store, model provider, orchestrator and tracker
/// into the single entry point the UI layer consumes.
pub struct PromptService {
    provider: Arc<dyn ReplyProvider>,
    orchestrator: RenderJobOrchestrator,
    tracker: RenderJobTracker,
}

impl PromptService {
    pub fn new(
        db: Database,
        render: Arc<dyn RenderApi>,
        provider: Arc<dyn ReplyProvider>,
        tracker_settings: TrackerSettings,
    ) -> Self {
        Self {
            provider,
            orchestrator: RenderJobOrchestrator::new(db.clone(), Arc::clone(&render)),
            tracker: RenderJobTracker::new(db, render, tracker_settings),
        }
    }

    /// Handles one prompt: model call, extraction, persistence, submission.
    /// Returns as soon as the job is accepted; use [`track`](Self::track)
    /// to follow it.
    pub async fn handle_prompt(
        &self,
        request: &PromptRequest,
    ) -> Result<PromptAccepted, ErrorBody> {
        if request.prompt.trim().is_empty() {
            return Err(ErrorBody::new(ErrorKind::InvalidRequest, "Prompt is required"));
        }
        if request.project_id.trim().is_empty() {
            return Err(ErrorBody::new(
                ErrorKind::InvalidRequest,
                "Project id is required",
            ));
        }

        debug!("Handling prompt for project {}", request.project_id);

        let reply = self.provider.reply(&request.prompt).await.map_err(|e| {
            ErrorBody::new(ErrorKind::ProviderFailed, "Model provider call failed")
                .with_details(e.to_string())
        })?;

        let turn = self
            .orchestrator
            .submit_turn(&request.project_id, &request.prompt, &reply)
            .await?;

        Ok(PromptAccepted {
            task_id: turn.job.task_id,
            prompt_id: turn.system_prompt_id,
        })
    }

    /// Starts tracking an accepted job in the background.
    pub fn track(&self, accepted: &PromptAccepted) -> TrackerHandle {
        self.tracker.track(&accepted.prompt_id, &accepted.task_id)
    }

    /// Subscribes to tracker state transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackEvent> {
        self.tracker.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: PromptRequest =
            serde_json::from_str(r#"{"prompt": "draw", "projectId": "p1"}"#).unwrap();
        assert_eq!(request.prompt, "draw");
        assert_eq!(request.project_id, "p1");
    }

    #[test]
    fn test_accepted_serializes_camel_case() {
        let accepted = PromptAccepted {
            task_id: "t1".to_string(),
            prompt_id: "p1".to_string(),
        };
        let json = serde_json::to_string(&accepted).unwrap();
        assert_eq!(json, r#"{"taskId":"t1","promptId":"p1"}"#);
    }

    #[test]
    fn test_extraction_error_maps_to_client_kind() {
        let body: ErrorBody = PipelineError::Extraction(
            crate::extract::ExtractionError::NoCodeFound {
                has_open_marker: false,
                has_close_marker: false,
                preview: "nope".to_string(),
            },
        )
        .into();
        assert_eq!(body.kind, ErrorKind::ExtractionFailed);
        assert!(body.details.is_some());
    }

    #[test]
    fn test_submission_error_maps_to_server_kind() {
        let body: ErrorBody = PipelineError::Submission(crate::render::RenderError::Unreachable(
            "connection refused".to_string(),
        ))
        .into();
        assert_eq!(body.kind, ErrorKind::SubmissionFailed);
    }

    #[test]
    fn test_error_body_omits_empty_details() {
        let json =
            serde_json::to_string(&ErrorBody::new(ErrorKind::InvalidRequest, "bad")).unwrap();
        assert!(!json.contains("details"));
        assert!(json.contains("invalid_request"));
    }
}
