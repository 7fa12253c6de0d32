//! HTTP boundary to the render service.
//!
//! Submission and status polling are the only two calls the pipeline
//! makes; both are single awaitable requests with their own timeouts.
//! The [`RenderApi`] trait keeps the orchestrator and tracker testable
//! with fake services.

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::RenderSettings;

use super::error::RenderError;

/// Maximum length for error bodies carried in failures and logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Truncates a service error body to a reasonable length, on a character
/// boundary.
fn truncate_error_body(body: &str) -> String {
    if body.chars().count() > MAX_ERROR_BODY_LENGTH {
        let head: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{}... (truncated)", head)
    } else {
        body.to_string()
    }
}

/// Remote job status as reported by the render service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

/// One poll's view of a render job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: RemoteStatus,
    /// Artifact URL, present once the job succeeded.
    #[serde(default)]
    pub result_url: Option<String>,
    /// Failure detail, present once the job failed.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// The render service boundary.
#[async_trait]
pub trait RenderApi: Send + Sync {
    /// Submits code for rendering; returns the assigned task id.
    async fn submit(&self, code: &str) -> Result<String, RenderError>;

    /// Fetches the current status of a submitted job.
    async fn poll(&self, task_id: &str) -> Result<StatusSnapshot, RenderError>;
}

/// Render service client over HTTP.
pub struct HttpRenderClient {
    client: Client,
    base_url: String,
}

impl HttpRenderClient {
    /// Creates a client with the configured base URL and timeouts.
    pub fn new(settings: &RenderSettings) -> Result<Self, RenderError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| RenderError::Unreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Cheap reachability probe against the service's health endpoint.
    pub async fn health(&self) -> Result<(), RenderError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RenderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RenderError::Rejected {
                status: status.as_u16(),
                detail: truncate_error_body(&body),
            })
        }
    }
}

#[async_trait]
impl RenderApi for HttpRenderClient {
    async fn submit(&self, code: &str) -> Result<String, RenderError> {
        let url = format!("{}/api/render", self.base_url);
        debug!("Submitting {} bytes of code to {}", code.len(), url);

        let response = self
            .client
            .post(&url)
            .json(&SubmitRequest { code })
            .send()
            .await
            .map_err(|e| RenderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Rejected {
                status: status.as_u16(),
                detail: truncate_error_body(&body),
            });
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| RenderError::MalformedResponse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(RenderError::Rejected {
                status: status.as_u16(),
                detail: truncate_error_body(&error),
            });
        }

        let task_id = body
            .task_id
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                RenderError::MalformedResponse("submit response missing taskId".to_string())
            })?;

        info!("Render job submitted, task id {}", task_id);
        Ok(task_id)
    }

    async fn poll(&self, task_id: &str) -> Result<StatusSnapshot, RenderError> {
        let url = format!("{}/api/task/{}", self.base_url, task_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RenderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Rejected {
                status: status.as_u16(),
                detail: truncate_error_body(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| RenderError::MalformedResponse(e.to_string()))
    }
}
