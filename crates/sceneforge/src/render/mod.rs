//! Render service boundary: HTTP client, job handle, and the polling
//! tracker that follows a job to its terminal state.

pub mod client;
pub mod error;
pub mod tracker;

pub use client::{HttpRenderClient, RemoteStatus, RenderApi, StatusSnapshot};
pub use error::RenderError;
pub use tracker::{
    RenderJobTracker, TrackEvent, TrackOutcome, TrackState, TrackerHandle,
};

/// Lifecycle status of a render job as seen by this pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted by the renderer, not yet observed running.
    Submitted,
    /// Observed in progress.
    Running,
    /// Finished with an artifact URL.
    Succeeded,
    /// Finished without an artifact.
    Failed,
}

/// Handle to a remote render job. Owned by the orchestrator until
/// submission completes, then by the tracker for its polling duration.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Opaque identifier assigned by the renderer.
    pub task_id: String,
    pub status: JobStatus,
    /// Artifact URL, set on success.
    pub result_url: Option<String>,
    /// Renderer failure detail, set on failure.
    pub error_detail: Option<String>,
}

impl RenderJob {
    /// A freshly submitted job.
    pub fn submitted(task_id: String) -> Self {
        Self {
            task_id,
            status: JobStatus::Submitted,
            result_url: None,
            error_detail: None,
        }
    }
}
