//! Render service error types.

use thiserror::Error;

/// Errors from the render service boundary.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The service could not be reached at the transport level.
    #[error("render service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with a non-2xx status or an error payload.
    #[error("render service rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The service answered 2xx but the body was not the expected JSON.
    #[error("malformed response from render service: {0}")]
    MalformedResponse(String),
}

impl RenderError {
    /// Whether a polling loop should retry after this error. Transport
    /// hiccups and garbled bodies can clear up; an explicit rejection is
    /// the service answering and will not change on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RenderError::Unreachable(_) | RenderError::MalformedResponse(_)
        )
    }
}
