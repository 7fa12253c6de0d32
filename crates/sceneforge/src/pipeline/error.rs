//! Pipeline error taxonomy.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::extract::ExtractionError;
use crate::render::RenderError;

/// Errors from one prompt-to-job pipeline invocation.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No code could be recovered from the model reply. Terminal for this
    /// turn; never retried (identical input extracts identically). The
    /// USER record persists.
    #[error("Code extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Conversation store failure outside the compensation path.
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    /// The renderer never accepted a job; both turn records were removed.
    #[error("Render submission failed: {0}")]
    Submission(#[source] RenderError),

    /// Submission failed and the compensating delete also failed, leaving
    /// the turn records in place. Both causes are reported.
    #[error("Render submission failed ({submission}); compensating delete also failed: {compensation}")]
    CompensationFailed {
        submission: RenderError,
        #[source]
        compensation: DatabaseError,
    },
}
