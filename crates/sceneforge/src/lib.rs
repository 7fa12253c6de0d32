pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod render;
pub mod service;

pub use config::{Config, ConfigError, RenderSettings, TrackerSettings};
pub use db::{Database, DatabaseError, PromptKind, PromptRow};
pub use error::{Result, SceneforgeError};
pub use extract::{extract_and_normalize, ExtractedCode, ExtractionError, ExtractionStrategy};
pub use pipeline::{PipelineError, RenderJobOrchestrator, SubmittedTurn};
pub use render::{
    HttpRenderClient, JobStatus, RenderApi, RenderError, RenderJob, RenderJobTracker,
    TrackEvent, TrackOutcome, TrackState, TrackerHandle,
};
pub use service::{PromptAccepted, PromptRequest, PromptService, ReplyProvider};
