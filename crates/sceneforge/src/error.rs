use thiserror::Error;

#[derive(Error, Debug)]
pub enum SceneforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] crate::extract::ExtractionError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Render error: {0}")]
    Render(#[from] crate::render::RenderError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

pub type Result<T> = std::result::Result<T, SceneforgeError>;
