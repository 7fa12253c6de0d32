//! Code extraction and normalization.
//!
//! Recovers a runnable program from a free-form model reply: the strategy
//! chain isolates a code block, the normalizer repairs imports and
//! deprecated symbols.

pub mod error;
pub mod normalize;
pub mod strategy;

pub use error::ExtractionError;
pub use normalize::{normalize, NormalizedCode};
pub use strategy::{extract, ExtractedCode, ExtractionStrategy};

/// Extracts code from a model reply and repairs it in one step.
pub fn extract_and_normalize(response: &str) -> Result<ExtractedCode, ExtractionError> {
    let mut extracted = extract(response)?;
    let normalized = normalize(&extracted.source);
    extracted.source = normalized.code;
    extracted.was_repaired = normalized.repaired;
    Ok(extracted)
}
