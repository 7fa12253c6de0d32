//! Extraction error types.

use thiserror::Error;

/// Maximum number of characters of the model response carried in an
/// extraction failure diagnostic. Bounds log size when the diagnostic
/// is printed; the full response is never attached.
pub const MAX_PREVIEW_CHARS: usize = 500;

/// Errors from the code extraction strategy chain.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// No strategy matched. Carries enough context for an operator to see
    /// whether the model emitted markers at all.
    #[error(
        "no code found in model response (open marker present: {has_open_marker}, \
         close marker present: {has_close_marker})"
    )]
    NoCodeFound {
        /// Whether the opening delimiter was present anywhere in the response.
        has_open_marker: bool,
        /// Whether the closing delimiter was present anywhere in the response.
        has_close_marker: bool,
        /// First [`MAX_PREVIEW_CHARS`] characters of the response.
        preview: String,
    },
}

/// Truncates a response to the diagnostic preview length on a character
/// boundary.
pub(crate) fn response_preview(text: &str) -> String {
    text.chars().take(MAX_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_text() {
        let text = "x".repeat(2000);
        let preview = response_preview(&text);
        assert_eq!(preview.chars().count(), MAX_PREVIEW_CHARS);
    }

    #[test]
    fn test_preview_keeps_short_text() {
        assert_eq!(response_preview("short"), "short");
    }

    #[test]
    fn test_preview_is_char_boundary_safe() {
        let text = "é".repeat(600);
        let preview = response_preview(&text);
        assert_eq!(preview.chars().count(), MAX_PREVIEW_CHARS);
    }
}
