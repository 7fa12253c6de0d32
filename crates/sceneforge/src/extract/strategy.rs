//! Ordered extraction strategy chain.
//!
//! Model replies carry the program in one of three shapes, tried in order
//! with first match winning: an explicit `<code>...</code>` pair, a fenced
//! markdown block, or bare source recognized by its program skeleton.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use super::error::{response_preview, ExtractionError};

/// Opening delimiter the model is instructed to emit.
const OPEN_MARKER: &str = "<code>";
/// Closing delimiter the model is instructed to emit.
const CLOSE_MARKER: &str = "</code>";

/// Identifies which extraction strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Explicit `<code>...</code>` delimiter pair.
    Delimited,
    /// Triple-backtick fenced block, optionally language-tagged.
    Fenced,
    /// Program skeleton recognized by pattern matching on bare text.
    Heuristic,
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionStrategy::Delimited => write!(f, "delimited"),
            ExtractionStrategy::Fenced => write!(f, "fenced"),
            ExtractionStrategy::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Code recovered from a model reply. Ephemeral — lives for one pipeline
/// invocation and is never persisted.
#[derive(Debug, Clone)]
pub struct ExtractedCode {
    /// The extracted (and possibly repaired) program source.
    pub source: String,
    /// Whether normalization changed the source after extraction.
    pub was_repaired: bool,
    /// The strategy that matched.
    pub strategy: ExtractionStrategy,
}

static CODE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<code>(.*?)</code>").expect("code tag regex is valid")
});

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z0-9_+-]*)[ \t]*\n?(.*?)```").expect("fence regex is valid")
});

/// Program skeletons, in order: an import statement eventually followed by
/// a Scene subclass with a construct method.
static SKELETON_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)from\s+manim\s+import.*?class\s+\w+\s*\(\s*Scene\s*\).*?def\s+construct\s*\(\s*self",
        r"(?is)import\s+manim.*?class\s+\w+\s*\(\s*Scene\s*\).*?def\s+construct\s*\(\s*self",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("skeleton regex is valid"))
    .collect()
});

static CLASS_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"class\s+\w+\s*\(\s*Scene\s*\)\s*:").expect("class header regex is valid")
});

/// Runs the strategy chain against a raw model response.
///
/// Each strategy is tried only if the previous one produced no match. On
/// failure the returned diagnostic records marker presence and a bounded
/// preview of the response.
pub fn extract(response: &str) -> Result<ExtractedCode, ExtractionError> {
    let chain: &[(ExtractionStrategy, fn(&str) -> Option<String>)] = &[
        (ExtractionStrategy::Delimited, try_delimited),
        (ExtractionStrategy::Fenced, try_fenced),
        (ExtractionStrategy::Heuristic, try_heuristic),
    ];

    for (strategy, matcher) in chain {
        if let Some(source) = matcher(response) {
            debug!("Code extracted using {} strategy", strategy);
            return Ok(ExtractedCode {
                source,
                was_repaired: false,
                strategy: *strategy,
            });
        }
    }

    Err(ExtractionError::NoCodeFound {
        has_open_marker: contains_ignore_case(response, OPEN_MARKER),
        has_close_marker: contains_ignore_case(response, CLOSE_MARKER),
        preview: response_preview(response),
    })
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Strategy 1: interior of the first `<code>...</code>` pair. An open
/// marker without a closing one is no match; later pairs are ignored.
fn try_delimited(response: &str) -> Option<String> {
    CODE_TAG_RE
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Strategy 2: interior of the first fenced block.
fn try_fenced(response: &str) -> Option<String> {
    FENCE_RE
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Strategy 3: recognize a bare program skeleton and extend it to a full
/// logical block.
fn try_heuristic(response: &str) -> Option<String> {
    for skeleton in SKELETON_RES.iter() {
        if let Some(m) = skeleton.find(response) {
            // Prefer the class block; the prose before the first import is
            // not part of the program. Imports are restored by the
            // normalizer if the class block lacks them.
            let start = CLASS_HEADER_RE
                .find(response)
                .map_or(m.start(), |h| h.start());
            let block = logical_block(response, start);
            if !block.is_empty() {
                return Some(block);
            }
        }
    }
    None
}

/// Takes lines starting at `start` until the next blank-line boundary, the
/// next top-level (column 0) statement, or end of text.
fn logical_block(text: &str, start: usize) -> String {
    let mut lines = Vec::new();
    for (idx, line) in text[start..].lines().enumerate() {
        if idx > 0 {
            if line.is_empty() {
                break;
            }
            if line.chars().next().is_some_and(|c| !c.is_whitespace()) {
                break;
            }
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}
