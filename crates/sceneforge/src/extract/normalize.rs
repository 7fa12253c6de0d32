//! Deterministic repair of extracted code.
//!
//! Three ordered rules: restore the canonical library import, inject the
//! rate-function import when its symbols are used, and rewrite deprecated
//! rate constants to their modern lower-case equivalents. Total and
//! idempotent — code that already satisfies all three rules passes through
//! unchanged.

use std::sync::LazyLock;

use regex::Regex;

/// Import prepended when the code carries no import statement at all.
pub const CANONICAL_IMPORT: &str = "from manim import *";

/// Import injected when rate functions are referenced without it.
pub const RATE_FUNCTIONS_IMPORT: &str =
    "from manim.utils.rate_functions import linear, smooth, ease_in, ease_out, ease_in_out";

/// Legacy constant names and their modern function equivalents.
/// `EASE_IN` inside `EASE_IN_OUT` is protected by the word boundary —
/// an underscore is a word character.
const RENAMES: &[(&str, &str)] = &[
    ("LINEAR", "linear"),
    ("SMOOTH", "smooth"),
    ("EASE_IN_OUT", "ease_in_out"),
    ("EASE_IN", "ease_in"),
    ("EASE_OUT", "ease_out"),
];

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:import\s+\w|from\s+[\w.]+\s+import\b)").expect("import regex is valid")
});

static RATE_USAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:LINEAR|SMOOTH|EASE_IN|EASE_OUT|EASE_IN_OUT)\b|rate_func\s*=")
        .expect("rate usage regex is valid")
});

/// Any import line that brings `rate_functions` into scope, whether as
/// `from manim.utils.rate_functions import ...`, `from manim.utils import
/// rate_functions`, or `import manim.utils.rate_functions`.
static RATE_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:from|import)\s+[^\n#]*\brate_functions\b")
        .expect("rate import regex is valid")
});

static RENAME_RES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    RENAMES
        .iter()
        .map(|(legacy, modern)| {
            let re = Regex::new(&format!(r"\b{legacy}\b")).expect("rename regex is valid");
            (re, *modern)
        })
        .collect()
});

/// Result of one normalization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCode {
    /// The repaired source.
    pub code: String,
    /// Whether any rule changed the input.
    pub repaired: bool,
}

/// Applies the repair rules in order. Never fails; no-repair-needed is a
/// valid outcome.
pub fn normalize(code: &str) -> NormalizedCode {
    let mut out = code.to_string();
    let mut repaired = false;

    // Rule 1: no import statement at all — prepend the canonical import.
    if !IMPORT_RE.is_match(&out) {
        out = format!("{CANONICAL_IMPORT}\n\n{out}");
        repaired = true;
    }

    // Rule 2: rate functions referenced without their import.
    if RATE_USAGE_RE.is_match(&out) && !RATE_IMPORT_RE.is_match(&out) {
        if out.contains(CANONICAL_IMPORT) {
            out = out.replacen(
                CANONICAL_IMPORT,
                &format!("{CANONICAL_IMPORT}\n{RATE_FUNCTIONS_IMPORT}"),
                1,
            );
        } else {
            out = format!("{RATE_FUNCTIONS_IMPORT}\n{out}");
        }
        repaired = true;
    }

    // Rule 3: rewrite deprecated constants as whole tokens.
    for (re, modern) in RENAME_RES.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *modern).into_owned();
            repaired = true;
        }
    }

    NormalizedCode { code: out, repaired }
}
