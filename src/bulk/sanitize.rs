//! Recovery of a bracketed literal from raw model output.
//!
//! Models asked for "only a dict" or "only a list" routinely wrap the answer in
//! code fences, add prose around it, break lines mid-structure, drop commas
//! between strings or leak control characters. `sanitize` undoes those in a
//! fixed order and returns the first `{...}` or `[...]` span it finds.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Two double-quoted tokens separated only by whitespace.
static MISSING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(\s+)""#).expect("Invalid missing-comma regex"));

/// Upper bound on whole-pipeline passes. Real responses settle in two.
const MAX_CLEAN_PASSES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanitizeError {
    #[error("unbalanced '{open}' at byte {position}: no closing '{close}' follows")]
    UnbalancedBracket {
        open: char,
        close: char,
        position: usize,
    },
}

/// Clean `raw` and extract its first bracketed span.
///
/// Total: when extraction fails the cleaned text is returned as-is, and the
/// decoder reports it. Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> String {
    let cleaned = clean(raw);
    match extract_first_bracketed(&cleaned) {
        Ok(span) => span.to_string(),
        Err(err) => {
            debug!(error = %err, "bracket extraction failed; keeping cleaned text");
            cleaned
        }
    }
}

/// Like [`sanitize`], but surfaces an unbalanced opening bracket.
pub fn try_sanitize(raw: &str) -> Result<String, SanitizeError> {
    let cleaned = clean(raw);
    extract_first_bracketed(&cleaned).map(str::to_string)
}

/// Steps 1-5, repeated until nothing changes.
///
/// Control-character removal can splice a new `json` token or quote pair
/// together, so a single pass is not always stable.
pub fn clean(raw: &str) -> String {
    let mut current = clean_once(raw);
    for _ in 1..MAX_CLEAN_PASSES {
        let next = clean_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn clean_once(raw: &str) -> String {
    let s = strip_fences(raw);
    let s = flatten_whitespace(&s);
    let s = normalize_nbsp_escape(&s);
    let s = insert_missing_commas(&s);
    strip_control_chars(&s)
}

/// Step 1: code fences and the `json` language tag.
///
/// Every occurrence of `json` goes, not only the fence tag.
fn strip_fences(s: &str) -> String {
    let mut out = s.to_string();
    while out.contains("```") || out.contains("json") {
        out = out.replace("```", "").replace("json", "");
    }
    out
}

/// Step 2: join lines around braces, then collapse every whitespace run.
fn flatten_whitespace(s: &str) -> String {
    let s = s
        .replace("\n{", "{")
        .replace("}\n", "}")
        .replace(['\n', '\t', '\r'], " ");
    WHITESPACE_RUN.replace_all(&s, " ").trim().to_string()
}

/// Step 3: the escaped non-breaking space models copy out of scraped HTML.
fn normalize_nbsp_escape(s: &str) -> String {
    s.replace(r"\xa0", r"\u00A0")
}

/// Step 4: `"a" "b"` becomes `"a", "b"`.
///
/// Repeated until no pair is left, since a replacement can uncover a pair the
/// previous non-overlapping scan skipped.
fn insert_missing_commas(s: &str) -> String {
    let mut out = s.to_string();
    while MISSING_COMMA.is_match(&out) {
        out = MISSING_COMMA.replace_all(&out, "\",${1}\"").into_owned();
    }
    out
}

/// Step 5: drop everything below U+0020.
fn strip_control_chars(s: &str) -> String {
    s.chars().filter(|c| u32::from(*c) >= 0x20).collect()
}

/// Step 6: the first `{...}` or `[...]` span, whichever opens first.
///
/// Not nesting-aware: the span ends at the first closing bracket of the same
/// kind. Without any opening bracket the whole input is returned.
pub fn extract_first_bracketed(s: &str) -> Result<&str, SanitizeError> {
    let curly = s.find('{');
    let square = s.find('[');

    let (open, close, start) = match (curly, square) {
        (Some(c), Some(q)) if c < q => ('{', '}', c),
        (_, Some(q)) => ('[', ']', q),
        (Some(c), None) => ('{', '}', c),
        (None, None) => return Ok(s),
    };

    match s[start..].find(close) {
        Some(offset) => Ok(&s[start..start + offset + close.len_utf8()]),
        None => Err(SanitizeError::UnbalancedBracket {
            open,
            close,
            position: start,
        }),
    }
}
