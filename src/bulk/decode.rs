//! Structured value decoding.
//!
//! Sanitized text goes through an ordered chain of parse attempts (permissive
//! literal first, strict JSON second) and the first value that parses is
//! shaped for the batch's [`ResponseKind`]. [`decode`] is total: anything that
//! fails comes back as the kind's empty default.

use serde_json::Value;
use tracing::warn;

use super::literal::parse_literal;
use super::sanitize::sanitize;
use super::types::{DecodedValue, EvidenceRef, ResponseKind};

/// Longest slice of offending text included in a decode warning.
const PREVIEW_CHARS: usize = 200;

// =============================================================================
// Decode chain
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeAttempt {
    /// Loose literal syntax (single quotes, `True`/`None`, tuples).
    Literal,
    /// Strict JSON.
    Json,
}

/// Attempts in the order they are tried. Each gets the same input.
pub const DECODE_CHAIN: [DecodeAttempt; 2] = [DecodeAttempt::Literal, DecodeAttempt::Json];

impl DecodeAttempt {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeAttempt::Literal => "literal",
            DecodeAttempt::Json => "json",
        }
    }

    pub fn parse(&self, text: &str) -> Result<Value, String> {
        match self {
            DecodeAttempt::Literal => parse_literal(text).map_err(|e| e.to_string()),
            DecodeAttempt::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("no decode attempt succeeded ({})", describe_failures(.failures))]
    Unparseable {
        failures: Vec<(DecodeAttempt, String)>,
    },
    #[error("expected {expected}, found {found}")]
    WrongShape {
        expected: &'static str,
        found: &'static str,
    },
    #[error("statement object has no string \"Text\" field")]
    MissingText,
}

fn describe_failures(failures: &[(DecodeAttempt, String)]) -> String {
    failures
        .iter()
        .map(|(attempt, err)| format!("{}: {err}", attempt.as_str()))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Run the chain and return the first value that parses.
pub fn parse_structured(text: &str) -> Result<(DecodeAttempt, Value), DecodeError> {
    let mut failures = Vec::with_capacity(DECODE_CHAIN.len());
    for attempt in DECODE_CHAIN {
        match attempt.parse(text) {
            Ok(value) => return Ok((attempt, value)),
            Err(err) => failures.push((attempt, err)),
        }
    }
    Err(DecodeError::Unparseable { failures })
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode already-sanitized text, surfacing why it failed.
pub fn try_decode(sanitized: &str, kind: ResponseKind) -> Result<DecodedValue, DecodeError> {
    match kind {
        ResponseKind::Summary => Ok(summary_value(sanitized)),
        ResponseKind::Extraction => {
            let (_, value) = parse_structured(sanitized)?;
            shape_extraction(value)
        }
        ResponseKind::Statement => {
            let (_, value) = parse_structured(sanitized)?;
            shape_statement(value)
        }
    }
}

/// Decode already-sanitized text; failures become the kind's empty default.
pub fn decode(sanitized: &str, kind: ResponseKind) -> DecodedValue {
    match try_decode(sanitized, kind) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                kind = kind.as_str(),
                error = %err,
                text = %preview(sanitized),
                "formatting failed; using empty default"
            );
            DecodedValue::Empty(kind)
        }
    }
}

/// Sanitize then decode one raw response.
///
/// Summary responses skip sanitizing: the raw text is the answer, and stripping
/// fences or the word "json" from prose would corrupt it.
pub fn decode_response(raw: &str, kind: ResponseKind) -> Result<DecodedValue, DecodeError> {
    if !kind.is_structured() {
        return Ok(summary_value(raw));
    }
    try_decode(&sanitize(raw), kind)
}

fn summary_value(text: &str) -> DecodedValue {
    if text.trim().is_empty() {
        DecodedValue::Empty(ResponseKind::Summary)
    } else {
        DecodedValue::Summary(text.to_string())
    }
}

fn shape_extraction(value: Value) -> Result<DecodedValue, DecodeError> {
    match value {
        Value::Array(items) if items.is_empty() => Ok(DecodedValue::Empty(ResponseKind::Extraction)),
        Value::Array(items) => Ok(DecodedValue::Extraction(
            items.iter().map(EvidenceRef::from_value).collect(),
        )),
        Value::Object(map) if map.is_empty() => Ok(DecodedValue::Empty(ResponseKind::Extraction)),
        other => Err(DecodeError::WrongShape {
            expected: "a list of indices",
            found: value_type(&other),
        }),
    }
}

fn shape_statement(value: Value) -> Result<DecodedValue, DecodeError> {
    match value {
        Value::Object(map) if map.is_empty() => Ok(DecodedValue::Empty(ResponseKind::Statement)),
        Value::Object(mut map) => {
            let text = match map.remove("Text") {
                Some(Value::String(text)) => text,
                _ => return Err(DecodeError::MissingText),
            };
            let ids = match map.remove("ID") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.iter().map(EvidenceRef::from_value).collect(),
                Some(single) => vec![EvidenceRef::from_value(&single)],
            };
            Ok(DecodedValue::Statement { text, ids })
        }
        Value::Array(items) if items.is_empty() => Ok(DecodedValue::Empty(ResponseKind::Statement)),
        other => Err(DecodeError::WrongShape {
            expected: "an object with \"Text\" and \"ID\"",
            found: value_type(&other),
        }),
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().nth(PREVIEW_CHARS).is_some() {
        out.push_str("...");
    }
    out
}
