//! Data model for bulk completion runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::Message;

// =============================================================================
// Prompts
// =============================================================================

/// One completion request: an ordered list of role-tagged messages.
///
/// Serializes as a bare JSON array of `{role, content}` objects, which is the
/// shape the `relief run` input file uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prompt {
    messages: Vec<Message>,
}

impl Prompt {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// The usual system + user pair.
    pub fn system_user(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self::new(vec![Message::system(system), Message::user(user)])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// Ordered prompts; the index is the only correlation key between a prompt and
/// its result.
pub type Batch = Vec<Prompt>;

// =============================================================================
// Response kinds
// =============================================================================

/// Decode policy for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Free text; the raw response is the answer.
    Summary,
    /// A list of integer indices into the evidence offered in the prompt.
    Extraction,
    /// An object `{"Text": ..., "ID": [...]}` citing offered evidence.
    Statement,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Summary => "summary",
            ResponseKind::Extraction => "extraction",
            ResponseKind::Statement => "statement",
        }
    }

    /// Text substituted for a response that never arrived.
    pub fn failure_sentinel(&self) -> &'static str {
        match self {
            ResponseKind::Summary => "",
            ResponseKind::Extraction => "[]",
            ResponseKind::Statement => "{}",
        }
    }

    /// Whether responses go through sanitize + structural decode.
    pub fn is_structured(&self) -> bool {
        !matches!(self, ResponseKind::Summary)
    }
}

impl std::str::FromStr for ResponseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(ResponseKind::Summary),
            "extraction" => Ok(ResponseKind::Extraction),
            "statement" => Ok(ResponseKind::Statement),
            other => Err(format!(
                "unknown response kind '{other}' (expected summary, extraction or statement)"
            )),
        }
    }
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Raw and decoded responses
// =============================================================================

/// What came back from one dispatched prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResponse {
    Received(String),
    /// The call failed; `code` is the short provider error code.
    Failed { code: &'static str },
}

impl RawResponse {
    /// Response text, or the kind's failure sentinel.
    pub fn text_or_sentinel(&self, kind: ResponseKind) -> &str {
        match self {
            RawResponse::Received(text) => text,
            RawResponse::Failed { .. } => kind.failure_sentinel(),
        }
    }
}

/// A reference from a decoded answer back into offered evidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EvidenceRef {
    Index(i64),
    /// Something that was supposed to be an index but is not.
    Malformed(serde_json::Value),
}

impl EvidenceRef {
    /// Interpret one list element. Integral floats and digit strings count as
    /// indices, matching how model output is usually cast.
    pub fn from_value(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    EvidenceRef::Index(i)
                } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()) {
                    EvidenceRef::Index(f as i64)
                } else {
                    EvidenceRef::Malformed(value.clone())
                }
            }
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => EvidenceRef::Index(i),
                Err(_) => EvidenceRef::Malformed(value.clone()),
            },
            other => EvidenceRef::Malformed(other.clone()),
        }
    }

    pub fn index(&self) -> Option<i64> {
        match self {
            EvidenceRef::Index(i) => Some(*i),
            EvidenceRef::Malformed(_) => None,
        }
    }
}

/// The decoded answer for one batch slot.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Summary(String),
    Extraction(Vec<EvidenceRef>),
    Statement {
        text: String,
        ids: Vec<EvidenceRef>,
    },
    /// No usable answer; carries the kind it stands in for.
    Empty(ResponseKind),
}

impl DecodedValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, DecodedValue::Empty(_))
    }

    pub fn kind(&self) -> ResponseKind {
        match self {
            DecodedValue::Summary(_) => ResponseKind::Summary,
            DecodedValue::Extraction(_) => ResponseKind::Extraction,
            DecodedValue::Statement { .. } => ResponseKind::Statement,
            DecodedValue::Empty(kind) => *kind,
        }
    }

    /// JSON view, with `{}` / `[]` / `""` for the empty defaults.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};
        match self {
            DecodedValue::Summary(text) => Value::String(text.clone()),
            DecodedValue::Extraction(ids) => json!(ids),
            DecodedValue::Statement { text, ids } => json!({ "Text": text, "ID": ids }),
            DecodedValue::Empty(ResponseKind::Summary) => Value::String(String::new()),
            DecodedValue::Empty(ResponseKind::Extraction) => Value::Array(Vec::new()),
            DecodedValue::Empty(ResponseKind::Statement) => Value::Object(Default::default()),
        }
    }
}

// =============================================================================
// Per-unit reporting
// =============================================================================

/// Terminal path a unit of work took through
/// `Dispatched -> ResponseReceived|TransportFailed -> Sanitized -> Decoded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Response received and decoded into a usable value (or a deliberate empty answer).
    Decoded,
    /// Response received but neither decode attempt produced the expected shape.
    DecodeFallback,
    /// Transport or envelope failure; the failure sentinel was decoded instead.
    TransportFallback { code: &'static str },
}

#[derive(Debug, Clone)]
pub struct UnitReport {
    pub index: usize,
    pub outcome: UnitOutcome,
    pub latency: Duration,
}

/// Everything `run_bulk` returns for one batch.
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    pub batch_id: Uuid,
    pub kind: ResponseKind,
    /// Decoded values in submission order.
    pub results: Vec<DecodedValue>,
    /// Per-slot reports in submission order.
    pub reports: Vec<UnitReport>,
}

impl BulkOutcome {
    pub fn decoded(&self) -> &[DecodedValue] {
        &self.results
    }

    pub fn into_results(self) -> Vec<DecodedValue> {
        self.results
    }

    pub fn transport_failures(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, UnitOutcome::TransportFallback { .. }))
            .count()
    }

    pub fn decode_failures(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome == UnitOutcome::DecodeFallback)
            .count()
    }
}
