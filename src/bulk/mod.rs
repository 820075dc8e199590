//! Bulk completion pipeline.
//!
//! ```text
//! Batch ──► Dispatcher (≤ rate_limit in flight) ──► RawResponse
//!                                                      │
//!            sanitize ──► decode (literal, then JSON) ◄┘
//!                             │
//!   BulkOutcome.results[i] ◄──┘   (same index as batch[i])
//! ```
//!
//! Individual call or decode failures become the kind's empty default at their
//! slot. Only [`BulkError`] fails a whole run.

pub mod decode;
pub mod dispatch;
pub mod join;
pub mod literal;
pub mod progress;
pub mod runner;
pub mod sanitize;
pub mod types;

pub use decode::{decode, decode_response, try_decode, DecodeAttempt, DecodeError, DECODE_CHAIN};
pub use dispatch::{Dispatcher, DEFAULT_CALL_TIMEOUT};
pub use join::{
    join_extractions, join_statements, join_summaries, EvidenceRecord, ExtractionRecord,
    JoinError, StatementRecord, SummaryRecord, UnresolvedRef,
};
pub use literal::{parse_literal, LiteralError};
pub use progress::Progress;
pub use runner::{run_bulk, run_bulk_with, BulkOptions, DEFAULT_RATE_LIMIT};
pub use sanitize::{sanitize, try_sanitize, SanitizeError};
pub use types::{
    Batch, BulkOutcome, DecodedValue, EvidenceRef, Prompt, RawResponse, ResponseKind,
    UnitOutcome, UnitReport,
};

/// Errors that fail an entire bulk run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BulkError {
    #[error("rate_limit must be between 1 and {max}, got {got}")]
    InvalidRateLimit { got: usize, max: usize },

    /// The task group itself faulted; the batch must be resubmitted.
    #[error("bulk task group faulted: {0}")]
    GroupFault(String),

    #[error("slot {0} finished without a result")]
    MissingSlot(usize),
}
