#![forbid(unsafe_code)]

//! # relief-harness
//!
//! Bulk LLM extraction over humanitarian document feeds.
//!
//! A caller turns its records into an ordered batch of prompts, each offering
//! the model a numbered set of evidence excerpts. [`run_bulk`] sends the batch
//! to an OpenAI-compatible endpoint with a bounded number of calls in flight,
//! cleans each reply into a literal, decodes it, and returns the results in
//! submission order. Calls or replies that fail become an empty default at
//! their slot instead of failing the batch. The join functions then resolve
//! the indices the model cited back to the excerpts it was shown.

pub mod bulk;
pub mod gateway;
pub mod prompts;

pub use bulk::{
    decode, join_extractions, join_statements, join_summaries, run_bulk, run_bulk_with, sanitize,
    Batch, BulkError, BulkOptions, BulkOutcome, DecodedValue, Dispatcher, EvidenceRecord,
    EvidenceRef, Prompt, ResponseKind,
};
pub use gateway::{
    Attribution, ChatGateway, ClientConfig, ProviderError, ProviderGateway, TracingUsageSink,
    UsageSink,
};
