//! Bulk completion runs: fan a batch out through the dispatcher, decode each
//! response and hand results back in submission order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::decode::{decode_response, preview};
use super::dispatch::{Dispatcher, DEFAULT_CALL_TIMEOUT};
use super::progress::Progress;
use super::types::{
    Batch, BulkOutcome, DecodedValue, Prompt, RawResponse, ResponseKind, UnitOutcome, UnitReport,
};
use super::BulkError;
use crate::gateway::{Attribution, ChatGateway, ChatModel};

pub const DEFAULT_RATE_LIMIT: usize = 1;

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone)]
pub struct BulkOptions {
    pub model: String,
    pub kind: ResponseKind,
    /// Maximum in-flight calls.
    pub rate_limit: usize,
    pub call_timeout: Duration,
    /// Draw a progress bar on stderr.
    pub show_progress: bool,
    /// Progress bar label; derived from the kind when unset.
    pub label: Option<String>,
    /// Recorded on every provider call for usage attribution.
    pub caller: &'static str,
}

impl BulkOptions {
    /// Defaults: one call in flight, 90 s per call, progress shown for
    /// structured kinds only.
    pub fn new(model: impl Into<String>, kind: ResponseKind) -> Self {
        Self {
            model: model.into(),
            kind,
            rate_limit: DEFAULT_RATE_LIMIT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            show_progress: kind.is_structured(),
            label: None,
            caller: "bulk",
        }
    }

    pub fn rate_limit(mut self, rate_limit: usize) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn caller(mut self, caller: &'static str) -> Self {
        self.caller = caller;
        self
    }

    fn progress_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("Generating {} results", self.kind))
    }
}

// =============================================================================
// Run
// =============================================================================

/// Run `batch` through `gateway` with at most `options.rate_limit` calls in flight.
///
/// `results[i]` always corresponds to `batch[i]`. Per-call failures never fail
/// the run; they yield the kind's empty default and show up in the reports.
/// Only a fault in the task group itself (a panicked unit) aborts the batch.
pub async fn run_bulk(
    gateway: Arc<dyn ChatGateway>,
    batch: Batch,
    options: &BulkOptions,
) -> Result<BulkOutcome, BulkError> {
    let dispatcher =
        Dispatcher::new(gateway, options.rate_limit)?.with_call_timeout(options.call_timeout);
    run_bulk_with(&dispatcher, batch, options).await
}

/// Like [`run_bulk`], reusing an existing dispatcher (and its concurrency gate).
///
/// `options.rate_limit` and `options.call_timeout` are ignored here; the
/// dispatcher's own settings apply.
pub async fn run_bulk_with(
    dispatcher: &Dispatcher,
    batch: Batch,
    options: &BulkOptions,
) -> Result<BulkOutcome, BulkError> {
    let batch_id = Uuid::new_v4();
    let total = batch.len();
    let kind = options.kind;
    let model = ChatModel::openai(&options.model);

    info!(
        %batch_id,
        total,
        kind = kind.as_str(),
        model = %options.model,
        rate_limit = dispatcher.rate_limit(),
        "starting bulk run"
    );

    let progress = Arc::new(if options.show_progress {
        Progress::with_bar(total, options.progress_label())
    } else {
        Progress::hidden(total)
    });

    let mut units = JoinSet::new();
    for (index, prompt) in batch.into_iter().enumerate() {
        let dispatcher = dispatcher.clone();
        let model = model.clone();
        let progress = Arc::clone(&progress);
        let attribution = Attribution::new(options.caller)
            .with_job(batch_id)
            .with_slot(index);

        units.spawn(async move {
            let _tick = progress.guard();
            run_unit(&dispatcher, &model, kind, index, prompt, attribution).await
        });
    }

    let mut slots: Vec<Option<(DecodedValue, UnitReport)>> = (0..total).map(|_| None).collect();
    while let Some(joined) = units.join_next().await {
        match joined {
            Ok((value, report)) => {
                let index = report.index;
                slots[index] = Some((value, report));
            }
            Err(err) => {
                units.abort_all();
                progress.abandon();
                let message = if err.is_panic() {
                    format!("unit panicked: {err}")
                } else {
                    format!("unit cancelled: {err}")
                };
                error!(%batch_id, error = %message, "bulk run aborted");
                return Err(BulkError::GroupFault(message));
            }
        }
    }
    progress.finish();

    let mut results = Vec::with_capacity(total);
    let mut reports = Vec::with_capacity(total);
    for (index, slot) in slots.into_iter().enumerate() {
        let (value, report) = slot.ok_or(BulkError::MissingSlot(index))?;
        results.push(value);
        reports.push(report);
    }

    let outcome = BulkOutcome {
        batch_id,
        kind,
        results,
        reports,
    };

    info!(
        %batch_id,
        total,
        transport_failures = outcome.transport_failures(),
        decode_failures = outcome.decode_failures(),
        "bulk run finished"
    );

    Ok(outcome)
}

/// Dispatch, sanitize and decode one prompt.
async fn run_unit(
    dispatcher: &Dispatcher,
    model: &ChatModel,
    kind: ResponseKind,
    index: usize,
    prompt: Prompt,
    attribution: Attribution,
) -> (DecodedValue, UnitReport) {
    let started = Instant::now();
    let raw = dispatcher.submit(model, &prompt, attribution).await;
    let text = raw.text_or_sentinel(kind);

    let (value, decoded_ok) = match decode_response(text, kind) {
        Ok(value) => (value, true),
        Err(err) => {
            warn!(
                slot = index,
                kind = kind.as_str(),
                error = %err,
                text = %preview(text),
                "formatting failed; using empty default"
            );
            (DecodedValue::Empty(kind), false)
        }
    };

    let outcome = match (&raw, decoded_ok) {
        (RawResponse::Failed { code }, _) => UnitOutcome::TransportFallback { code: *code },
        (RawResponse::Received(_), true) => UnitOutcome::Decoded,
        (RawResponse::Received(_), false) => UnitOutcome::DecodeFallback,
    };

    (
        value,
        UnitReport {
            index,
            outcome,
            latency: started.elapsed(),
        },
    )
}
