//! Bounded concurrent dispatch of completion calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::types::{Prompt, RawResponse};
use super::BulkError;
use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, ProviderError};

/// Per-call ceiling covering connect, request and response body.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(90);

/// Gates completion calls so that at most `rate_limit` are in flight.
///
/// Clones share the gate and the gateway; a clone is what each bulk task holds.
#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<dyn ChatGateway>,
    gate: Arc<Semaphore>,
    rate_limit: usize,
    call_timeout: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("rate_limit", &self.rate_limit)
            .field("available", &self.gate.available_permits())
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn ChatGateway>, rate_limit: usize) -> Result<Self, BulkError> {
        if rate_limit == 0 || rate_limit > Semaphore::MAX_PERMITS {
            return Err(BulkError::InvalidRateLimit {
                got: rate_limit,
                max: Semaphore::MAX_PERMITS,
            });
        }
        Ok(Self {
            gateway,
            gate: Arc::new(Semaphore::new(rate_limit)),
            rate_limit,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn rate_limit(&self) -> usize {
        self.rate_limit
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Slots not currently held by an in-flight call.
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    /// Send one prompt once a slot is free.
    ///
    /// Never fails: transport errors, non-2xx statuses, malformed envelopes
    /// and timeouts are logged and returned as [`RawResponse::Failed`]. The
    /// slot is released on every path, including cancellation.
    pub async fn submit(
        &self,
        model: &ChatModel,
        prompt: &Prompt,
        attribution: Attribution,
    ) -> RawResponse {
        let slot = attribution.slot;
        let _permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(slot = ?slot, "dispatch gate closed; substituting failure sentinel");
                return RawResponse::Failed { code: "gate_closed" };
            }
        };

        let request = ChatRequest::new(model.clone(), prompt.messages().to_vec(), attribution);

        debug!(slot = ?slot, model = model.model_id(), "dispatching completion");

        let result = match timeout(self.call_timeout, self.gateway.chat(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.call_timeout, None)),
        };

        match result {
            Ok(response) => {
                debug!(
                    slot = ?slot,
                    latency_ms = response.latency.as_millis() as u64,
                    tokens = response.input_tokens + response.output_tokens,
                    "completion received"
                );
                RawResponse::Received(response.content)
            }
            Err(err) => {
                warn!(
                    slot = ?slot,
                    code = err.code(),
                    status = ?err.http_status(),
                    request_id = err.request_id().unwrap_or(""),
                    body = err
                        .context()
                        .and_then(|c| c.body_preview.as_deref())
                        .unwrap_or(""),
                    error = %err,
                    "completion call failed; substituting failure sentinel"
                );
                RawResponse::Failed { code: err.code() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChatResponse, Message};

    struct Echo;

    #[async_trait::async_trait]
    impl ChatGateway for Echo {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
            let last = req.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ChatResponse {
                content: last,
                ..ChatResponse::empty()
            })
        }
    }

    struct Hang;

    #[async_trait::async_trait]
    impl ChatGateway for Hang {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(ChatResponse::empty())
        }
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let err = Dispatcher::new(Arc::new(Echo), 0).unwrap_err();
        assert!(matches!(err, BulkError::InvalidRateLimit { got: 0, .. }));
    }

    #[tokio::test]
    async fn submit_returns_content_and_releases_slot() {
        let dispatcher = Dispatcher::new(Arc::new(Echo), 2).unwrap();
        let prompt = Prompt::new(vec![Message::system("s"), Message::user("hello")]);
        let raw = dispatcher
            .submit(&ChatModel::openai("gpt-4o"), &prompt, Attribution::new("test"))
            .await;
        assert_eq!(raw, RawResponse::Received("hello".to_string()));
        assert_eq!(dispatcher.available_slots(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_failed_response() {
        let dispatcher = Dispatcher::new(Arc::new(Hang), 1)
            .unwrap()
            .with_call_timeout(Duration::from_secs(5));
        let prompt = Prompt::system_user("s", "u");
        let raw = dispatcher
            .submit(&ChatModel::openai("gpt-4o"), &prompt, Attribution::new("test"))
            .await;
        assert_eq!(raw, RawResponse::Failed { code: "timeout" });
        assert_eq!(dispatcher.available_slots(), 1);
    }
}
