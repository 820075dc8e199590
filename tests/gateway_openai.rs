use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relief_harness::gateway::openai::{ChatProvider, OpenAiAdapter};
use relief_harness::gateway::{
    Attribution, ChatModel, ChatRequest, ClientConfig, FinishReason, GatewayConfig, Message,
    NoopUsageSink, ProviderError, ProviderGateway,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn adapter_for(server: &MockServer) -> OpenAiAdapter {
    let config = ClientConfig::new("sk-test")
        .base_url(server.uri())
        .timeout(Duration::from_secs(5));
    OpenAiAdapter::from_config(&config).unwrap()
}

fn request() -> ChatRequest {
    ChatRequest::new(
        ChatModel::openai("gpt-4o"),
        vec![Message::system("sys"), Message::user(r#"{"0": "text A"}"#)],
        Attribution::new("test"),
    )
}

#[tokio::test]
async fn openai_parses_success_content_and_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("content-type", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-request-id", "req-1")
                .set_body_json(json!({
                    "choices": [{
                        "message": { "content": "[0]" },
                        "finish_reason": "stop"
                    }],
                    "usage": { "prompt_tokens": 10, "completion_tokens": 2 }
                })),
        )
        .mount(&server)
        .await;

    let resp = adapter_for(&server).chat(&request()).await.unwrap();
    assert_eq!(resp.content, "[0]");
    assert_eq!(resp.finish_reason, FinishReason::Stop);
    assert_eq!(resp.input_tokens, 10);
    assert_eq!(resp.output_tokens, 2);
    assert_eq!(resp.request_id.as_deref(), Some("req-1"));
}

#[tokio::test]
async fn openai_sends_only_model_and_messages_by_default() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "ok" } }]
        })))
        .mount(&server)
        .await;

    adapter_for(&server).chat(&request()).await.unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(
        body,
        json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "{\"0\": \"text A\"}"}
            ]
        })
    );
}

#[tokio::test]
async fn openai_missing_content_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": {}, "finish_reason": "stop" }]
        })))
        .mount(&server)
        .await;

    let err = adapter_for(&server).chat(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    assert_eq!(err.code(), "malformed_response");
}

#[tokio::test]
async fn openai_non_json_body_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = adapter_for(&server).chat(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    let ctx = err.context().expect("expected error context");
    assert_eq!(ctx.http_status, Some(200));
    assert!(ctx.body_preview.as_deref().unwrap_or("").contains("gateway"));
}

#[tokio::test]
async fn openai_classifies_http_429_and_keeps_context() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("x-request-id", "abc123")
                .insert_header("retry-after", "7")
                .set_body_json(json!({
                    "error": { "message": "rate limited", "code": "rate_limit_exceeded" }
                })),
        )
        .mount(&server)
        .await;

    let err = adapter_for(&server).chat(&request()).await.unwrap_err();
    match err {
        ProviderError::RateLimited {
            retry_after,
            context,
        } => {
            assert_eq!(retry_after, Duration::from_secs(7));
            let ctx = context.expect("expected error context");
            assert_eq!(ctx.http_status, Some(429));
            assert_eq!(ctx.provider_code.as_deref(), Some("rate_limit_exceeded"));
            assert_eq!(ctx.request_id.as_deref(), Some("abc123"));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn openai_server_error_is_retryable_client_error_is_not() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = adapter_for(&server).chat(&request()).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.http_status(), Some(503));

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "bad model", "code": "model_not_found" }
        })))
        .mount(&server)
        .await;

    let err = adapter_for(&server).chat(&request()).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.code(), "provider_error");
    assert!(err.to_string().contains("bad model"));
}

#[derive(Clone)]
struct FlipResponder {
    calls: Arc<AtomicUsize>,
    first: ResponseTemplate,
    second: ResponseTemplate,
}

impl Respond for FlipResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            self.first.clone()
        } else {
            self.second.clone()
        }
    }
}

fn flip_server_templates() -> (ResponseTemplate, ResponseTemplate) {
    let first = ResponseTemplate::new(500).set_body_json(json!({
        "error": { "message": "transient error", "code": "internal" }
    }));
    let second = ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{
            "message": { "content": "ok" },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
    }));
    (first, second)
}

#[tokio::test]
async fn provider_gateway_retries_on_retryable_errors_and_succeeds() {
    let server = MockServer::start().await;
    let (first, second) = flip_server_templates();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FlipResponder {
            calls: Arc::new(AtomicUsize::new(0)),
            first,
            second,
        })
        .mount(&server)
        .await;

    let gateway = ProviderGateway::with_config(
        adapter_for(&server),
        Arc::new(NoopUsageSink),
        GatewayConfig {
            max_retries: 1,
            retry_base_delay: Duration::from_millis(0),
        },
    );

    let resp = gateway.chat(request()).await.unwrap();
    assert_eq!(resp.content, "ok");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn provider_gateway_default_makes_exactly_one_call() {
    let server = MockServer::start().await;
    let (first, second) = flip_server_templates();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FlipResponder {
            calls: Arc::new(AtomicUsize::new(0)),
            first,
            second,
        })
        .mount(&server)
        .await;

    let gateway = ProviderGateway::with_config(
        adapter_for(&server),
        Arc::new(NoopUsageSink),
        GatewayConfig::default(),
    );

    let err = gateway.chat(request()).await.unwrap_err();
    assert_eq!(err.http_status(), Some(500));

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn provider_gateway_with_retries_may_post_more_than_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let gateway = ProviderGateway::with_config(
        adapter_for(&server),
        Arc::new(NoopUsageSink),
        GatewayConfig {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(0),
        },
    );

    let err = gateway.chat(request()).await.unwrap_err();
    assert_eq!(err.http_status(), Some(503));

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);
}
