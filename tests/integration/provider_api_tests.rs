/*!
 * Direct provider API tests against a local mock server.
 *
 * One classification table is shared by every provider shape: 2xx success,
 * 401/403 credential-level, 429 throttled, timeout transient, anything
 * else a provider error. Auth placement differs per provider and is
 * asserted through request matchers.
 */

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aibridge::app_config::{GenerationParams, ProviderKind};
use aibridge::errors::ErrorKind;
use aibridge::providers::direct::DirectApiClient;
use aibridge::providers::ProviderClient;

fn params() -> GenerationParams {
    GenerationParams {
        temperature: 1.0,
        top_p: 1.0,
        max_tokens: 256,
    }
}

async fn call(client: &DirectApiClient, key: &str) -> aibridge::ProviderResult {
    client
        .translate(
            "hello",
            "Translate: {text}",
            "test-model",
            key,
            Duration::from_secs(2),
        )
        .await
}

#[tokio::test]
async fn test_openai_shape_withBearerAuth_shouldExtractChoiceContent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "bonjour"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DirectApiClient::new(ProviderKind::OpenAi, server.uri(), params());
    let result = call(&client, "sk-test").await;
    assert_eq!(result.text.as_deref(), Some("bonjour"));
    assert_eq!(result.error, None);
}

#[tokio::test]
async fn test_claude_shape_withHeaderAuth_shouldSendVersionHeader() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "ck-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "xin chào"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DirectApiClient::new(ProviderKind::Claude, server.uri(), params());
    let result = call(&client, "ck-test").await;
    assert_eq!(result.text.as_deref(), Some("xin chào"));
}

#[tokio::test]
async fn test_gemini_shape_withQueryAuth_shouldCarryKeyInUrl() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/test-model:generateContent"))
        .and(query_param("key", "g-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "hola"}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DirectApiClient::new(ProviderKind::Gemini, server.uri(), params());
    let result = call(&client, "g-test").await;
    assert_eq!(result.text.as_deref(), Some("hola"));
}

#[tokio::test]
async fn test_status_classification_perRetryTaxonomy() {
    for (status, expected) in [
        (401u16, ErrorKind::Auth),
        (403, ErrorKind::Auth),
        (429, ErrorKind::RateLimited),
        (500, ErrorKind::Provider),
        (503, ErrorKind::Provider),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let client = DirectApiClient::new(ProviderKind::Grok, server.uri(), params());
        let result = call(&client, "k").await;
        assert_eq!(result.error, Some(expected), "status {}", status);
        assert_eq!(result.http_status, Some(status));
        assert_eq!(result.text, None);
    }
}

#[tokio::test]
async fn test_slow_response_shouldClassifyAsTimeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(json!({"choices": []})),
        )
        .mount(&server)
        .await;

    let client = DirectApiClient::new(ProviderKind::Perplexity, server.uri(), params());
    let result = client
        .translate(
            "hello",
            "Translate: {text}",
            "test-model",
            "k",
            Duration::from_millis(100),
        )
        .await;
    assert_eq!(result.error, Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn test_success_withUnexpectedShape_shouldClassifyAsProviderError() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let client = DirectApiClient::new(ProviderKind::OpenAi, server.uri(), params());
    let result = call(&client, "k").await;
    assert_eq!(result.error, Some(ErrorKind::Provider));
}
