/*!
 * Direct network API clients.
 *
 * All five provider APIs are the same shape from the scheduler's point of
 * view: compose a JSON payload, authenticate, POST, pull the generated
 * text out of the response. They differ only in endpoint path, where the
 * credential goes (bearer header, custom header, query parameter), payload
 * layout, and the extraction path. One client generalizes over a
 * per-provider `ApiShape` instead of five near-identical clients.
 *
 * Status classification is shared: 2xx success, 401/403 credential-level,
 * 429 throttled, request timeout transient, anything else provider error.
 */

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use crate::app_config::{GenerationParams, ProviderKind};
use crate::errors::ErrorKind;
use crate::job::prompts;

use super::{ProviderClient, ProviderResult};

/// Where the API key is placed on the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthPlacement {
    /// `Authorization: Bearer <key>`
    BearerHeader,
    /// `x-api-key: <key>` plus the API version header
    AnthropicHeaders,
    /// `?key=<key>` query parameter
    QueryParam,
}

/// Per-provider wire format description
#[derive(Debug, Clone, Copy)]
struct ApiShape {
    kind: ProviderKind,
    auth: AuthPlacement,
}

impl ApiShape {
    fn for_kind(kind: ProviderKind) -> Self {
        let auth = match kind {
            ProviderKind::Gemini => AuthPlacement::QueryParam,
            ProviderKind::Claude => AuthPlacement::AnthropicHeaders,
            ProviderKind::OpenAi | ProviderKind::Grok | ProviderKind::Perplexity => {
                AuthPlacement::BearerHeader
            }
        };
        Self { kind, auth }
    }

    /// Request URL for the given endpoint/model; the key lands here only
    /// for query-authenticated providers
    fn url(&self, endpoint: &str, model: &str, api_key: &str) -> String {
        let base = endpoint.trim_end_matches('/');
        match self.kind {
            ProviderKind::Gemini => format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                base, model, api_key
            ),
            ProviderKind::Claude => format!("{}/v1/messages", base),
            ProviderKind::OpenAi | ProviderKind::Grok | ProviderKind::Perplexity => {
                format!("{}/v1/chat/completions", base)
            }
        }
    }

    /// JSON payload for one prompt
    fn payload(&self, model: &str, prompt: &str, params: &GenerationParams) -> Value {
        match self.kind {
            ProviderKind::Gemini => json!({
                "contents": [{
                    "parts": [{"text": prompt}]
                }],
                "generationConfig": {
                    "temperature": params.temperature,
                    "maxOutputTokens": params.max_tokens,
                    "topP": params.top_p,
                }
            }),
            // Claude and the OpenAI-compatible providers share the
            // messages layout
            _ => json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
            }),
        }
    }

    fn authorize(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        match self.auth {
            AuthPlacement::BearerHeader => request.bearer_auth(api_key),
            AuthPlacement::AnthropicHeaders => request
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01"),
            // Already part of the URL
            AuthPlacement::QueryParam => request,
        }
    }

    /// Pull the generated text out of a 2xx response body
    fn extract_text(&self, body: &Value) -> Option<String> {
        let text = match self.kind {
            ProviderKind::Gemini => body
                .get("candidates")?
                .get(0)?
                .get("content")?
                .get("parts")?
                .get(0)?
                .get("text")?,
            ProviderKind::Claude => body.get("content")?.get(0)?.get("text")?,
            ProviderKind::OpenAi | ProviderKind::Grok | ProviderKind::Perplexity => body
                .get("choices")?
                .get(0)?
                .get("message")?
                .get("content")?,
        };
        text.as_str().map(|s| s.to_string())
    }
}

/// Synchronous request/response client against a provider's network endpoint
#[derive(Debug)]
pub struct DirectApiClient {
    client: Client,
    shape: ApiShape,
    endpoint: String,
    params: GenerationParams,
}

impl DirectApiClient {
    pub fn new(kind: ProviderKind, endpoint: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            client: Client::builder()
                .build()
                .unwrap_or_default(),
            shape: ApiShape::for_kind(kind),
            endpoint: endpoint.into(),
            params,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.shape.kind
    }
}

#[async_trait]
impl ProviderClient for DirectApiClient {
    async fn translate(
        &self,
        source_text: &str,
        prompt_template: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> ProviderResult {
        let prompt = prompts::render(prompt_template, source_text);
        let url = self.shape.url(&self.endpoint, model, api_key);
        let payload = self.shape.payload(model, &prompt, &self.params);

        debug!(
            "Calling {} API with model {}",
            self.shape.kind.display_name(),
            model
        );

        let request = self
            .shape
            .authorize(self.client.post(&url), api_key)
            .timeout(timeout)
            .json(&payload);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ProviderResult::failure_with(
                    ErrorKind::Timeout,
                    format!("no response within {:?}", timeout),
                );
            }
            Err(e) => {
                return ProviderResult::failure_with(ErrorKind::Provider, e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = truncate(&body, 200);
            let kind = match status.as_u16() {
                401 | 403 => ErrorKind::Auth,
                429 => ErrorKind::RateLimited,
                _ => ErrorKind::Provider,
            };
            return ProviderResult::http_failure(kind, status.as_u16(), detail);
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return ProviderResult::http_failure(
                    ErrorKind::Provider,
                    status.as_u16(),
                    format!("unparseable response: {}", e),
                );
            }
        };

        match self.shape.extract_text(&body) {
            Some(text) => ProviderResult::ok(text),
            None => ProviderResult::http_failure(
                ErrorKind::Provider,
                status.as_u16(),
                "no generated text in response",
            ),
        }
    }

    fn name(&self) -> String {
        format!("{} (api)", self.shape.kind.display_name())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect()
    } else {
        text.to_string()
    }
}
