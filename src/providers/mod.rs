/*!
 * Provider implementations for different translation backends.
 *
 * This module contains client implementations for the supported providers
 * (Gemini, OpenAI, Claude, Grok, Perplexity), reachable two ways:
 * - `direct`: request/response against the provider's network API
 * - `automation`: a driven session against the provider's chat web UI
 *
 * Both families satisfy one contract so the scheduler and the retry policy
 * never depend on which family a call went through.
 */

use std::time::Duration;

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ErrorKind;

pub mod automation;
pub mod direct;
pub mod mock;

/// One failed provider call, classified for the retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    /// Human-readable detail for logs and the output `reason` column
    pub detail: Option<String>,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(status) = self.http_status {
            write!(f, " (HTTP {})", status)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

/// Result of one provider call. Produced per call and consumed immediately
/// by the retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResult {
    pub text: Option<String>,
    pub error: Option<ErrorKind>,
    pub http_status: Option<u16>,
    pub detail: Option<String>,
}

impl ProviderResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            error: None,
            http_status: None,
            detail: None,
        }
    }

    pub fn failure(kind: ErrorKind) -> Self {
        Self {
            text: None,
            error: Some(kind),
            http_status: None,
            detail: None,
        }
    }

    pub fn failure_with(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            text: None,
            error: Some(kind),
            http_status: None,
            detail: Some(detail.into()),
        }
    }

    pub fn http_failure(kind: ErrorKind, status: u16, detail: impl Into<String>) -> Self {
        Self {
            text: None,
            error: Some(kind),
            http_status: Some(status),
            detail: Some(detail.into()),
        }
    }

    /// Split into the success text or the classified failure
    pub fn into_outcome(self) -> Result<String, ProviderFailure> {
        match (self.text, self.error) {
            (Some(text), None) => Ok(text),
            (_, Some(kind)) => Err(ProviderFailure {
                kind,
                http_status: self.http_status,
                detail: self.detail,
            }),
            // A result with neither text nor error is a client bug; treat
            // it as a provider failure rather than panic mid-batch
            (None, None) => Err(ProviderFailure {
                kind: ErrorKind::Provider,
                http_status: self.http_status,
                detail: Some("empty provider result".to_string()),
            }),
        }
    }
}

/// Common trait for all translation backends
///
/// This trait defines the interface that all provider implementations must
/// follow, allowing them to be used interchangeably by the scheduler.
#[async_trait]
pub trait ProviderClient: Send + Sync + Debug {
    /// Translate one source text using the given instruction template.
    ///
    /// The template's `{text}` placeholder is filled with `source_text`
    /// before dispatch. `api_key` is empty for backends that do not
    /// authenticate per call.
    async fn translate(
        &self,
        source_text: &str,
        prompt_template: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> ProviderResult;

    /// Whether calls consume a credential from the pool.
    /// Web automation sessions authenticate through the already-open
    /// browser session, not per call.
    fn requires_credentials(&self) -> bool {
        true
    }

    /// Backend name for logs
    fn name(&self) -> String;
}
