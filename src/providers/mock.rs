/*!
 * Mock provider implementations for testing.
 *
 * `ScriptedProvider` plays back a fixed queue of results and records every
 * call it receives, which is enough to script the §-style scheduler
 * scenarios: per-status failures, credential rotation, retries, and
 * resume behavior.
 */

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::ErrorKind;

use super::{ProviderClient, ProviderResult};

/// One recorded call: the source text dispatched and the key used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub source_text: String,
    pub api_key: String,
}

/// Plays back a queue of scripted results, then falls back to echoing
#[derive(Debug)]
pub struct ScriptedProvider {
    script: Mutex<Vec<ProviderResult>>,
    /// Played once the script runs dry; `None` means echo the input
    fallback: Option<ProviderResult>,
    calls: Mutex<Vec<RecordedCall>>,
    requires_credentials: bool,
    delay: Duration,
}

impl ScriptedProvider {
    /// Provider that always succeeds, echoing a marked translation
    pub fn working() -> Self {
        Self::with_script(Vec::new())
    }

    /// Provider that plays `script` front to back, echoing afterwards
    pub fn with_script(script: Vec<ProviderResult>) -> Self {
        Self {
            script: Mutex::new(script),
            fallback: None,
            calls: Mutex::new(Vec::new()),
            requires_credentials: true,
            delay: Duration::ZERO,
        }
    }

    /// Provider that answers every call the same way
    pub fn always(result: ProviderResult) -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            fallback: Some(result),
            calls: Mutex::new(Vec::new()),
            requires_credentials: true,
            delay: Duration::ZERO,
        }
    }

    /// Sleep this long before answering, to exercise in-flight behavior
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Pretend to be a web backend (no credential consumption)
    pub fn without_credentials(mut self) -> Self {
        self.requires_credentials = false;
        self
    }

    /// Calls observed so far, in dispatch order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls observed so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn translate(
        &self,
        source_text: &str,
        _prompt_template: &str,
        _model: &str,
        api_key: &str,
        _timeout: Duration,
    ) -> ProviderResult {
        self.calls.lock().push(RecordedCall {
            source_text: source_text.to_string(),
            api_key: api_key.to_string(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut script = self.script.lock();
        if !script.is_empty() {
            script.remove(0)
        } else if let Some(fallback) = &self.fallback {
            fallback.clone()
        } else {
            ProviderResult::ok(format!("[TRANSLATED] {}", source_text))
        }
    }

    fn requires_credentials(&self) -> bool {
        self.requires_credentials
    }

    fn name(&self) -> String {
        "scripted (mock)".to_string()
    }
}

/// Shorthand constructors for scripted results
pub fn ok(text: &str) -> ProviderResult {
    ProviderResult::ok(text)
}

pub fn auth_rejected() -> ProviderResult {
    ProviderResult::http_failure(ErrorKind::Auth, 403, "invalid api key")
}

pub fn rate_limited() -> ProviderResult {
    ProviderResult::http_failure(ErrorKind::RateLimited, 429, "slow down")
}

pub fn timed_out() -> ProviderResult {
    ProviderResult::failure(ErrorKind::Timeout)
}

pub fn provider_error(status: u16) -> ProviderResult {
    ProviderResult::http_failure(ErrorKind::Provider, status, "upstream error")
}
