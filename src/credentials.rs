/*!
 * Credential pool with rotation and quarantine.
 *
 * A provider may be configured with several API keys. The pool hands out a
 * uniformly random usable key per call and permanently quarantines keys
 * that fail in a disqualifying way, so one revoked or throttled key never
 * stalls a whole run.
 */

use chrono::{DateTime, Local};
use log::warn;
use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;

/// Every credential for the provider is quarantined, or none were configured.
/// Fatal for the provider until the operator intervenes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no credentials available")]
pub struct NoCredentialsAvailable;

/// Outcome of one use of a credential, as classified by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOutcome {
    /// The call succeeded. Does NOT reset the failure count: a key that
    /// failed once is not cleared mid-run.
    Success,
    /// The provider rejected the key (401/403)
    AuthFailure,
    /// The provider throttled the key (429)
    RateLimitFailure,
}

/// One secret value with its failure bookkeeping. Owned exclusively by the pool.
struct Credential {
    value: String,
    failure_count: u32,
    quarantined: bool,
    last_failure_at: Option<DateTime<Local>>,
}

/// Point-in-time view of one credential, safe to log and display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    /// Redacted key prefix, never the full secret
    pub prefix: String,
    pub failure_count: u32,
    pub quarantined: bool,
}

/// Handle to an acquired credential. Carries the secret for the duration of
/// one call plus the slot index used to report the outcome back.
#[derive(Debug, Clone)]
pub struct CredentialHandle {
    slot: usize,
    value: String,
}

impl CredentialHandle {
    /// The secret value, exposed only for composing the provider call
    pub fn secret(&self) -> &str {
        &self.value
    }

    /// Redacted form for logs
    pub fn redacted(&self) -> String {
        redact(&self.value)
    }
}

fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(8).collect();
    format!("{}...", prefix)
}

/// Thread-safe pool of credentials for one provider
pub struct CredentialPool {
    inner: Mutex<Vec<Credential>>,
    /// Auth failures tolerated before quarantine (first occurrence by default)
    auth_quarantine_after: u32,
    /// Rate-limit failures tolerated before quarantine
    rate_limit_quarantine_after: u32,
}

impl CredentialPool {
    /// Create a pool with the default thresholds: quarantine on the first
    /// auth failure and on the first rate-limit failure.
    pub fn new(keys: Vec<String>) -> Self {
        Self::with_thresholds(keys, 1, 1)
    }

    /// Create a pool with explicit quarantine thresholds
    pub fn with_thresholds(
        keys: Vec<String>,
        auth_quarantine_after: u32,
        rate_limit_quarantine_after: u32,
    ) -> Self {
        let credentials = keys
            .into_iter()
            .map(|value| Credential {
                value,
                failure_count: 0,
                quarantined: false,
                last_failure_at: None,
            })
            .collect();
        Self {
            inner: Mutex::new(credentials),
            auth_quarantine_after: auth_quarantine_after.max(1),
            rate_limit_quarantine_after: rate_limit_quarantine_after.max(1),
        }
    }

    /// Pick a uniformly random non-quarantined credential
    pub fn acquire(&self) -> Result<CredentialHandle, NoCredentialsAvailable> {
        let inner = self.inner.lock();
        let usable: Vec<usize> = inner
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.quarantined)
            .map(|(i, _)| i)
            .collect();
        if usable.is_empty() {
            return Err(NoCredentialsAvailable);
        }
        let slot = usable[rand::rng().random_range(0..usable.len())];
        Ok(CredentialHandle {
            slot,
            value: inner[slot].value.clone(),
        })
    }

    /// Record the outcome of one use. Disqualifying failures bump the
    /// failure count and, past the configured threshold, quarantine the key
    /// for the remainder of the run.
    pub fn report_outcome(&self, handle: &CredentialHandle, outcome: CredentialOutcome) {
        let mut inner = self.inner.lock();
        let Some(credential) = inner.get_mut(handle.slot) else {
            return;
        };

        let threshold = match outcome {
            CredentialOutcome::Success => return,
            CredentialOutcome::AuthFailure => self.auth_quarantine_after,
            CredentialOutcome::RateLimitFailure => self.rate_limit_quarantine_after,
        };

        credential.failure_count += 1;
        credential.last_failure_at = Some(Local::now());

        if !credential.quarantined && credential.failure_count >= threshold {
            credential.quarantined = true;
            let reason = match outcome {
                CredentialOutcome::AuthFailure => "authentication rejected",
                CredentialOutcome::RateLimitFailure => "rate limited",
                CredentialOutcome::Success => unreachable!(),
            };
            warn!(
                "Credential {} quarantined after {} failure(s): {}",
                redact(&credential.value),
                credential.failure_count,
                reason
            );
        }
    }

    /// Number of credentials still usable
    pub fn available(&self) -> usize {
        self.inner.lock().iter().filter(|c| !c.quarantined).count()
    }

    /// Total number of credentials, quarantined included
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when no credentials were configured at all
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Redacted status of every credential, for operator reporting
    pub fn snapshot(&self) -> Vec<CredentialStatus> {
        self.inner
            .lock()
            .iter()
            .map(|c| CredentialStatus {
                prefix: redact(&c.value),
                failure_count: c.failure_count,
                quarantined: c.quarantined,
            })
            .collect()
    }

    /// Most recent failure time across the pool, if any
    pub fn last_failure_at(&self) -> Option<DateTime<Local>> {
        self.inner.lock().iter().filter_map(|c| c.last_failure_at).max()
    }
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets never reach Debug output
        f.debug_struct("CredentialPool")
            .field("credentials", &self.snapshot())
            .finish()
    }
}
