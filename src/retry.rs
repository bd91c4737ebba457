/*!
 * Retry policy for failed provider calls.
 *
 * A pure decision table: given the classified failure and the number of
 * attempts already made for the record, it says whether to retry with the
 * same credential (and after what delay), rotate to a fresh credential, or
 * give the record up. The scheduler owns the side effects.
 */

use std::time::Duration;

use crate::errors::{AbortReason, ErrorKind};

/// Decision for the next step of a record after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Try again with the same credential after the given delay
    RetrySame { delay: Duration },
    /// Rotate to a different credential and try again immediately
    RetryNew,
    /// Stop working on the record and mark it failed
    Abort(AbortReason),
}

/// Retry policy parameters, normally derived from the common translation config
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts allowed for transient failures (timeouts, UI state)
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub backoff_base: Duration,
    /// Upper bound on any single backoff delay
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration, backoff_cap: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            backoff_cap,
        }
    }

    /// Decide the next step after a failure. `attempts_made` counts the
    /// attempts already spent on the record, so it is at least 1 here.
    pub fn decide(&self, kind: ErrorKind, attempts_made: u32) -> Decision {
        match kind {
            // A rejected credential is unusable for the rest of the run.
            // One rotation is allowed; a second rejection means the request
            // itself is the problem, not the key.
            ErrorKind::Auth => {
                if attempts_made <= 1 {
                    Decision::RetryNew
                } else {
                    Decision::Abort(AbortReason::MaxRetriesExceeded)
                }
            }

            // Throttling is a property of the key, not the request. Rotation
            // is bounded by the pool quarantining throttled keys.
            ErrorKind::RateLimited => Decision::RetryNew,

            // Transient: same credential, exponential backoff, bounded attempts
            ErrorKind::Timeout | ErrorKind::UiState => {
                if attempts_made < self.max_attempts {
                    Decision::RetrySame {
                        delay: self.backoff(attempts_made),
                    }
                } else {
                    Decision::Abort(AbortReason::MaxRetriesExceeded)
                }
            }

            // The provider rejected the request itself: one more try, then done
            ErrorKind::Provider => {
                if attempts_made <= 1 {
                    Decision::RetrySame {
                        delay: self.backoff_base.min(self.backoff_cap),
                    }
                } else {
                    Decision::Abort(AbortReason::ProviderRejected)
                }
            }
        }
    }

    /// Backoff for the next attempt: base × 2^(attempts_made − 1), capped
    pub fn backoff(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(16);
        let delay = self.backoff_base.saturating_mul(1u32 << exponent);
        delay.min(self.backoff_cap)
    }
}
