/*!
 * Error types for the aibridge application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Retry-relevant classification of a failed provider call.
///
/// Every backend, whether a direct network API or a driven web session,
/// reports failures through this taxonomy so the retry policy and the
/// credential pool never need to know which backend produced them.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// The provider rejected the credential (HTTP 401/403 or equivalent)
    #[error("authentication rejected")]
    Auth,

    /// The provider throttled the request (HTTP 429 or equivalent)
    #[error("rate limited")]
    RateLimited,

    /// The call did not complete within its deadline
    #[error("timed out")]
    Timeout,

    /// A driven session could not reach the expected on-screen state
    #[error("unexpected UI state")]
    UiState,

    /// Any other provider-side failure (5xx, malformed response, error banner)
    #[error("provider error")]
    Provider,
}

/// Terminal reason a record was given up on after the retry policy ran out.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Every credential for the provider is quarantined or none were configured
    #[error("no credentials available")]
    NoCredentialsAvailable,

    /// The configured retry budget was spent
    #[error("max retries exceeded")]
    MaxRetriesExceeded,

    /// The provider kept rejecting the request itself
    #[error("rejected by provider")]
    ProviderRejected,
}

/// Errors that can occur while reading or writing tabular datasets.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The input dataset is unusable (missing column, duplicate id, bad
    /// encoding). Fatal at job start.
    #[error("input format error: {0}")]
    InputFormat(String),

    /// An existing output dataset could not be read for resume.
    /// Degrades to a warning and a fresh run, never fatal.
    #[error("existing output unreadable: {0}")]
    ResumeCorruption(String),

    /// Unsupported file extension for a dataset path
    #[error("unsupported dataset format: {0}")]
    UnsupportedFormat(String),

    /// Error from a file operation
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the screen driver backing a web-automation session.
#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("input synthesis failed: {0}")]
    Input(String),

    #[error("clipboard access failed: {0}")]
    Clipboard(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a dataset operation
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Error from the screen driver
    #[error("screen error: {0}")]
    Screen(#[from] ScreenError),

    /// A run could not be started or ended abnormally
    #[error("job error: {0}")]
    Job(String),

    /// Any other error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::Dataset(DatasetError::Io(error))
    }
}
