//! Error taxonomy for fetch cycles.
//!

use thiserror::Error;

/// Custom error type for fetch cycles, allows the poller to differentiate
/// between transport trouble, refusal and garbage answers.  All three are
/// recoverable, the poller retries with backoff.
///
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection failure or timeout
    #[error("Unreachable: {0}")]
    Unreachable(String),
    /// Non-2xx answer from the upstream
    #[error("Rejected: HTTP {status} — {body}")]
    Rejected { status: u16, body: String },
    /// Answer did not match the expected schema
    #[error("Malformed answer: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    /// Transport-level classification.  Decode failures are `Malformed`,
    /// everything else that reqwest can raise on `send()` is `Unreachable`.
    ///
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Unreachable(e.to_string())
        }
    }
}
