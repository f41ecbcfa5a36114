use thiserror::Error;

/// Errors produced while fetching a time series from the upstream.
///
/// Time-series fetches fail closed: any of these reaches the caller instead of
/// an empty or partial series.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The upstream answered with a non-success status code.
    #[error("upstream returned HTTP {0}")]
    HttpStatus(u16),

    /// The connection could not be established or broke mid-flight.
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The body could not be decoded into the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else if err.is_decode() || err.is_body() {
            FetchError::InvalidResponse(err.to_string())
        } else {
            FetchError::NetworkUnreachable(err.to_string())
        }
    }
}

/// Errors produced by the credential lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Every fallback tier was attempted and none produced a usable token.
    #[error("no valid credential: every authentication tier failed")]
    NoValidCredential,

    /// The upstream refused the credential (typically 400/401/403).
    #[error("credential rejected by upstream (HTTP {status})")]
    RemoteRejected { status: u16 },

    /// The auth endpoint could not be reached.
    #[error("auth transport error: {0}")]
    Transport(#[from] FetchError),

    /// The auth endpoint answered 2xx but without the expected token field.
    #[error("invalid auth response: {0}")]
    InvalidResponse(String),
}
