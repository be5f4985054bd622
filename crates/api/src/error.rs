//! Block-explorer client errors.

/// Errors returned by the explorer client.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    /// Connection reset, timeout, TLS failure and similar.
    #[error("transport error: {0}")]
    Transport(String),

    /// Gateway-level HTTP failure (429 / 5xx).
    #[error("HTTP {status} from explorer")]
    Http { status: u16 },

    /// The explorer asked us to slow down ("Max rate limit reached").
    #[error("explorer rate limit reached")]
    RateLimited,

    /// Response body was not the expected JSON envelope.
    #[error("malformed explorer response: {0}")]
    Malformed(String),

    /// Records in a successful response did not match the expected schema.
    #[error("failed to decode explorer records: {0}")]
    Decode(String),

    /// Well-formed error response from the explorer API.
    #[error("explorer API error: {message} ({result})")]
    Api { message: String, result: String },

    /// Retry policy gave up or the caller cancelled.
    #[error("explorer request abandoned: {0}")]
    Abandoned(String),
}

impl ExplorerError {
    /// Whether the request should be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited | Self::Malformed(_) => true,
            Self::Http { status } => *status == 429 || *status >= 500,
            Self::Api { .. } | Self::Decode(_) | Self::Abandoned(_) => false,
        }
    }
}

impl From<reqwest::Error> for ExplorerError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Self::Http {
                status: status.as_u16(),
            };
        }
        if e.is_decode() {
            return Self::Malformed(e.to_string());
        }
        Self::Transport(e.to_string())
    }
}
