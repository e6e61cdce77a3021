use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The service throttled us, either with an actual 429 or proactively
    /// because the remaining request quota dropped below the safety threshold.
    /// Carries the suggested cool-down so the retry policy can use it.
    #[error("Rate limited, retry suggested after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Transport-level timeout; retried with a flat cool-down.
    #[error("Transport timed out for {0}")]
    Timeout(String),

    #[error("Failed to construct HTTP client")]
    Build(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    Request(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response body from {0}")]
    Decode(String, #[source] reqwest::Error),

    #[error("Unexpected payload shape from {0}")]
    Payload(String, #[source] serde_json::Error),
}

impl ClientError {
    /// Whether the controller's escalation policy applies. Everything else
    /// crosses the chunk boundary and aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClientError::RateLimited { .. } | ClientError::Timeout(_)
        )
    }
}
