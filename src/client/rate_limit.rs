//! Rate-limit metadata exposed by the service on every response.
//!
//! The service caps request rates and reports the remaining quota and reset
//! time in response headers. To avoid burning the last few requests of a
//! window (and eating an actual 429), a response whose remaining quota falls
//! below [`QUOTA_SAFETY_THRESHOLD`] is treated as a rate-limit condition even
//! though the call itself succeeded.

use reqwest::header::HeaderMap;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Below this many remaining requests, throttle proactively.
pub const QUOTA_SAFETY_THRESHOLD: u32 = 5;

/// Cool-down used when the service does not say when the window resets.
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit {
    pub remaining: Option<u32>,
    pub reset_seconds: Option<u64>,
}

impl RateLimit {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            remaining: parse_header(headers, REMAINING_HEADER),
            reset_seconds: parse_header(headers, RESET_HEADER),
        }
    }

    /// The cool-down to suggest on a rate-limit condition: the reset time if
    /// the service provided one, [`DEFAULT_COOLDOWN_SECONDS`] otherwise.
    pub fn suggested_delay(&self) -> u64 {
        self.reset_seconds.unwrap_or(DEFAULT_COOLDOWN_SECONDS)
    }

    /// `Some(delay)` when the remaining quota is low enough that the next
    /// request should not be made, `None` when it is safe to continue.
    pub fn throttle_delay(&self) -> Option<u64> {
        match self.remaining {
            Some(remaining) if remaining < QUOTA_SAFETY_THRESHOLD => Some(self.suggested_delay()),
            _ => None,
        }
    }
}

fn parse_header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
