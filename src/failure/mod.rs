//! Provider failure classification.
//!
//! Maps a provider-call error to a [`GatewayFailure`] descriptor that drives
//! retry/failover decisions and tells the external circuit breaker whether
//! the error counts toward its failure rate. The same classifier is used by
//! the live gateway and the offline eval runner so both apply identical
//! failure semantics.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by a provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider returned an error response
    #[error("provider error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the provider
        message: String,
        /// Error type reported by the provider, if any
        error_type: Option<String>,
    },

    /// Rate limit exceeded
    #[error("rate limited by provider")]
    RateLimited {
        /// Retry after duration
        retry_after: Option<Duration>,
    },

    /// Request timed out
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Network-level failure (connect, DNS, TLS, broken stream)
    #[error("network error: {0}")]
    Network(String),

    /// Requested model does not exist at the provider (routing/config mismatch)
    #[error("model not available: {model}")]
    ModelNotFound {
        /// Model name as sent to the provider
        model: String,
    },

    /// Anything that does not fit the taxonomy above
    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Get retry delay if the provider suggested one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status code, if the error carries one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            ProviderError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

/// Stable error code recorded in request logs and exposed to dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    ClientError,
    RateLimited,
    Timeout,
    Upstream,
    ModelNotFound,
    Unknown,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::ClientError => "CLIENT_ERROR",
            FailureCode::RateLimited => "RATE_LIMITED",
            FailureCode::Timeout => "TIMEOUT",
            FailureCode::Upstream => "UPSTREAM_ERROR",
            FailureCode::ModelNotFound => "MODEL_NOT_FOUND",
            FailureCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single provider failure.
///
/// `counted_as_failure` maps directly to "should the circuit breaker count
/// this toward its failure rate"; `failover_eligible` to "is trying a
/// secondary provider worthwhile".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayFailure {
    pub error_code: FailureCode,
    pub counted_as_failure: bool,
    pub failover_eligible: bool,
}

impl GatewayFailure {
    const fn new(error_code: FailureCode, counted_as_failure: bool, failover_eligible: bool) -> Self {
        Self {
            error_code,
            counted_as_failure,
            failover_eligible,
        }
    }

    /// Whether the external circuit breaker should ignore this error.
    pub fn breaker_ignores(&self) -> bool {
        !self.counted_as_failure
    }
}

/// Classify a provider-call error.
///
/// Ordinary client errors recur identically on retry, so they neither count
/// toward the breaker nor justify a fallback provider. Rate limits, timeouts,
/// and upstream/network outages are genuine infra degradation: counted and
/// failover-eligible. A model-not-found is a config mismatch, not an infra
/// failure: failover-eligible but uncounted. Unrecognized errors count but do
/// not fail over (fail-safe toward opening the breaker).
pub fn classify_provider(error: &ProviderError) -> GatewayFailure {
    match error {
        ProviderError::RateLimited { .. } => {
            GatewayFailure::new(FailureCode::RateLimited, true, true)
        }
        ProviderError::Timeout(_) => GatewayFailure::new(FailureCode::Timeout, true, true),
        ProviderError::Network(_) => GatewayFailure::new(FailureCode::Upstream, true, true),
        ProviderError::ModelNotFound { .. } => {
            GatewayFailure::new(FailureCode::ModelNotFound, false, true)
        }
        ProviderError::Api { status, .. } => match status {
            429 => GatewayFailure::new(FailureCode::RateLimited, true, true),
            500..=599 => GatewayFailure::new(FailureCode::Upstream, true, true),
            400..=499 => GatewayFailure::new(FailureCode::ClientError, false, false),
            _ => GatewayFailure::new(FailureCode::Unknown, true, false),
        },
        ProviderError::Other(_) => GatewayFailure::new(FailureCode::Unknown, true, false),
    }
}
