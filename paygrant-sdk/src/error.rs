//! Error types for the payments SDK

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// API Error Types
// ============================================================================

/// Error body returned by authorization and resource servers
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

/// Error details
///
/// Authorization servers answer with GNAP error codes (`request_denied`,
/// `too_fast`, ...); resource servers use the same shape with their own codes.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ApiError {
    fn message(&self) -> String {
        match &self.description {
            Some(description) if !self.code.is_empty() => {
                format!("{}: {}", self.code, description)
            }
            Some(description) => description.clone(),
            None => self.code.clone(),
        }
    }
}

// ============================================================================
// SDK Error Types
// ============================================================================

/// Errors that can occur when talking to wallet address, grant or resource servers
#[derive(Debug, Error)]
pub enum OpenPaymentsError {
    /// The request was not authenticated (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The token does not cover the request (HTTP 403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The authorization server refused the grant (`request_denied`, `user_denied`)
    #[error("Grant denied: {0}")]
    Denied(String),

    /// A continuation was attempted before the server-declared wait elapsed
    #[error("Polled too fast: {0}")]
    TooFast(String),

    /// Resource not found (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (bad parameters, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Server overloaded, rate limited or failing (HTTP 429, 5xx)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Invalid response (failed to parse API response)
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key loading or request signing failed
    #[error("Signature error: {0}")]
    Signature(String),

    /// Configuration error (missing key, bad URL, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl OpenPaymentsError {
    /// Returns true if this error is retryable
    ///
    /// Retryable errors are overload/5xx answers and transport failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OpenPaymentsError::ServiceUnavailable(_) | OpenPaymentsError::Network(_)
        )
    }

    /// HTTP status this error was classified from, when there is one
    pub fn status(&self) -> Option<u16> {
        match self {
            OpenPaymentsError::Unauthorized(_) => Some(401),
            OpenPaymentsError::Forbidden(_) => Some(403),
            OpenPaymentsError::NotFound(_) => Some(404),
            _ => None,
        }
    }

    /// Returns true if this error is retryable based on HTTP status code
    pub fn is_retryable_status(status_code: u16) -> bool {
        matches!(status_code, 408 | 429 | 500..=599)
    }

    /// Classify an API error response into an appropriate error variant
    pub fn from_api_error(error: &ApiError, status_code: u16) -> Self {
        let msg = error.message();

        match (status_code, error.code.as_str()) {
            (_, "request_denied") | (_, "user_denied") => OpenPaymentsError::Denied(msg),
            (_, "too_fast") => OpenPaymentsError::TooFast(msg),
            (401, _) => OpenPaymentsError::Unauthorized(msg),
            (403, _) => OpenPaymentsError::Forbidden(msg),
            (404, _) => OpenPaymentsError::NotFound(msg),
            (400, _) | (422, _) | (_, "invalid_request") => OpenPaymentsError::InvalidRequest(msg),
            (408, _) | (429, _) | (500..=599, _) => OpenPaymentsError::ServiceUnavailable(msg),
            _ => OpenPaymentsError::Other(msg),
        }
    }

    /// Classify a bare HTTP status (no parseable error body)
    pub fn from_status(status_code: u16, msg: String) -> Self {
        match status_code {
            401 => OpenPaymentsError::Unauthorized(msg),
            403 => OpenPaymentsError::Forbidden(msg),
            404 => OpenPaymentsError::NotFound(msg),
            400 | 422 => OpenPaymentsError::InvalidRequest(msg),
            408 | 429 | 500..=599 => OpenPaymentsError::ServiceUnavailable(msg),
            _ => OpenPaymentsError::Other(msg),
        }
    }

    /// Classify an HTTP error into an appropriate error variant
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OpenPaymentsError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            OpenPaymentsError::Network(format!("Connection failed: {}", err))
        } else if err.is_request() {
            OpenPaymentsError::Network(format!("Request failed: {}", err))
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            OpenPaymentsError::Other(err.to_string())
        }
    }
}

/// Configuration for automatic retry of idempotent requests
///
/// - Exponential backoff: base_delay × 2^attempt with jitter
/// - Maximum delay capped at `max_delay`
/// - Only `GET` requests are retried; creating calls never are
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    pub max_retries: u32,

    /// Base delay for exponential backoff (default: 500ms)
    pub base_delay: Duration,

    /// Maximum delay between retries (default: 8s)
    pub max_delay: Duration,

    /// Jitter factor (0.0-1.0) to add randomness to delays (default: 0.25)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the specified max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Disable retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given retry attempt (0-indexed)
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base = self.base_delay.as_secs_f64() * 2_f64.powi(attempt as i32);

        let jitter_range = base * self.jitter;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let delay_secs = (base + jitter).max(0.0);

        Duration::from_secs_f64(delay_secs).min(self.max_delay)
    }
}
