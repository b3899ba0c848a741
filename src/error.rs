//! Error types for the LLM Relay SDK
//!
//! Every failure the crate can surface is a variant of [`Error`]. Two
//! classification predicates drive the retry machinery:
//!
//! - [`Error::retryable_within_provider`]: whether a *single adapter* should
//!   retry the request against the same endpoint (rate limits, 5xx,
//!   transport). Auth failures are stable for one API key and are not retried
//!   here.
//! - [`Error::fails_over`]: whether a *provider chain* should move on to the
//!   next provider. This is deliberately broader: each chain member carries
//!   its own credentials and endpoint, so auth and rate-limit failures on one
//!   provider are recoverable by switching to another.
//!
//! Request-shaped failures (`InvalidRequest`, `Parse`) are terminal in both
//! policies: a malformed request stays malformed no matter who receives it.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the SDK
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (unknown alias, empty chain, duplicate
    /// registration, missing factory)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Auto-detection found no usable provider in the environment
    #[error("no AI provider available: {0}")]
    NoProviderAvailable(String),

    /// Authentication rejected by the provider (401/403)
    #[error("{provider}: authentication failed: {message}")]
    Auth { provider: String, message: String },

    /// Provider rate limit hit (429), with any retry hint the provider sent
    #[error("{provider}: rate limited: {message}")]
    RateLimited {
        provider: String,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Transient provider-side failure (5xx or transport-level)
    #[error("{provider}: service unavailable: {message}")]
    ServiceUnavailable { provider: String, message: String },

    /// Request rejected as malformed (400, content policy, bad parameter)
    #[error("{provider}: invalid request (status {status}): {message}")]
    InvalidRequest {
        provider: String,
        status: u16,
        message: String,
    },

    /// Provider returned 2xx but the body could not be interpreted
    #[error("{provider}: failed to parse response: {message}")]
    Parse { provider: String, message: String },

    /// Unexpected upstream status outside the classified ranges
    #[error("{provider}: upstream error (status {status}): {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    /// Every provider in a chain failed
    #[error("all providers failed (tried {})", .attempted.join(", "))]
    ChainExhausted {
        attempted: Vec<String>,
        #[source]
        last: Box<Error>,
    },

    /// Streaming aborted after at least one chunk was delivered.
    ///
    /// This is the partial-completion sentinel: the caller already received
    /// `partial` and a chain must not fail over, since a different provider
    /// cannot coherently continue the output.
    #[error("{provider}: stream interrupted after {chunks} chunk(s): {message}")]
    StreamInterrupted {
        provider: String,
        chunks: usize,
        partial: String,
        message: String,
    },

    /// Streaming error before any chunk was delivered
    #[error("Streaming error: {0}")]
    Stream(String),

    /// A downstream tool call failed terminally
    #[error("tool '{tool}' failed: {message}")]
    ToolCall { tool: String, message: String },

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new auth error
    pub fn auth(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Auth {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a new rate-limit error without a retry hint
    pub fn rate_limited(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::RateLimited {
            provider: provider.into(),
            message: msg.into(),
            retry_after: None,
        }
    }

    /// Create a new transient service error
    pub fn service_unavailable(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::ServiceUnavailable {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a new invalid-request error
    pub fn invalid_request(
        provider: impl Into<String>,
        status: u16,
        msg: impl Into<String>,
    ) -> Self {
        Error::InvalidRequest {
            provider: provider.into(),
            status,
            message: msg.into(),
        }
    }

    /// Create a new parse error
    pub fn parse(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Parse {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool-call error
    pub fn tool_call(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::ToolCall {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// Should a single adapter retry this against the same endpoint?
    ///
    /// True for rate limits, transient 5xx failures, transport errors, and
    /// timeouts. Auth failures are stable under one API key and return false.
    pub fn retryable_within_provider(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::ServiceUnavailable { .. } => true,
            Error::Timeout => true,
            Error::Http(e) => !e.is_builder(),
            _ => false,
        }
    }

    /// Should a provider chain move on to its next member?
    ///
    /// Broader than [`Self::retryable_within_provider`]: the next chain
    /// member has its own credentials and endpoint, so auth failures and
    /// rate limits are recoverable by switching providers. Request-shaped
    /// failures are not: a bad request stays bad everywhere.
    pub fn fails_over(&self) -> bool {
        match self {
            Error::Auth { .. } => true,
            Error::RateLimited { .. } => true,
            Error::ServiceUnavailable { .. } => true,
            Error::Upstream { .. } => true,
            Error::Timeout => true,
            Error::Http(_) => true,
            Error::Stream(_) => true,
            Error::InvalidRequest { .. } => false,
            Error::Parse { .. } => false,
            Error::StreamInterrupted { .. } => false,
            _ => false,
        }
    }

    /// Retry hint attached to a rate-limit error, if the provider sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("unknown provider alias");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(
            err.to_string(),
            "Invalid configuration: unknown provider alias"
        );
    }

    #[test]
    fn test_error_auth_display() {
        let err = Error::auth("openai", "invalid api key");
        assert_eq!(
            err.to_string(),
            "openai: authentication failed: invalid api key"
        );
    }

    #[test]
    fn test_auth_not_retryable_within_provider() {
        let err = Error::auth("openai", "invalid api key");
        assert!(!err.retryable_within_provider());
        assert!(err.fails_over());
    }

    #[test]
    fn test_rate_limit_retryable_everywhere() {
        let err = Error::rate_limited("openai", "try later");
        assert!(err.retryable_within_provider());
        assert!(err.fails_over());
    }

    #[test]
    fn test_invalid_request_terminal() {
        let err = Error::invalid_request("openai", 400, "bad prompt");
        assert!(!err.retryable_within_provider());
        assert!(!err.fails_over());
    }

    #[test]
    fn test_parse_terminal() {
        let err = Error::parse("gemini", "missing candidates");
        assert!(!err.retryable_within_provider());
        assert!(!err.fails_over());
    }

    #[test]
    fn test_service_unavailable_retryable() {
        let err = Error::service_unavailable("anthropic", "overloaded");
        assert!(err.retryable_within_provider());
        assert!(err.fails_over());
    }

    #[test]
    fn test_partial_completion_never_fails_over() {
        let err = Error::StreamInterrupted {
            provider: "openai".to_string(),
            chunks: 2,
            partial: "Hel".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(!err.fails_over());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = Error::RateLimited {
            provider: "openai".to_string(),
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(Error::timeout().retry_after(), None);
    }

    #[test]
    fn test_chain_exhausted_lists_aliases() {
        let err = Error::ChainExhausted {
            attempted: vec!["openai".to_string(), "anthropic".to_string()],
            last: Box::new(Error::auth("anthropic", "bad key")),
        };
        let msg = err.to_string();
        assert!(msg.contains("openai"));
        assert!(msg.contains("anthropic"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
