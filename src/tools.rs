//! Wire envelopes returned by downstream tools.
//!
//! Tools speak a structured envelope distinct from LLM provider errors:
//!
//! ```json
//! {
//!   "success": false,
//!   "error": {
//!     "code": "LOCATION_NOT_FOUND",
//!     "message": "Flower Mound, TX",
//!     "category": "VALIDATION",
//!     "retryable": true,
//!     "details": {}
//!   }
//! }
//! ```
//!
//! The intelligent-retry loop in [`crate::agent`] keys off `category` and
//! `retryable` to decide between resending, asking the AI for a corrected
//! payload, and giving up. Legacy tools that return plain JSON without a
//! `success` field are treated as successful responses with the whole body
//! as data.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Coarse failure classes a tool can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Validation,
    Auth,
    RateLimit,
    NotFound,
    ServiceError,
    /// Anything a newer tool version reports that this build does not know.
    #[serde(other)]
    Unknown,
}

impl Default for ErrorCategory {
    fn default() -> Self {
        ErrorCategory::Unknown
    }
}

/// Structured error reported by a downstream tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub category: ErrorCategory,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl ToolError {
    /// Retry delay hint from `details["retry_after"]` (seconds form).
    pub fn retry_after(&self) -> Option<Duration> {
        self.details
            .get("retry_after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Structured response envelope from a downstream tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

/// A tool body interpreted: either the structured envelope or a legacy plain
/// JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedToolBody {
    /// Structured envelope (`success` field present).
    Envelope(ToolResponse),
    /// Legacy body: plain JSON with no envelope; treated as success data.
    Legacy(serde_json::Value),
}

/// Interpret a tool response body, tolerating the legacy shape.
///
/// Unparseable bodies come back as `None`; the caller decides how hard to
/// fail based on the HTTP status it saw.
pub fn parse_tool_body(body: &str) -> Option<ParsedToolBody> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if value.get("success").is_some() {
        let envelope: ToolResponse = serde_json::from_value(value).ok()?;
        Some(ParsedToolBody::Envelope(envelope))
    } else {
        Some(ParsedToolBody::Legacy(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip() {
        let body = r#"{
            "success": false,
            "error": {
                "code": "LOCATION_NOT_FOUND",
                "message": "Flower Mound, TX",
                "category": "VALIDATION",
                "retryable": true,
                "details": {"hint": "use full state name"}
            }
        }"#;
        let parsed = parse_tool_body(body).unwrap();
        let ParsedToolBody::Envelope(envelope) = parsed else {
            panic!("expected envelope");
        };
        assert!(!envelope.success);
        let error = envelope.error.unwrap();
        assert_eq!(error.code, "LOCATION_NOT_FOUND");
        assert_eq!(error.category, ErrorCategory::Validation);
        assert!(error.retryable);
        assert_eq!(error.details["hint"], "use full state name");
    }

    #[test]
    fn test_legacy_body_is_success_data() {
        let parsed = parse_tool_body(r#"{"temperature": 21.5, "units": "C"}"#).unwrap();
        let ParsedToolBody::Legacy(value) = parsed else {
            panic!("expected legacy body");
        };
        assert_eq!(value["temperature"], 21.5);
    }

    #[test]
    fn test_unparseable_body() {
        assert_eq!(parse_tool_body("<html>502</html>"), None);
        assert_eq!(parse_tool_body(""), None);
    }

    #[test]
    fn test_unknown_category_tolerated() {
        let body = r#"{"success": false, "error": {"code": "X", "category": "QUOTA_EXCEEDED"}}"#;
        let ParsedToolBody::Envelope(envelope) = parse_tool_body(body).unwrap() else {
            panic!("expected envelope");
        };
        assert_eq!(envelope.error.unwrap().category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_retry_after_hint() {
        let mut details = HashMap::new();
        details.insert("retry_after".to_string(), "30".to_string());
        let error = ToolError {
            category: ErrorCategory::RateLimit,
            details,
            ..ToolError::default()
        };
        assert_eq!(error.retry_after(), Some(Duration::from_secs(30)));

        assert_eq!(ToolError::default().retry_after(), None);
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&ErrorCategory::RateLimit).unwrap();
        assert_eq!(json, r#""RATE_LIMIT""#);
        let back: ErrorCategory = serde_json::from_str(r#""SERVICE_ERROR""#).unwrap();
        assert_eq!(back, ErrorCategory::ServiceError);
    }
}
