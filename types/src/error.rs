//! Structured error type shared by every pipeline stage.
//!
//! Errors are tagged records `{code, message, retryable, details}`. The code
//! registry is closed except for `Http(n)`, which covers every `HTTP_<n>`
//! status error.

use serde::Serialize;
use thiserror::Error;

/// Pipeline error with a stable code and retry hint.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FetchError {
    /// Stable error code.
    pub code: ErrorCode,

    /// Human-readable description.
    pub message: String,

    /// Whether re-issuing the same call may succeed.
    pub retryable: bool,

    /// Error-specific context.
    pub details: ErrorDetails,
}

impl FetchError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            retryable: code.default_retryable(),
            code,
            message: message.into(),
            details: ErrorDetails::default(),
        }
    }

    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Add a detail field.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.0.push((key.into(), value.into()));
        self
    }

    /// Serialize to the JSON shape used by the tool surface.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "code": self.code.as_code(),
            "message": self.message,
            "retryable": self.retryable,
        });

        if !self.details.0.is_empty() {
            let details: serde_json::Map<String, serde_json::Value> = self
                .details
                .0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            obj["details"] = serde_json::Value::Object(details);
        }

        serde_json::json!({ "error": obj })
    }
}

impl Serialize for FetchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

/// Error details as ordered key-value pairs.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetails(pub Vec<(String, String)>);

/// Stable error code registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Input
    InvalidProtocol,
    InvalidUrl,
    InvalidInput,
    InvalidRedirect,

    // Policy
    SsrfBlocked,
    DomainNotAllowed,
    RobotsBlocked,
    RateLimited,

    // Transport
    FetchError,
    RedirectLoop,
    TooManyRedirects,
    UnsupportedEncoding,
    DecompressionFailed,
    ContentTooLarge,
    /// `HTTP_<status>` for a final response with status ≥ 400.
    Http(u16),

    // Extraction
    ExtractionFailed,

    // Resource
    ResourceNotFound,

    // Internal
    UnexpectedError,
    ToolError,
}

impl ErrorCode {
    /// The wire form of the code, e.g. `SSRF_BLOCKED` or `HTTP_429`.
    #[must_use]
    pub fn as_code(&self) -> String {
        match self {
            ErrorCode::InvalidProtocol => "INVALID_PROTOCOL".to_string(),
            ErrorCode::InvalidUrl => "INVALID_URL".to_string(),
            ErrorCode::InvalidInput => "INVALID_INPUT".to_string(),
            ErrorCode::InvalidRedirect => "INVALID_REDIRECT".to_string(),
            ErrorCode::SsrfBlocked => "SSRF_BLOCKED".to_string(),
            ErrorCode::DomainNotAllowed => "DOMAIN_NOT_ALLOWED".to_string(),
            ErrorCode::RobotsBlocked => "ROBOTS_BLOCKED".to_string(),
            ErrorCode::RateLimited => "RATE_LIMITED".to_string(),
            ErrorCode::FetchError => "FETCH_ERROR".to_string(),
            ErrorCode::RedirectLoop => "REDIRECT_LOOP".to_string(),
            ErrorCode::TooManyRedirects => "TOO_MANY_REDIRECTS".to_string(),
            ErrorCode::UnsupportedEncoding => "UNSUPPORTED_ENCODING".to_string(),
            ErrorCode::DecompressionFailed => "DECOMPRESSION_FAILED".to_string(),
            ErrorCode::ContentTooLarge => "CONTENT_TOO_LARGE".to_string(),
            ErrorCode::Http(status) => format!("HTTP_{status}"),
            ErrorCode::ExtractionFailed => "EXTRACTION_FAILED".to_string(),
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND".to_string(),
            ErrorCode::UnexpectedError => "UNEXPECTED_ERROR".to_string(),
            ErrorCode::ToolError => "TOOL_ERROR".to_string(),
        }
    }

    /// Whether errors with this code indicate a transient condition.
    ///
    /// HTTP errors are retryable for 429 and 5xx only; policy and input
    /// errors never are.
    #[must_use]
    pub fn default_retryable(&self) -> bool {
        match self {
            ErrorCode::FetchError => true,
            ErrorCode::Http(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_code())
    }
}
