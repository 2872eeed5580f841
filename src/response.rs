//! Response envelopes and the mapping from typed errors to HTTP statuses.
//!
//! This is the only place that knows about status codes. Everything below
//! the pipeline returns typed errors.
//!
//! Success: `{"success": true, "data": ..., "meta": {"version", "cached",
//! "latency_ms", "request_id"}}`.
//! Error: `{"success": false, "error": {"code", "message", "details"?}}`.

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{EngineError, LlmErrorKind};
use crate::schema::ValidationIssue;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    ValidationError,
    ProcessNotFound,
    OutputParseFailed,
    LlmTimeout,
    LlmError,
    LlmRateLimited,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ProcessNotFound => "PROCESS_NOT_FOUND",
            ErrorCode::OutputParseFailed => "OUTPUT_PARSE_FAILED",
            ErrorCode::LlmTimeout => "LLM_TIMEOUT",
            ErrorCode::LlmError => "LLM_ERROR",
            ErrorCode::LlmRateLimited => "LLM_RATE_LIMITED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::ProcessNotFound => StatusCode::NOT_FOUND,
            ErrorCode::OutputParseFailed | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCode::LlmTimeout | ErrorCode::LlmError | ErrorCode::LlmRateLimited => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `meta` block of a success envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMeta {
    pub version: String,
    pub cached: bool,
    pub latency_ms: u64,
    pub request_id: String,
}

/// A shaped response ready for the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// Value for a `Retry-After` header, in seconds.
    pub retry_after: Option<u64>,
    pub body: Value,
}

impl ApiResponse {
    pub fn success(data: Value, meta: ResponseMeta) -> Self {
        Self {
            status: StatusCode::OK,
            retry_after: None,
            body: json!({"success": true, "data": data, "meta": meta}),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>, details: Option<Value>) -> Self {
        let mut error = json!({"code": code, "message": message.into()});
        if let Some(details) = details {
            error["details"] = details;
        }
        Self {
            status: code.status(),
            retry_after: None,
            body: json!({"success": false, "error": error}),
        }
    }

    pub fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after = seconds;
        self
    }

    /// 400 listing every input issue under `details.issues`.
    pub fn validation_error(issues: &[ValidationIssue]) -> Self {
        Self::error(
            ErrorCode::ValidationError,
            "Input validation failed",
            Some(json!({ "issues": issues })),
        )
    }

    /// Map an engine failure to its envelope.
    pub fn from_engine_error(err: &EngineError) -> Self {
        match err {
            EngineError::OutputParseFailed { cause } => Self::error(
                ErrorCode::OutputParseFailed,
                "Model output could not be parsed",
                Some(json!({ "cause": cause.to_string() })),
            ),
            EngineError::Llm(e) => {
                let retry_after = e.retry_after.map(|d| d.as_secs().max(1));
                let (code, message) = match e.kind {
                    LlmErrorKind::Timeout => (ErrorCode::LlmTimeout, "The model provider timed out"),
                    LlmErrorKind::ProviderError => (ErrorCode::LlmError, "The model provider failed"),
                    LlmErrorKind::RateLimited => {
                        (ErrorCode::LlmRateLimited, "The model provider is rate limiting requests")
                    }
                    LlmErrorKind::CircuitOpen => (
                        ErrorCode::LlmRateLimited,
                        "The model provider is temporarily unavailable",
                    ),
                };
                Self::error(code, message, None).with_retry_after(retry_after)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `error.code` of an error envelope.
    pub fn error_code(&self) -> Option<&str> {
        self.body.get("error")?.get("code")?.as_str()
    }
}
