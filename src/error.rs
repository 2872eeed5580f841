use std::time::Duration;
use thiserror::Error;

use crate::output_parser::ParseError;
use crate::schema::ValidationIssue;

/// Failure category of a gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// The call did not finish within the caller-enforced timeout.
    Timeout,
    /// The provider answered with an error or the transport failed.
    ProviderError,
    /// The provider rejected the call with a rate limit.
    RateLimited,
    /// The provider's circuit breaker refused the call; nothing was sent.
    CircuitOpen,
}

impl LlmErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmErrorKind::Timeout => "TIMEOUT",
            LlmErrorKind::ProviderError => "PROVIDER_ERROR",
            LlmErrorKind::RateLimited => "RATE_LIMITED",
            LlmErrorKind::CircuitOpen => "CIRCUIT_OPEN",
        }
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error returned by every [`LlmGateway`](crate::backend::LlmGateway).
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// HTTP status returned by the provider, when there was one.
    pub status: Option<u16>,
    /// How long the caller should wait before trying again, if known.
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            LlmErrorKind::Timeout,
            format!("gateway call exceeded {}ms", after.as_millis()),
        )
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ProviderError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimited, message)
    }

    pub fn circuit_open(provider: &str, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(
                LlmErrorKind::CircuitOpen,
                format!("circuit for provider '{}' is open", provider),
            )
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// Why a model response could not be turned into acceptable output.
#[derive(Error, Debug)]
pub enum OutputFailure {
    /// No JSON could be extracted from the raw text.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// JSON was extracted but violates the output schema.
    #[error("output failed schema validation: {}", crate::schema::describe_issues(.0))]
    Schema(Vec<ValidationIssue>),
}

/// Errors produced by the process engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Both attempts produced unusable output.
    #[error("model output could not be parsed after retry: {cause}")]
    OutputParseFailed {
        #[source]
        cause: OutputFailure,
    },

    /// The gateway failed; propagated unchanged.
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::OutputParseFailed { .. } => "OUTPUT_PARSE_FAILED",
            EngineError::Llm(e) => e.kind.as_str(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
