use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Immutable configuration of one process version.
///
/// Owned by the version record; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessConfig {
    /// System prompt template. `{key}` placeholders are filled from the input.
    pub system_prompt: String,

    /// Plain-language description of what the process should produce.
    pub goal: String,

    /// JSON-Schema-like description of accepted input. `None` accepts anything.
    pub input_schema: Option<Value>,

    /// JSON-Schema-like description of the expected output.
    pub output_schema: Option<Value>,

    /// Maximum output tokens per gateway call.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f64,

    /// Cache lifetime in seconds. `0` disables caching.
    pub cache_ttl_seconds: u64,

    /// Whether responses of this version may be cached at all.
    pub cache_enabled: bool,

    /// Requests per minute. Enforced by the surrounding HTTP layer.
    pub rate_limit: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            goal: String::new(),
            input_schema: None,
            output_schema: None,
            max_tokens: 2048,
            temperature: 0.7,
            cache_ttl_seconds: 3600,
            cache_enabled: true,
            rate_limit: 60,
        }
    }
}

impl ProcessConfig {
    pub fn new(system_prompt: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            goal: goal.into(),
            ..Self::default()
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_cache_ttl(mut self, seconds: u64) -> Self {
        self.cache_ttl_seconds = seconds;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// TTL to use for caching, or `None` when caching is off for this version.
    pub fn effective_cache_ttl(&self) -> Option<u64> {
        if self.cache_enabled && self.cache_ttl_seconds > 0 {
            Some(self.cache_ttl_seconds)
        } else {
            None
        }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

/// An active version as resolved by the process repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveVersion {
    pub version: String,
    pub config: ProcessConfig,
}

/// Caller identity supplied by the API-key validator. Trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    pub tenant_id: String,
    pub environment: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            environment: environment.into(),
        }
    }
}

/// Inputs of a single gateway call. Built fresh for every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Output of a single gateway call.
#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub duration: Duration,
}

/// Metadata aggregated over every attempt of one logical request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMeta {
    pub usage: TokenUsage,
    pub retried: bool,
    pub model: String,
    pub latency_ms: u64,
}

/// Successful engine output.
#[derive(Debug, Clone)]
pub struct Generation {
    pub data: Value,
    pub meta: GenerationMeta,
}
