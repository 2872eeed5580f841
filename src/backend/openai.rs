//! Gateway for OpenAI-compatible chat APIs.
//!
//! Endpoint: `{base_url}/v1/chat/completions` (always chat mode, never
//! streaming). Works against OpenAI itself and the many servers that mirror
//! its API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::LlmGateway;
use crate::error::{LlmError, LlmErrorKind};
use crate::types::{GenerateParams, GenerateResult, TokenUsage};

/// Gateway for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use intelligence_pipeline::backend::OpenAiGateway;
///
/// let gateway = OpenAiGateway::new("https://api.openai.com", "gpt-4o-mini")
///     .with_api_key("sk-...");
/// ```
#[derive(Clone)]
pub struct OpenAiGateway {
    client: Client,
    base_url: String,
    model: String,
    name: String,
    /// Sent as `Authorization: Bearer {key}` when set.
    api_key: Option<String>,
    /// Sent as `OpenAI-Organization: {org}` when set.
    organization: Option<String>,
    /// Transport-level timeout; the guard applies its own on top.
    request_timeout: Option<Duration>,
}

impl std::fmt::Debug for OpenAiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGateway")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|k| redact(k)))
            .field("organization", &self.organization)
            .finish()
    }
}

fn redact(key: &str) -> String {
    match key.char_indices().nth(6) {
        Some((idx, _)) => format!("{}***", &key[..idx]),
        None => "***".to_string(),
    }
}

impl OpenAiGateway {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            name: "openai".to_string(),
            api_key: None,
            organization: None,
            request_timeout: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    /// Reuse an existing HTTP client (connection pool).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Provider name reported to the breaker and in logs. Default: `openai`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, params: &GenerateParams) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = params.system_prompt {
            if !system.is_empty() {
                messages.push(json!({"role": "system", "content": system}));
            }
        }
        messages.push(json!({"role": "user", "content": params.prompt}));

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "stream": false,
        })
    }

    fn build_http_request(&self, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self.client.post(self.endpoint()).json(body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(ref org) = self.organization {
            req = req.header("OpenAI-Organization", org.as_str());
        }
        if let Some(timeout) = self.request_timeout {
            req = req.timeout(timeout);
        }
        req
    }

    /// Map a non-success HTTP status to a typed error.
    fn classify_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> LlmError {
        let snippet: String = body.chars().take(300).collect();
        if status == StatusCode::TOO_MANY_REQUESTS {
            LlmError::rate_limited(format!("provider rate limited the request: {}", snippet))
                .with_status(status.as_u16())
                .with_retry_after(retry_after)
        } else {
            LlmError::provider(format!("provider returned {}: {}", status, snippet))
                .with_status(status.as_u16())
        }
    }

    fn classify_transport(error: &reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::new(
                LlmErrorKind::Timeout,
                format!("provider request timed out: {}", error),
            )
        } else {
            LlmError::provider(format!("failed to reach provider: {}", error))
        }
    }

    fn extract_usage(json_resp: &Value) -> TokenUsage {
        let usage = json_resp.get("usage");
        let count = |key: &str| {
            usage
                .and_then(|u| u.get(key))
                .and_then(Value::as_u64)
                .unwrap_or(0)
        };
        TokenUsage::new(count("prompt_tokens"), count("completion_tokens"))
    }

    fn extract_text(json_resp: &Value) -> Option<&str> {
        json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
    }
}

/// Parse a `Retry-After` header value given in seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult, LlmError> {
        let started = Instant::now();
        let body = self.build_body(params);

        let resp = self
            .build_http_request(&body)
            .send()
            .await
            .map_err(|e| Self::classify_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &text, retry_after));
        }

        let json_resp: Value = resp
            .json()
            .await
            .map_err(|e| Self::classify_transport(&e))?;

        let text = Self::extract_text(&json_resp)
            .ok_or_else(|| LlmError::provider("provider response has no message content"))?
            .to_string();
        let model = json_resp
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.model)
            .to_string();

        Ok(GenerateResult {
            text,
            usage: Self::extract_usage(&json_resp),
            model,
            duration: started.elapsed(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
