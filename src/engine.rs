//! The process engine: one logical generation request.
//!
//! Builds the prompts, calls the gateway, extracts and validates JSON from
//! the reply, and retries once with a correction notice when the output is
//! unusable. Gateway errors are never retried here; they abort the request
//! and propagate unchanged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::backend::LlmGateway;
use crate::error::{EngineError, OutputFailure, Result};
use crate::events::{emit, Event, EventHandler};
use crate::output_parser::{extract_json, ParseError};
use crate::prompt::build_prompt;
use crate::retry::{correction_system_prompt, MAX_ATTEMPTS};
use crate::schema::{to_validator, ValidationResult, Validator};
use crate::types::{GenerateParams, Generation, GenerationMeta, ProcessConfig, TokenUsage};

/// Per-call switches for [`ProcessEngine::generate_intelligence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Check the extracted JSON against the config's output schema.
    /// Default: `true`.
    pub validate_output: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            validate_output: true,
        }
    }
}

impl GenerateOptions {
    pub fn with_validate_output(mut self, validate: bool) -> Self {
        self.validate_output = validate;
        self
    }
}

/// Runs generation requests against a gateway.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use intelligence_pipeline::backend::MockGateway;
/// use intelligence_pipeline::engine::{GenerateOptions, ProcessEngine};
/// use intelligence_pipeline::types::ProcessConfig;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() {
///     let engine = ProcessEngine::new(Arc::new(MockGateway::fixed(r#"{"label": "spam"}"#)));
///     let config = ProcessConfig::new("You label emails.", "Label the email");
///     let generation = engine
///         .generate_intelligence(&config, &json!({"body": "WIN NOW"}), GenerateOptions::default())
///         .await
///         .unwrap();
///     assert_eq!(generation.data, json!({"label": "spam"}));
///     assert!(!generation.meta.retried);
/// }
/// ```
pub struct ProcessEngine {
    gateway: Arc<dyn LlmGateway>,
    events: Option<Arc<dyn EventHandler>>,
    slow_validation_threshold: Duration,
}

impl ProcessEngine {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            gateway,
            events: None,
            slow_validation_threshold: Duration::from_millis(5),
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = Some(handler);
        self
    }

    pub fn with_slow_validation_threshold(mut self, threshold: Duration) -> Self {
        self.slow_validation_threshold = threshold;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn LlmGateway> {
        &self.gateway
    }

    /// Generate output for `input` under `config`.
    ///
    /// At most [`MAX_ATTEMPTS`] gateway calls are made. Usage in the returned
    /// meta is the sum over all calls and `latency_ms` covers all of them.
    pub async fn generate_intelligence(
        &self,
        config: &ProcessConfig,
        input: &Value,
        options: GenerateOptions,
    ) -> Result<Generation> {
        let started = Instant::now();
        let prompt = build_prompt(config, input);
        let validator = if options.validate_output {
            to_validator(config.output_schema.as_ref())
                .with_slow_threshold(self.slow_validation_threshold)
        } else {
            Validator::accept_all()
        };

        let mut attempts = Attempts::default();
        let mut system = prompt.system.clone();

        for attempt in 1..=MAX_ATTEMPTS {
            let params = GenerateParams {
                prompt: prompt.user.clone(),
                system_prompt: Some(system.clone()),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
            };

            tracing::debug!(
                provider = self.gateway.name(),
                attempt,
                max_tokens = params.max_tokens,
                "calling gateway"
            );
            let result = self.gateway.generate(&params).await.map_err(EngineError::from)?;
            attempts.record(attempt, result.usage, &result.model);

            let cause = match check_output(&validator, &result.text) {
                Ok(data) => return Ok(attempts.finish(data, started)),
                Err(cause) => cause,
            };

            if attempt < MAX_ATTEMPTS {
                tracing::info!(
                    provider = self.gateway.name(),
                    attempt,
                    error = %cause,
                    "model output unusable, retrying with correction"
                );
                emit(
                    &self.events,
                    Event::OutputRetry {
                        model: result.model.clone(),
                        reason: cause.to_string(),
                    },
                );
                system = correction_system_prompt(&prompt.system, &result.text, &cause);
            } else {
                tracing::warn!(
                    provider = self.gateway.name(),
                    attempt,
                    error = %cause,
                    "model output unusable after retry"
                );
            }
            attempts.last_failure = Some(cause);
        }

        Err(attempts.into_error())
    }
}

/// Owned accumulator across the attempts of one request.
#[derive(Default)]
struct Attempts {
    usage: TokenUsage,
    model: String,
    retried: bool,
    last_failure: Option<OutputFailure>,
}

impl Attempts {
    fn record(&mut self, attempt: u32, usage: TokenUsage, model: &str) {
        self.usage += usage;
        self.model = model.to_string();
        self.retried = attempt > 1;
    }

    fn finish(self, data: Value, started: Instant) -> Generation {
        Generation {
            data,
            meta: GenerationMeta {
                usage: self.usage,
                retried: self.retried,
                model: self.model,
                latency_ms: started.elapsed().as_millis() as u64,
            },
        }
    }

    fn into_error(self) -> EngineError {
        // Only reachable with at least one recorded failure.
        let cause = self
            .last_failure
            .unwrap_or(OutputFailure::Parse(ParseError::EmptyResponse));
        EngineError::OutputParseFailed { cause }
    }
}

impl std::fmt::Debug for ProcessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEngine")
            .field("gateway", &self.gateway.name())
            .field("has_event_handler", &self.events.is_some())
            .field("slow_validation_threshold", &self.slow_validation_threshold)
            .finish()
    }
}

fn check_output(validator: &Validator, text: &str) -> std::result::Result<Value, OutputFailure> {
    let value = extract_json(text)?;
    match validator.parse(&value) {
        ValidationResult::Valid(data) => Ok(data),
        ValidationResult::Invalid(issues) => Err(OutputFailure::Schema(issues)),
    }
}
