//! # Intelligence Pipeline
//!
//! Request-serving core for LLM-backed "intelligence processes": versioned
//! prompt configurations that tenants call with a JSON input and get back
//! schema-conformant JSON output.
//!
//! A request flows through the following stages:
//!
//! 1. **Resolve** the active version of the process ([`ProcessRepository`]).
//! 2. **Validate** the input against the version's input schema ([`schema`]).
//! 3. **Cache lookup** keyed by a canonical fingerprint ([`ResponseCache`]).
//! 4. **Generate** through the [`ProcessEngine`]: prompt, gateway call,
//!    JSON extraction, output validation, one corrective retry.
//! 5. **Shape** the result into an [`ApiResponse`] envelope.
//!
//! Provider calls go through a [`GuardedGateway`], which applies a
//! per-provider [`CircuitBreaker`] and a timeout.
//!
//! ## Core Concepts
//!
//! - **[`LlmGateway`]**: async trait for a model provider. [`MockGateway`]
//!   is scripted for tests; `OpenAiGateway` speaks chat completions.
//! - **[`Validator`]**: compiled form of a JSON-Schema-like description.
//!   Coerces, strips undeclared keys, fills defaults.
//! - **[`RequestPipeline`]**: composition root; `handle` never fails and
//!   always returns an envelope.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use intelligence_pipeline::pipeline::{GenerateRequest, ProcessRepository};
//! use intelligence_pipeline::types::{ActiveVersion, ProcessConfig, TenantContext};
//! use intelligence_pipeline::{MockGateway, PipelineConfig, RequestPipeline};
//! use serde_json::json;
//!
//! struct OneProcess(ActiveVersion);
//!
//! #[async_trait::async_trait]
//! impl ProcessRepository for OneProcess {
//!     async fn find_active_version(
//!         &self, _: &str, _: &str, _: &str,
//!     ) -> anyhow::Result<Option<ActiveVersion>> {
//!         Ok(Some(self.0.clone()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let version = ActiveVersion {
//!         version: "1".into(),
//!         config: ProcessConfig::new("You summarize.", "Summarize {topic}"),
//!     };
//!     let pipeline = RequestPipeline::builder(
//!         Arc::new(OneProcess(version)),
//!         Arc::new(MockGateway::fixed(r#"{"summary": "short"}"#)),
//!     )
//!     .with_config(PipelineConfig::default())
//!     .build();
//!
//!     let resp = pipeline
//!         .handle(GenerateRequest::new(
//!             TenantContext::new("acme", "production"),
//!             "summarizer",
//!             json!({"input": {"topic": "rust"}}),
//!         ))
//!         .await;
//!     assert!(resp.is_success());
//!     assert_eq!(resp.body["data"]["summary"], "short");
//! }
//! ```

pub mod backend;
pub mod breaker;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod output_parser;
pub mod pipeline;
pub mod prompt;
pub mod response;
pub mod retry;
pub mod schema;
pub mod types;

pub use backend::{GuardedGateway, LlmGateway, MockGateway};
#[cfg(feature = "openai")]
pub use backend::OpenAiGateway;
pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use cache::{CacheEntry, CacheStore, InMemoryCacheStore, ResponseCache};
pub use config::PipelineConfig;
pub use engine::{GenerateOptions, ProcessEngine};
pub use error::{EngineError, LlmError, LlmErrorKind, Result};
pub use events::{Event, EventHandler, FnEventHandler, TracingEventHandler};
pub use output_parser::{extract_json, ParseError};
pub use pipeline::{GenerateRequest, ProcessRepository, RequestPipeline, RequestPipelineBuilder};
pub use response::{ApiResponse, ErrorCode};
pub use schema::{to_validator, ValidationIssue, ValidationResult, Validator};
pub use types::{ActiveVersion, Generation, ProcessConfig, TenantContext, TokenUsage};
