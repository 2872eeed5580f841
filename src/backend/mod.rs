//! Gateway trait and its implementations.
//!
//! The [`LlmGateway`] trait abstracts over model providers. Everything above
//! this module holds an `Arc<dyn LlmGateway>` and never sees provider HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ProcessEngine ──► GuardedGateway ──► LlmGateway::generate()
//!                   (breaker + timeout)        │
//!                                   ┌──────────┴──────────┐
//!                             OpenAiGateway          MockGateway
//!                         /v1/chat/completions     scripted replies
//! ```

pub mod guarded;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;

pub use guarded::GuardedGateway;
pub use mock::MockGateway;
#[cfg(feature = "openai")]
pub use openai::OpenAiGateway;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{GenerateParams, GenerateResult};

/// Abstraction over model providers.
///
/// Implementations translate [`GenerateParams`] into a provider call and
/// classify every failure into an [`LlmError`] kind.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn LlmGateway>`.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Run one generation call.
    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult, LlmError>;

    /// Provider name, used to key the circuit breaker and in logs.
    fn name(&self) -> &str;
}
