//! Circuit breaker and timeout around another gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::LlmGateway;
use crate::breaker::CircuitBreaker;
use crate::error::LlmError;
use crate::types::{GenerateParams, GenerateResult};

/// Wraps a gateway with its provider's [`CircuitBreaker`] and a
/// caller-enforced timeout.
///
/// A refused call fails with [`LlmErrorKind::CircuitOpen`] without touching
/// the provider. Every call that reaches the provider is recorded on the
/// breaker: success closes it, any error (timeouts included) counts as a
/// failure.
///
/// [`LlmErrorKind::CircuitOpen`]: crate::error::LlmErrorKind::CircuitOpen
pub struct GuardedGateway {
    inner: Arc<dyn LlmGateway>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
}

impl GuardedGateway {
    pub fn new(inner: Arc<dyn LlmGateway>, breaker: Arc<CircuitBreaker>, timeout: Duration) -> Self {
        Self {
            inner,
            breaker,
            timeout,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for GuardedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedGateway")
            .field("provider", &self.inner.name())
            .field("breaker", &self.breaker)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl LlmGateway for GuardedGateway {
    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult, LlmError> {
        if !self.breaker.can_request() {
            let retry_after = self.breaker.retry_after_seconds().map(Duration::from_secs);
            tracing::debug!(
                provider = self.breaker.provider(),
                retry_after_secs = retry_after.map(|d| d.as_secs()),
                "circuit open, refusing gateway call"
            );
            return Err(LlmError::circuit_open(self.breaker.provider(), retry_after));
        }

        let outcome = match tokio::time::timeout(self.timeout, self.inner.generate(params)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::timeout(self.timeout)),
        };

        match outcome {
            Ok(result) => {
                self.breaker.record_success();
                Ok(result)
            }
            Err(error) => {
                tracing::warn!(
                    provider = self.breaker.provider(),
                    kind = %error.kind,
                    error = %error.message,
                    "gateway call failed"
                );
                self.breaker.record_failure();
                Err(error)
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
