//! Wiring-time configuration.
//!
//! Every knob has a default and can be overridden from the environment with
//! an `INTEL_` variable; unparseable values are ignored.

use std::str::FromStr;
use std::time::Duration;

use crate::breaker::BreakerConfig;

/// Read and parse an environment variable, ignoring blanks and parse errors.
pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| s.trim().parse().ok())
}

/// Configuration for the request pipeline and its gateway guard.
///
/// # Example
///
/// ```
/// use intelligence_pipeline::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig::default().with_gateway_timeout(Duration::from_secs(10));
/// assert_eq!(config.gateway_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Circuit breaker tuning for the provider.
    pub breaker: BreakerConfig,

    /// Caller-enforced limit on one gateway call. Default: 30 seconds.
    pub gateway_timeout: Duration,

    /// Schema validations slower than this are logged. Default: 5ms.
    pub slow_validation_threshold: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            gateway_timeout: Duration::from_secs(30),
            slow_validation_threshold: Duration::from_millis(5),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `INTEL_BREAKER_THRESHOLD`,
    /// `INTEL_BREAKER_TIMEOUT_MS`, `INTEL_GATEWAY_TIMEOUT_MS` and
    /// `INTEL_SLOW_VALIDATION_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            breaker: BreakerConfig::from_env(),
            gateway_timeout: env_parse::<u64>("INTEL_GATEWAY_TIMEOUT_MS")
                .map(|ms| Duration::from_millis(ms.max(1)))
                .unwrap_or(defaults.gateway_timeout),
            slow_validation_threshold: env_parse::<u64>("INTEL_SLOW_VALIDATION_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.slow_validation_threshold),
        }
    }

    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_slow_validation_threshold(mut self, threshold: Duration) -> Self {
        self.slow_validation_threshold = threshold;
        self
    }
}
