//! Three-state circuit breaker guarding calls to an LLM provider.
//!
//! ```text
//!   CLOSED ──threshold failures──► OPEN ──timeout elapsed──► HALF_OPEN
//!     ▲                             ▲                           │
//!     └────────probe success────────┼───────────────────────────┤
//!                                   └───────probe failure───────┘
//! ```
//!
//! There is no timer. The OPEN → HALF_OPEN transition is derived from the
//! stored state and the current time at the top of every public method
//! (see [`derive_state`]). One breaker instance is shared by all concurrent
//! requests for a provider; its state lives behind a mutex that is never held
//! across an `.await` or while observers run.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::env_parse;
use crate::events::{emit, Event, EventHandler, StateChange};

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Breaker tuning.
///
/// # Example
///
/// ```
/// use intelligence_pipeline::breaker::BreakerConfig;
/// use std::time::Duration;
///
/// let config = BreakerConfig::default()
///     .with_threshold(3)
///     .with_timeout(Duration::from_secs(10));
/// assert_eq!(config.threshold, 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit. Default: 5.
    pub threshold: u32,
    /// How long the circuit stays open before a probe is allowed. Default: 30s.
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

impl BreakerConfig {
    /// Defaults overridden by `INTEL_BREAKER_THRESHOLD` and
    /// `INTEL_BREAKER_TIMEOUT_MS` when they are set and parse.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            threshold: env_parse("INTEL_BREAKER_THRESHOLD").unwrap_or(defaults.threshold),
            timeout: env_parse::<u64>("INTEL_BREAKER_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// What the breaker remembers between calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
    /// When the current half-open probe was admitted.
    pub probe_started: Option<DateTime<Utc>>,
}

impl StoredState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            probe_started: None,
        }
    }
}

/// Effective state at `now`: an OPEN circuit whose timeout has elapsed is
/// HALF_OPEN. Pure; does not mutate anything.
pub fn derive_state(now: DateTime<Utc>, stored: &StoredState, timeout: Duration) -> CircuitState {
    match (stored.state, stored.opened_at) {
        (CircuitState::Open, Some(opened_at)) if elapsed(now, opened_at, timeout) => {
            CircuitState::HalfOpen
        }
        (state, _) => state,
    }
}

/// `start + timeout`, or `None` when that lies beyond the representable range.
fn deadline(start: DateTime<Utc>, timeout: Duration) -> Option<DateTime<Utc>> {
    start.checked_add_signed(to_chrono(timeout))
}

/// Whether `timeout` has passed since `start`. A deadline past the end of
/// time never elapses.
fn elapsed(now: DateTime<Utc>, start: DateTime<Utc>, timeout: Duration) -> bool {
    deadline(start, timeout).is_some_and(|d| now >= d)
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::milliseconds(d.as_millis().min(i64::MAX as u128) as i64)
}

/// Circuit breaker for one provider.
pub struct CircuitBreaker {
    provider: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    events: Option<Arc<dyn EventHandler>>,
    inner: Mutex<StoredState>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            clock: Arc::new(SystemClock),
            events: None,
            inner: Mutex::new(StoredState::closed()),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install an observer for state transitions.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = Some(handler);
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Whether a call may be sent now.
    ///
    /// While HALF_OPEN only one probe is admitted at a time. If the probe's
    /// outcome is never recorded, another probe is admitted once `timeout`
    /// has passed since the first one.
    pub fn can_request(&self) -> bool {
        self.with_state(|stored, now, timeout| match stored.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let slot_free = stored
                    .probe_started
                    .map_or(true, |started| elapsed(now, started, timeout));
                if slot_free {
                    stored.probe_started = Some(now);
                }
                slot_free
            }
        })
    }

    /// Current state, after lazy evaluation.
    pub fn state(&self) -> CircuitState {
        self.with_state(|stored, _, _| stored.state)
    }

    pub fn failure_count(&self) -> u32 {
        self.with_state(|stored, _, _| stored.failure_count)
    }

    pub fn record_success(&self) {
        self.transition(|stored, _| {
            stored.failure_count = 0;
            if stored.state == CircuitState::HalfOpen {
                *stored = StoredState::closed();
            }
        });
    }

    pub fn record_failure(&self) {
        let threshold = self.config.threshold.max(1);
        self.transition(|stored, now| {
            stored.failure_count = stored.failure_count.saturating_add(1);
            let trips = match stored.state {
                CircuitState::Closed => stored.failure_count >= threshold,
                CircuitState::HalfOpen => true,
                CircuitState::Open => false,
            };
            if trips {
                stored.state = CircuitState::Open;
                stored.opened_at = Some(now);
                stored.probe_started = None;
            }
        });
    }

    /// Seconds until a probe will be admitted; `None` unless OPEN.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        self.with_state(|stored, now, timeout| {
            if stored.state != CircuitState::Open {
                return None;
            }
            let opened_at = stored.opened_at?;
            let elapsed_ms = (now - opened_at).num_milliseconds().max(0) as u128;
            let remaining_ms = timeout.as_millis().saturating_sub(elapsed_ms);
            Some(remaining_ms.div_ceil(1000) as u64)
        })
    }

    /// Administrative reset to CLOSED.
    pub fn reset(&self) {
        self.transition(|stored, _| *stored = StoredState::closed());
    }

    /// Snapshot of the stored state after lazy evaluation.
    pub fn snapshot(&self) -> StoredState {
        self.with_state(|stored, _, _| *stored)
    }

    /// Run `f` against the lazily refreshed state; emit any transitions once
    /// the lock is released.
    fn with_state<R>(
        &self,
        f: impl FnOnce(&mut StoredState, DateTime<Utc>, Duration) -> R,
    ) -> R {
        let now = self.clock.now();
        let (result, changes) = {
            let mut stored = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
            let mut changes = Vec::with_capacity(1);
            if let Some(change) = self.refresh(&mut stored, now) {
                changes.push(change);
            }
            (f(&mut stored, now, self.config.timeout), changes)
        };
        self.notify(changes);
        result
    }

    /// Like [`with_state`](Self::with_state) for mutations that may change
    /// the state; reports the change.
    fn transition(&self, f: impl FnOnce(&mut StoredState, DateTime<Utc>)) {
        let now = self.clock.now();
        let changes = {
            let mut stored = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
            let mut changes = Vec::with_capacity(2);
            if let Some(change) = self.refresh(&mut stored, now) {
                changes.push(change);
            }
            let before = stored.state;
            f(&mut stored, now);
            if stored.state != before {
                changes.push(self.change(before, &stored));
            }
            changes
        };
        self.notify(changes);
    }

    /// Persist the derived state if it differs from the stored one.
    fn refresh(&self, stored: &mut StoredState, now: DateTime<Utc>) -> Option<StateChange> {
        let effective = derive_state(now, stored, self.config.timeout);
        if effective == stored.state {
            return None;
        }
        let previous = stored.state;
        stored.state = effective;
        stored.probe_started = None;
        Some(self.change(previous, stored))
    }

    fn change(&self, previous: CircuitState, stored: &StoredState) -> StateChange {
        let open_until = match stored.state {
            CircuitState::Open => stored.opened_at.and_then(|t| deadline(t, self.config.timeout)),
            _ => None,
        };
        StateChange {
            provider: self.provider.clone(),
            previous,
            new: stored.state,
            failure_count: stored.failure_count,
            open_until,
        }
    }

    fn notify(&self, changes: Vec<StateChange>) {
        for change in changes {
            emit(&self.events, Event::CircuitStateChanged(change));
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("provider", &self.provider)
            .field("config", &self.config)
            .field("has_event_handler", &self.events.is_some())
            .finish()
    }
}
