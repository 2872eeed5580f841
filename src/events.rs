//! Lifecycle events and observer hooks.
//!
//! Components emit [`Event`]s to an optional [`EventHandler`]. The circuit
//! breaker reports every state transition this way; the engine reports
//! output retries. [`TracingEventHandler`] turns events into structured
//! `tracing` records and is what production wiring normally installs.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::breaker::CircuitState;

/// A circuit breaker state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// Provider guarded by the breaker (e.g. `"openai"`).
    pub provider: String,
    pub previous: CircuitState,
    pub new: CircuitState,
    /// Consecutive failures at the time of the transition.
    pub failure_count: u32,
    /// Set when the transition opened the circuit.
    pub open_until: Option<DateTime<Utc>>,
}

/// Events emitted while serving requests.
#[derive(Debug, Clone)]
pub enum Event {
    /// A circuit breaker changed state.
    CircuitStateChanged(StateChange),
    /// The engine is re-calling the model because attempt 1 was unusable.
    OutputRetry {
        /// Model that produced the rejected output.
        model: String,
        /// What was wrong with the first attempt.
        reason: String,
    },
}

/// Handler for pipeline events.
///
/// # Example
///
/// ```
/// use intelligence_pipeline::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         if let Event::CircuitStateChanged(change) = event {
///             println!("{} -> {}", change.previous, change.new);
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

/// Logs events through `tracing`. Circuit openings are warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventHandler;

impl EventHandler for TracingEventHandler {
    fn on_event(&self, event: Event) {
        match event {
            Event::CircuitStateChanged(change) => {
                let open_until = change.open_until.map(|t| t.to_rfc3339());
                if change.new == CircuitState::Open {
                    tracing::warn!(
                        provider = %change.provider,
                        previous = %change.previous,
                        new = %change.new,
                        failure_count = change.failure_count,
                        open_until = ?open_until,
                        "circuit breaker opened"
                    );
                } else {
                    tracing::info!(
                        provider = %change.provider,
                        previous = %change.previous,
                        new = %change.new,
                        failure_count = change.failure_count,
                        "circuit breaker state changed"
                    );
                }
            }
            Event::OutputRetry { model, reason } => {
                tracing::info!(model = %model, reason = %reason, "retrying generation after unusable output");
            }
        }
    }
}
