//! Scripted gateway for testing without a live provider.
//!
//! [`MockGateway`] replays a queue of replies and errors in order and records
//! every [`GenerateParams`] it receives.
//!
//! # Example
//!
//! ```
//! use intelligence_pipeline::backend::MockGateway;
//! use intelligence_pipeline::error::LlmError;
//!
//! let mock = MockGateway::new()
//!     .reply("not json")
//!     .reply(r#"{"ok": true}"#)
//!     .fail(LlmError::provider("boom"));
//! assert_eq!(mock.remaining(), 3);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::LlmGateway;
use crate::error::LlmError;
use crate::types::{GenerateParams, GenerateResult, TokenUsage};

#[derive(Debug, Clone)]
enum Scripted {
    Reply { text: String, usage: TokenUsage },
    Fail(LlmError),
}

/// A test gateway that returns scripted outcomes in order.
///
/// Once the script is exhausted, the last outcome repeats. An empty script
/// answers with a provider error.
#[derive(Debug)]
pub struct MockGateway {
    name: String,
    model: String,
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<GenerateParams>>,
    delay: Option<Duration>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// A mock that always answers with `text`.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::new().reply(text)
    }

    /// Queue a successful reply reporting 10 input and 5 output tokens.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.reply_with_usage(text, TokenUsage::new(10, 5))
    }

    /// Queue a successful reply with explicit usage.
    pub fn reply_with_usage(self, text: impl Into<String>, usage: TokenUsage) -> Self {
        self.push(Scripted::Reply {
            text: text.into(),
            usage,
        })
    }

    /// Queue a failure.
    pub fn fail(self, error: LlmError) -> Self {
        self.push(Scripted::Fail(error))
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report a different provider name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of `generate` calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }

    /// Every params value received, in call order.
    pub fn seen_params(&self) -> Vec<GenerateParams> {
        lock(&self.seen).clone()
    }

    fn push(self, item: Scripted) -> Self {
        lock(&self.script).push_back(item);
        self
    }

    fn next_outcome(&self) -> Option<Scripted> {
        let next = lock(&self.script).pop_front();
        let mut last = lock(&self.last);
        match next {
            Some(item) => {
                *last = Some(item.clone());
                Some(item)
            }
            None => last.clone(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poison| poison.into_inner())
}

#[async_trait]
impl LlmGateway for MockGateway {
    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.seen).push(params.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_outcome() {
            Some(Scripted::Reply { text, usage }) => Ok(GenerateResult {
                text,
                usage,
                model: self.model.clone(),
                duration: self.delay.unwrap_or_default(),
            }),
            Some(Scripted::Fail(error)) => Err(error),
            None => Err(LlmError::provider("mock gateway has no scripted reply")),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
