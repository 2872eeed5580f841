//! Request pipeline: the composition root.
//!
//! [`RequestPipeline`] turns one inbound generate call into a shaped
//! [`ApiResponse`]:
//!
//! ```text
//! resolve version ─► shape check ─► validate input ─► cache lookup ──hit──► 200 cached
//!                                                          │ miss
//!                                                          ▼
//!                           engine (guarded gateway) ─► cache write ─► 200 fresh
//! ```
//!
//! Every failure becomes an error envelope; `handle` itself never fails.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{GuardedGateway, LlmGateway};
use crate::breaker::CircuitBreaker;
use crate::cache::{compute_fingerprint, CacheStore, InMemoryCacheStore, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::engine::{GenerateOptions, ProcessEngine};
use crate::events::{EventHandler, TracingEventHandler};
use crate::response::{ApiResponse, ErrorCode, ResponseMeta};
use crate::schema::{to_validator, ValidationResult};
use crate::types::{ActiveVersion, TenantContext};

/// Lookup of the version currently active for an environment.
#[async_trait]
pub trait ProcessRepository: Send + Sync {
    async fn find_active_version(
        &self,
        process_id: &str,
        tenant_id: &str,
        environment: &str,
    ) -> anyhow::Result<Option<ActiveVersion>>;
}

/// One inbound generate call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub tenant: TenantContext,
    pub process_id: String,
    /// Raw request body; must be an object with an `input` member.
    pub body: Value,
    /// Skip the cache read. The result is still written.
    pub no_cache: bool,
    /// Caller-supplied id. A UUID v4 is generated when absent.
    pub request_id: Option<String>,
}

impl GenerateRequest {
    pub fn new(tenant: TenantContext, process_id: impl Into<String>, body: Value) -> Self {
        Self {
            tenant,
            process_id: process_id.into(),
            body,
            no_cache: false,
            request_id: None,
        }
    }

    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Serves generate requests for every process of every tenant.
pub struct RequestPipeline {
    repository: Arc<dyn ProcessRepository>,
    engine: ProcessEngine,
    cache: ResponseCache,
    breaker: Arc<CircuitBreaker>,
    config: PipelineConfig,
}

impl RequestPipeline {
    /// Start wiring a pipeline around a repository and a provider gateway.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use intelligence_pipeline::backend::MockGateway;
    /// use intelligence_pipeline::pipeline::{ProcessRepository, RequestPipeline};
    /// use intelligence_pipeline::types::ActiveVersion;
    /// use intelligence_pipeline::PipelineConfig;
    ///
    /// struct NoProcesses;
    ///
    /// #[async_trait::async_trait]
    /// impl ProcessRepository for NoProcesses {
    ///     async fn find_active_version(
    ///         &self, _: &str, _: &str, _: &str,
    ///     ) -> anyhow::Result<Option<ActiveVersion>> {
    ///         Ok(None)
    ///     }
    /// }
    ///
    /// let pipeline = RequestPipeline::builder(Arc::new(NoProcesses), Arc::new(MockGateway::new()))
    ///     .with_config(PipelineConfig::default())
    ///     .build();
    /// assert_eq!(pipeline.breaker().provider(), "mock");
    /// ```
    pub fn builder(
        repository: Arc<dyn ProcessRepository>,
        gateway: Arc<dyn LlmGateway>,
    ) -> RequestPipelineBuilder {
        RequestPipelineBuilder {
            repository,
            gateway,
            config: None,
            store: None,
            clock: None,
            event_handler: None,
        }
    }

    /// Circuit breaker guarding the provider.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Serve one request.
    pub async fn handle(&self, req: GenerateRequest) -> ApiResponse {
        let started = Instant::now();
        let request_id = req
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let tenant_id = req.tenant.tenant_id.as_str();
        let process_id = req.process_id.as_str();

        let version = match self
            .repository
            .find_active_version(process_id, tenant_id, &req.tenant.environment)
            .await
        {
            Ok(Some(version)) => version,
            Ok(None) => {
                tracing::debug!(tenant_id, process_id, environment = %req.tenant.environment, "no active version");
                return ApiResponse::error(
                    ErrorCode::ProcessNotFound,
                    format!(
                        "No active version of process '{}' in environment '{}'",
                        process_id, req.tenant.environment
                    ),
                    None,
                );
            }
            Err(e) => {
                tracing::error!(tenant_id, process_id, error = %e, "process lookup failed");
                return ApiResponse::error(ErrorCode::InternalError, "Process lookup failed", None);
            }
        };
        let config = &version.config;

        let Some(raw_input) = req.body.as_object().and_then(|body| body.get("input")) else {
            return ApiResponse::error(
                ErrorCode::InvalidRequest,
                "Request body must be a JSON object with an 'input' field",
                None,
            );
        };

        let validator = to_validator(config.input_schema.as_ref())
            .with_slow_threshold(self.config.slow_validation_threshold);
        let input = match validator.parse(raw_input) {
            ValidationResult::Valid(input) => input,
            ValidationResult::Invalid(issues) => {
                tracing::debug!(tenant_id, process_id, issues = issues.len(), "input rejected");
                return ApiResponse::validation_error(&issues);
            }
        };

        let ttl = config.effective_cache_ttl();
        let input_hash = compute_fingerprint(tenant_id, process_id, &input);

        if ttl.is_some() && !req.no_cache {
            if let Some(entry) = self.cache.get(tenant_id, process_id, &input_hash).await {
                tracing::debug!(tenant_id, process_id, %request_id, "cache hit");
                return ApiResponse::success(
                    entry.data,
                    ResponseMeta {
                        version: entry.version,
                        cached: true,
                        latency_ms: started.elapsed().as_millis() as u64,
                        request_id,
                    },
                );
            }
        }

        let generation = match self
            .engine
            .generate_intelligence(config, &input, GenerateOptions::default())
            .await
        {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!(
                    tenant_id,
                    process_id,
                    %request_id,
                    code = e.code(),
                    error = %e,
                    "generation failed"
                );
                return ApiResponse::from_engine_error(&e);
            }
        };

        if let Some(ttl) = ttl {
            self.cache
                .set(
                    tenant_id,
                    process_id,
                    &input_hash,
                    generation.data.clone(),
                    &version.version,
                    ttl,
                )
                .await;
        }

        tracing::info!(
            tenant_id,
            process_id,
            %request_id,
            model = %generation.meta.model,
            retried = generation.meta.retried,
            input_tokens = generation.meta.usage.input_tokens,
            output_tokens = generation.meta.usage.output_tokens,
            "generation served"
        );

        ApiResponse::success(
            generation.data,
            ResponseMeta {
                version: version.version.clone(),
                cached: false,
                latency_ms: started.elapsed().as_millis() as u64,
                request_id,
            },
        )
    }

    /// Serve `req` on a detached task.
    ///
    /// Dropping the returned handle does not cancel the work, so the gateway
    /// call and cache write still complete if the client goes away.
    pub fn spawn(self: &Arc<Self>, req: GenerateRequest) -> JoinHandle<ApiResponse> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.handle(req).await })
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("engine", &self.engine)
            .field("breaker", &self.breaker)
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`RequestPipeline`].
pub struct RequestPipelineBuilder {
    repository: Arc<dyn ProcessRepository>,
    gateway: Arc<dyn LlmGateway>,
    config: Option<PipelineConfig>,
    store: Option<Arc<dyn CacheStore>>,
    clock: Option<Arc<dyn Clock>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl RequestPipelineBuilder {
    /// Default: [`PipelineConfig::from_env`].
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Default: a fresh [`InMemoryCacheStore`].
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Time source for the breaker and cache expiry. Default: system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Observer for breaker transitions and output retries.
    /// Default: [`TracingEventHandler`].
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn build(self) -> RequestPipeline {
        let config = self.config.unwrap_or_else(PipelineConfig::from_env);
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events: Arc<dyn EventHandler> = self
            .event_handler
            .unwrap_or_else(|| Arc::new(TracingEventHandler));
        let store: Arc<dyn CacheStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryCacheStore::new()));

        let breaker = Arc::new(
            CircuitBreaker::new(self.gateway.name(), config.breaker.clone())
                .with_clock(clock.clone())
                .with_event_handler(events.clone()),
        );
        let guarded = GuardedGateway::new(self.gateway, breaker.clone(), config.gateway_timeout);
        let engine = ProcessEngine::new(Arc::new(guarded))
            .with_event_handler(events)
            .with_slow_validation_threshold(config.slow_validation_threshold);
        let cache = ResponseCache::new(store).with_clock(clock);

        RequestPipeline {
            repository: self.repository,
            engine,
            cache,
            breaker,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockGateway;
    use crate::breaker::{BreakerConfig, CircuitState};
    use crate::clock::ManualClock;
    use crate::error::LlmError;
    use crate::types::ProcessConfig;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct StaticRepository {
        versions: Mutex<HashMap<(String, String, String), ActiveVersion>>,
        broken: bool,
    }

    impl StaticRepository {
        fn with(self, tenant: &str, env: &str, process: &str, version: &str, config: ProcessConfig) -> Self {
            self.versions.lock().unwrap().insert(
                (tenant.into(), env.into(), process.into()),
                ActiveVersion {
                    version: version.into(),
                    config,
                },
            );
            self
        }
    }

    #[async_trait]
    impl ProcessRepository for StaticRepository {
        async fn find_active_version(
            &self,
            process_id: &str,
            tenant_id: &str,
            environment: &str,
        ) -> anyhow::Result<Option<ActiveVersion>> {
            if self.broken {
                anyhow::bail!("database unavailable");
            }
            let key = (tenant_id.to_string(), environment.to_string(), process_id.to_string());
            Ok(self.versions.lock().unwrap().get(&key).cloned())
        }
    }

    fn product_config() -> ProcessConfig {
        ProcessConfig::new("You extract product data.", "Normalize the product")
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "minLength": 3},
                    "price": {"type": "number"}
                },
                "required": ["price"]
            }))
            .with_output_schema(json!({
                "type": "object",
                "properties": {"result": {"type": "string"}},
                "required": ["result"]
            }))
    }

    struct Harness {
        pipeline: Arc<RequestPipeline>,
        mock: Arc<MockGateway>,
        store: Arc<InMemoryCacheStore>,
        clock: Arc<ManualClock>,
    }

    fn harness(mock: MockGateway, config: ProcessConfig) -> Harness {
        let mock = Arc::new(mock);
        let store = Arc::new(InMemoryCacheStore::new());
        let clock = Arc::new(ManualClock::default());
        let repository = StaticRepository::default().with("acme", "production", "products", "4", config);
        let pipeline = RequestPipeline::builder(Arc::new(repository), mock.clone())
            .with_config(
                PipelineConfig::default().with_breaker(
                    BreakerConfig::default()
                        .with_threshold(2)
                        .with_timeout(Duration::from_secs(30)),
                ),
            )
            .with_cache_store(store.clone())
            .with_clock(clock.clone())
            .build();
        Harness {
            pipeline: Arc::new(pipeline),
            mock,
            store,
            clock,
        }
    }

    fn request(body: Value) -> GenerateRequest {
        GenerateRequest::new(TenantContext::new("acme", "production"), "products", body)
    }

    #[tokio::test]
    async fn test_invalid_input_lists_every_issue() {
        let h = harness(MockGateway::fixed(r#"{"result":"ok"}"#), product_config());

        let resp = h.pipeline.handle(request(json!({"input": {"name": "ab"}}))).await;

        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.error_code(), Some("VALIDATION_ERROR"));
        let issues = resp.body["error"]["details"]["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0]["path"], json!(["name"]));
        assert_eq!(issues[1]["path"], json!(["price"]));
        assert!(issues[1]["message"].as_str().unwrap().contains("Required"));
        assert_eq!(h.mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_identical_request_is_cached() {
        let h = harness(MockGateway::fixed(r#"{"result":"ok"}"#), product_config());
        let body = json!({"input": {"name": "widget", "price": 9.5}});

        let first = h.pipeline.handle(request(body.clone())).await;
        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(first.body["meta"]["cached"], false);
        assert_eq!(first.body["meta"]["version"], "4");

        let second = h.pipeline.handle(request(body)).await;
        assert_eq!(second.body["meta"]["cached"], true);
        assert_eq!(second.body["data"], json!({"result": "ok"}));
        assert_eq!(h.mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_key_order_does_not_defeat_cache() {
        let h = harness(MockGateway::fixed(r#"{"result":"ok"}"#), product_config());
        h.pipeline
            .handle(request(json!({"input": {"name": "widget", "price": 1}})))
            .await;
        let resp = h
            .pipeline
            .handle(request(json!({"input": {"price": 1, "name": "widget"}})))
            .await;
        assert_eq!(resp.body["meta"]["cached"], true);
        assert_eq!(h.mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_fenced_output_is_parsed() {
        let h = harness(
            MockGateway::fixed("```json\n{\"result\":\"ok\"}\n```"),
            product_config(),
        );
        let resp = h
            .pipeline
            .handle(request(json!({"input": {"price": 3}})))
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["data"], json!({"result": "ok"}));
    }

    #[tokio::test]
    async fn test_no_cache_skips_read_but_writes() {
        let h = harness(
            MockGateway::new()
                .reply(r#"{"result":"first"}"#)
                .reply(r#"{"result":"second"}"#),
            product_config(),
        );
        let body = json!({"input": {"price": 3}});

        h.pipeline.handle(request(body.clone())).await;
        let forced = h
            .pipeline
            .handle(request(body.clone()).with_no_cache(true))
            .await;
        assert_eq!(forced.body["meta"]["cached"], false);
        assert_eq!(forced.body["data"]["result"], "second");

        let cached = h.pipeline.handle(request(body)).await;
        assert_eq!(cached.body["meta"]["cached"], true);
        assert_eq!(cached.body["data"]["result"], "second");
        assert_eq!(h.mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let h = harness(
            MockGateway::fixed(r#"{"result":"ok"}"#),
            product_config().with_cache_ttl(60),
        );
        let body = json!({"input": {"price": 3}});

        h.pipeline.handle(request(body.clone())).await;
        h.clock.advance(Duration::from_secs(61));
        let resp = h.pipeline.handle(request(body)).await;

        assert_eq!(resp.body["meta"]["cached"], false);
        assert_eq!(h.mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_writes() {
        let h = harness(
            MockGateway::fixed(r#"{"result":"ok"}"#),
            product_config().with_cache_enabled(false),
        );
        let body = json!({"input": {"price": 3}});
        h.pipeline.handle(request(body.clone())).await;
        h.pipeline.handle(request(body)).await;
        assert_eq!(h.mock.calls(), 2);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_open_circuit_returns_503_with_retry_after() {
        let h = harness(
            MockGateway::new().fail(LlmError::provider("upstream 500")),
            product_config(),
        );

        for price in [1, 2] {
            let resp = h
                .pipeline
                .handle(request(json!({"input": {"price": price}})))
                .await;
            assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(resp.error_code(), Some("LLM_ERROR"));
        }
        assert_eq!(h.pipeline.breaker().state(), CircuitState::Open);

        h.clock.advance(Duration::from_secs(12));
        let resp = h
            .pipeline
            .handle(request(json!({"input": {"price": 3}})))
            .await;
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.error_code(), Some("LLM_RATE_LIMITED"));
        assert_eq!(resp.retry_after, Some(18));
        assert_eq!(h.mock.calls(), 2);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_output_is_500_and_not_cached() {
        let h = harness(MockGateway::fixed("no json here"), product_config());
        let resp = h
            .pipeline
            .handle(request(json!({"input": {"price": 3}})))
            .await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.error_code(), Some("OUTPUT_PARSE_FAILED"));
        assert_eq!(h.mock.calls(), 2);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_process_and_bad_body() {
        let h = harness(MockGateway::fixed("{}"), product_config());

        let resp = h
            .pipeline
            .handle(GenerateRequest::new(
                TenantContext::new("acme", "staging"),
                "products",
                json!({"input": {}}),
            ))
            .await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(resp.error_code(), Some("PROCESS_NOT_FOUND"));

        let resp = h.pipeline.handle(request(json!({"price": 3}))).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.error_code(), Some("INVALID_REQUEST"));
    }

    #[tokio::test]
    async fn test_repository_failure_is_internal_error() {
        let repository = StaticRepository {
            broken: true,
            ..StaticRepository::default()
        };
        let pipeline = RequestPipeline::builder(Arc::new(repository), Arc::new(MockGateway::new()))
            .with_config(PipelineConfig::default())
            .build();
        let resp = pipeline.handle(request(json!({"input": {}}))).await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.error_code(), Some("INTERNAL_ERROR"));
    }

    #[tokio::test]
    async fn test_request_id_echoed_or_generated() {
        let h = harness(MockGateway::fixed(r#"{"result":"ok"}"#), product_config());

        let resp = h
            .pipeline
            .handle(request(json!({"input": {"price": 1}})).with_request_id("req-42"))
            .await;
        assert_eq!(resp.body["meta"]["request_id"], "req-42");

        let resp = h
            .pipeline
            .handle(request(json!({"input": {"price": 2}})))
            .await;
        let generated = resp.body["meta"]["request_id"].as_str().unwrap();
        assert!(Uuid::parse_str(generated).is_ok());
    }

    #[tokio::test]
    async fn test_spawned_request_completes_after_handle_dropped() {
        let h = harness(
            MockGateway::fixed(r#"{"result":"ok"}"#).with_delay(Duration::from_millis(20)),
            product_config(),
        );

        let handle = h.pipeline.spawn(request(json!({"input": {"price": 5}})));
        drop(handle);

        for _ in 0..100 {
            if !h.store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.store.len(), 1);

        let resp = h
            .pipeline
            .spawn(request(json!({"input": {"price": 5}})))
            .await
            .unwrap();
        assert_eq!(resp.body["meta"]["cached"], true);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_breaker() {
        let h = harness(
            MockGateway::new().fail(LlmError::timeout(Duration::from_secs(1))),
            product_config(),
        );
        let handles: Vec<_> = (0..4)
            .map(|i| h.pipeline.spawn(request(json!({"input": {"price": i}}))))
            .collect();
        let responses = futures::future::join_all(handles).await;

        assert!(responses
            .into_iter()
            .all(|r| r.unwrap().status == StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(h.pipeline.breaker().state(), CircuitState::Open);
        assert!(h.mock.calls() >= 2);
    }
}
