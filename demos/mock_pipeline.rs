//! Example: serving requests end to end with a scripted gateway.
//!
//! Run with: `cargo run --example mock_pipeline`

use intelligence_pipeline::pipeline::{GenerateRequest, ProcessRepository};
use intelligence_pipeline::types::{ActiveVersion, ProcessConfig, TenantContext};
use intelligence_pipeline::{InMemoryCacheStore, MockGateway, PipelineConfig, RequestPipeline};
use serde_json::json;
use std::sync::Arc;

struct SingleProcess(ActiveVersion);

#[async_trait::async_trait]
impl ProcessRepository for SingleProcess {
    async fn find_active_version(
        &self,
        _process_id: &str,
        _tenant_id: &str,
        _environment: &str,
    ) -> anyhow::Result<Option<ActiveVersion>> {
        Ok(Some(self.0.clone()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ProcessConfig::new(
        "You grade movie reviews for {site}.",
        "Rate the review from 0 to 10",
    )
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "site": {"type": "string"},
            "review": {"type": "string", "minLength": 10}
        },
        "required": ["review"]
    }))
    .with_output_schema(json!({
        "type": "object",
        "properties": {"rating": {"type": "number", "minimum": 0, "maximum": 10}},
        "required": ["rating"]
    }));

    // First reply is fenced, which the parser unwraps
    let gateway = MockGateway::fixed("```json\n{\"rating\": 8.5}\n```");

    let pipeline = RequestPipeline::builder(
        Arc::new(SingleProcess(ActiveVersion {
            version: "3".into(),
            config,
        })),
        Arc::new(gateway),
    )
    .with_config(PipelineConfig::from_env())
    .with_cache_store(Arc::new(InMemoryCacheStore::new()))
    .build();
    let pipeline = Arc::new(pipeline);

    let tenant = TenantContext::new("acme", "production");
    let body = json!({"input": {"site": "reelviews", "review": "Long, loud and oddly moving."}});

    for _ in 0..2 {
        let resp = pipeline
            .spawn(GenerateRequest::new(tenant.clone(), "review-grader", body.clone()))
            .await?;
        println!("{} {}", resp.status, serde_json::to_string_pretty(&resp.body)?);
    }

    // Invalid input never reaches the gateway
    let resp = pipeline
        .handle(GenerateRequest::new(
            tenant,
            "review-grader",
            json!({"input": {"review": "meh"}}),
        ))
        .await;
    println!("{} {}", resp.status, resp.body["error"]);

    println!("breaker: {:?}", pipeline.breaker().state());
    Ok(())
}
