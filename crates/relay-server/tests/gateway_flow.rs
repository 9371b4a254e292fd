//! End-to-end request flows through the gateway router.
//!
//! Providers are wiremock servers; state lives in a real Redis, so these are
//! ignored by default and run with `cargo test -- --ignored` when a local
//! Redis is available.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use relay_core::{CacheStatus, GenerateResponse};
use relay_providers::retry::RetryPolicy;
use relay_providers::{ModelClient, OpenAiClient};
use relay_retrieval::{ContextRetriever, Embedder, VectorIndex, VectorMatch};
use relay_routing::{PromptAnalyzer, Router, RouterConfig};
use relay_server::{create_router, AppConfig, AppState};
use relay_store::{CostTable, Profiler, ResponseCache, SessionStore, TokenCosts};
use relay_tools::{CalculatorTool, ToolRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROUTER_YAML: &str = r#"
pre_check_thresholds:
  relevance_threshold: 0.75
  max_error_rate: 0.5
  min_request_count: 10
  health_check_staleness: 10m
models:
  gpt-4o:
    quality_score: 9.0
    coding_score: 9.5
strategies:
  default:
    quality_weight: 0.5
    cost_weight: 0.3
    latency_weight: 0.2
  balanced:
    quality_weight: 0.34
    cost_weight: 0.33
    latency_weight: 0.33
  cost:
    quality_weight: 0.1
    cost_weight: 0.8
    latency_weight: 0.1
  max_quality:
    quality_weight: 1.0
    cost_weight: 0.0
    latency_weight: 0.0
  best-for-coding:
    use_coding_score: true
    quality_weight: 0.8
    cost_weight: 0.1
    latency_weight: 0.1
"#;

struct NullEmbedder;

#[async_trait::async_trait]
impl Embedder for NullEmbedder {
    async fn embed(&self, _text: &str) -> relay_core::RelayResult<Vec<f32>> {
        Ok(vec![0.0; 8])
    }
}

struct NullIndex;

#[async_trait::async_trait]
impl VectorIndex for NullIndex {
    async fn query(
        &self,
        _vector: &[f32],
        _top_k: usize,
    ) -> relay_core::RelayResult<Vec<VectorMatch>> {
        Ok(Vec::new())
    }
}

async fn build_state(provider: &MockServer) -> AppState {
    let conn = relay_store::connect("127.0.0.1:6379")
        .await
        .expect("requires Redis");

    let mut costs = CostTable::new();
    costs.insert(
        "gpt-4o".to_string(),
        TokenCosts {
            input: 2.5 / 1e6,
            output: 10.0 / 1e6,
        },
    );
    let costs = Arc::new(costs);

    let client = OpenAiClient::new("test-key")
        .expect("client")
        .with_base_url(provider.uri())
        .with_retry_policy(RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
        });
    let mut clients: HashMap<String, Arc<dyn ModelClient>> = HashMap::new();
    clients.insert("gpt-4o".to_string(), Arc::new(client));

    let profiler = Profiler::new(conn.clone(), costs);
    // Make sure the model's profile exists and is fresh before routing.
    profiler.on_health_check("gpt-4o", true).await;

    let router_config = Arc::new(RouterConfig::from_yaml(ROUTER_YAML).expect("router config"));
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(CalculatorTool::new()));

    AppState {
        clients: Arc::new(clients),
        profiler: profiler.clone(),
        router: Arc::new(Router::new(profiler, router_config.clone())),
        retriever: Arc::new(ContextRetriever::new(
            Arc::new(NullEmbedder),
            Arc::new(NullIndex),
            router_config.pre_check_thresholds.relevance_threshold,
        )),
        tools: Arc::new(tools),
        sessions: SessionStore::new(conn.clone()),
        cache: ResponseCache::new(conn),
        analyzer: PromptAnalyzer::new(),
        config: Arc::new(AppConfig {
            enabled_models: vec!["gpt-4o".to_string()],
            ..AppConfig::default()
        }),
        router_config,
    }
}

async fn post_generate(state: AppState, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let app = create_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/generate")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
#[ignore = "requires Redis at 127.0.0.1:6379"]
async fn cache_miss_then_hit() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "Goroutines multiplexed onto OS threads."}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 6, "total_tokens": 15}
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let state = build_state(&provider).await;
    // Unique prompt per run so a cache entry from an earlier run cannot turn
    // the first request into a HIT.
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let body =
        serde_json::json!({"prompt": format!("How does Go handle concurrency? ({nonce})")});

    let (status, first) = post_generate(state.clone(), body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let first: GenerateResponse = serde_json::from_value(first).unwrap();
    assert_eq!(first.model_used, "gpt-4o");

    let (status, second) = post_generate(state, body).await;
    assert_eq!(status, StatusCode::OK);
    let second: GenerateResponse = serde_json::from_value(second).unwrap();
    assert_eq!(second.content, first.content);
    assert_eq!(second.cache_status, CacheStatus::Hit);
}

#[tokio::test]
#[ignore = "requires Redis at 127.0.0.1:6379"]
async fn calculator_prompt_runs_the_tool_loop() {
    let provider = MockServer::start().await;

    // First turn: the model asks for the calculator.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "tool_choice": "auto"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "",
                "tool_calls": [{"id": "call_1", "type": "function",
                    "function": {"name": "calculate",
                                 "arguments": "{\"operand1\":12,\"operator\":\"*\",\"operand2\":7}"}}]}}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
        })))
        .up_to_n_times(1)
        .mount(&provider)
        .await;

    // Second turn: the model reads the tool result and answers.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "12 * 7 is 84."}}],
            "usage": {"prompt_tokens": 35, "completion_tokens": 8, "total_tokens": 43}
        })))
        .mount(&provider)
        .await;

    let state = build_state(&provider).await;
    let (status, body) = post_generate(
        state,
        serde_json::json!({"prompt": "what is 12 * 7? (tool flow test)"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let response: GenerateResponse = serde_json::from_value(body).unwrap();
    assert!(response.content.contains("84"));
    // Usage accumulates across both turns.
    assert_eq!(response.usage.total_tokens, 73);
    assert!(!response.rag_context_used);
}

#[tokio::test]
#[ignore = "requires Redis at 127.0.0.1:6379"]
async fn forcing_an_offline_model_yields_424_with_alternatives() {
    let provider = MockServer::start().await;
    let state = build_state(&provider).await;
    state.profiler.on_health_check("m-offline-flow", false).await;

    let (status, body) = post_generate(
        state,
        serde_json::json!({
            "conversation_id": "conv-force-flow",
            "prompt": "hello there",
            "config": {"force_model": "m-offline-flow"}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::FAILED_DEPENDENCY);
    assert_eq!(
        body["error"],
        "The requested model 'm-offline-flow' is currently offline."
    );
    let alternatives: Vec<String> =
        serde_json::from_value(body["available_models"].clone()).unwrap();
    assert!(alternatives.contains(&"gpt-4o".to_string()));
}

#[tokio::test]
#[ignore = "requires Redis at 127.0.0.1:6379"]
async fn forced_session_failover_keeps_the_original_pin() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "standing in for the locked model"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 5, "total_tokens": 10}
        })))
        .mount(&provider)
        .await;

    let state = build_state(&provider).await;
    state.sessions.pin("conv-forced-flow", "m-down-flow", true).await;
    state.profiler.on_health_check("m-down-flow", false).await;

    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let (status, body) = post_generate(
        state.clone(),
        serde_json::json!({
            "conversation_id": "conv-forced-flow",
            "prompt": format!("tell me about goroutines ({nonce})")
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let response: GenerateResponse = serde_json::from_value(body).unwrap();
    let failover = response.failover_info.expect("failover info");
    assert_eq!(failover.original_model, "m-down-flow");
    assert_eq!(failover.new_model, "gpt-4o");
    assert_eq!(response.model_used, "gpt-4o");

    // The forced pin survives: the next request retries the locked model.
    let session = state
        .sessions
        .get("conv-forced-flow")
        .await
        .unwrap()
        .expect("session");
    assert_eq!(session.model_id, "m-down-flow");
    assert!(session.is_forced);
}

#[tokio::test]
#[ignore = "requires Redis at 127.0.0.1:6379"]
async fn malformed_json_is_a_400() {
    let provider = MockServer::start().await;
    let state = build_state(&provider).await;

    let app = create_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/generate")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
