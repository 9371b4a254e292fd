//! # LLM Relay
//!
//! Stateful LLM gateway: per request it selects the best upstream provider
//! under cost/latency/quality/budget constraints, augments prompts with
//! retrieved context, orchestrates tool invocations, and caches responses.
//!
//! This binary is the composition root: it loads configuration, builds every
//! service, injects dependencies, starts the health checker, and serves HTTP.

use relay_providers::client_for_model;
use relay_retrieval::{CachedEmbedder, ContextRetriever, Embedder, OpenAiEmbeddings, PineconeIndex};
use relay_routing::{PromptAnalyzer, Router, RouterConfig};
use relay_server::config::ROUTER_CONFIG_PATH;
use relay_server::health::spawn_health_checker;
use relay_server::{create_router, AppConfig, AppState};
use relay_store::{Profiler, ResponseCache, SessionStore};
use relay_tools::{CalculatorTool, NewsTool, ToolRegistry, WeatherTool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Container deployments pass configuration directly; .env is for local
    // development only.
    if std::env::var("APP_ENV").as_deref() != Ok("production") && dotenvy::dotenv().is_err() {
        eprintln!("no .env file found, relying on process environment");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting LLM relay");

    if let Err(e) = run().await {
        error!(error = %e, "gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(AppConfig::from_env()?);
    let router_config = Arc::new(RouterConfig::load(ROUTER_CONFIG_PATH)?);
    info!(models = config.enabled_models.len(), "configuration loaded");

    let conn = relay_store::connect(&config.redis_addr).await?;
    info!(addr = %config.redis_addr, "connected to Redis");

    // Model clients, one per enabled model with a configured key.
    let mut clients = HashMap::new();
    for (model_id, api_key) in &config.api_keys {
        match client_for_model(model_id, api_key) {
            Ok(client) => {
                clients.insert(model_id.clone(), client);
            }
            Err(e) => warn!(model = %model_id, error = %e, "skipping model"),
        }
    }
    let clients = Arc::new(clients);
    info!(count = clients.len(), "model clients initialized");

    let profiler = Profiler::new(conn.clone(), Arc::new(config.model_costs.clone()));
    let router = Arc::new(Router::new(profiler.clone(), router_config.clone()));

    let embedder: Arc<dyn Embedder> = Arc::new(CachedEmbedder::new(
        Arc::new(OpenAiEmbeddings::new(config.embedding_api_key.clone())?),
        conn.clone(),
    ));
    let index = Arc::new(PineconeIndex::new(
        config.vector_index_host.clone(),
        config.vector_index_api_key.clone(),
    )?);
    let retriever = Arc::new(ContextRetriever::new(
        embedder,
        index,
        router_config.pre_check_thresholds.relevance_threshold,
    ));

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(CalculatorTool::new()));
    tools.register(Arc::new(WeatherTool::new()));
    if config.news_api_key.is_empty() {
        warn!("NEWS_API_KEY not set, news tool disabled");
    } else {
        tools.register(Arc::new(NewsTool::new(config.news_api_key.clone())?));
    }
    info!(count = tools.len(), "tool registry initialized");

    let state = AppState {
        clients: clients.clone(),
        profiler: profiler.clone(),
        router,
        retriever,
        tools: Arc::new(tools),
        sessions: SessionStore::new(conn.clone()),
        cache: ResponseCache::new(conn),
        analyzer: PromptAnalyzer::new(),
        config: config.clone(),
        router_config,
    };

    let checker = spawn_health_checker(clients, config.enabled_models.clone(), profiler);

    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "gateway is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    checker.abort();
    info!("server exited gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
}
