//! Shared application state.
//!
//! Everything here is either an immutable snapshot built at startup or a
//! handle into the key-value store; no request-visible mutable state lives in
//! process.

use crate::config::AppConfig;
use relay_providers::ModelClient;
use relay_retrieval::ContextRetriever;
use relay_routing::{PromptAnalyzer, Router, RouterConfig};
use relay_store::{Profiler, ResponseCache, SessionStore};
use relay_tools::ToolRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Model clients, keyed by model id.
    pub clients: Arc<HashMap<String, Arc<dyn ModelClient>>>,
    /// Shared model profiler.
    pub profiler: Profiler,
    /// Model router.
    pub router: Arc<Router>,
    /// Context retriever.
    pub retriever: Arc<ContextRetriever>,
    /// Tool registry for the tool loop.
    pub tools: Arc<ToolRegistry>,
    /// Session store.
    pub sessions: SessionStore,
    /// Response cache.
    pub cache: ResponseCache,
    /// Prompt complexity analyzer.
    pub analyzer: PromptAnalyzer,
    /// Environment configuration snapshot.
    pub config: Arc<AppConfig>,
    /// Router configuration snapshot.
    pub router_config: Arc<RouterConfig>,
}
