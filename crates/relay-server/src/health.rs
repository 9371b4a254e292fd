//! Background health checker.
//!
//! Probes every configured model with a trivial prompt on startup and every
//! five minutes after, reporting outcomes to the profiler. One model's
//! failure never stops the sweep, and the task shares no memory with request
//! handlers; everything flows through the store.

use relay_core::{GenerationConfig, Message};
use relay_providers::ModelClient;
use relay_store::Profiler;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Probe prompt. Any coherent answer proves the model is reachable.
pub const HEALTH_CHECK_PROMPT: &str = "What is the capital of India?";

const CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
const PER_MODEL_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_MAX_TOKENS: u32 = 5;

/// Spawn the checker. The returned handle aborts the task when dropped by
/// the caller at shutdown.
pub fn spawn_health_checker(
    clients: Arc<HashMap<String, Arc<dyn ModelClient>>>,
    models: Vec<String>,
    profiler: Profiler,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("health checker started");
        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            // The first tick fires immediately, giving a startup sweep.
            ticker.tick().await;
            run_sweep(&clients, &models, &profiler).await;
        }
    })
}

async fn run_sweep(
    clients: &HashMap<String, Arc<dyn ModelClient>>,
    models: &[String],
    profiler: &Profiler,
) {
    for model_id in models {
        let Some(client) = clients.get(model_id) else {
            continue;
        };

        let config = GenerationConfig {
            model: model_id.clone(),
            max_tokens: PROBE_MAX_TOKENS,
            ..GenerationConfig::default()
        };
        let probe = [Message::user(HEALTH_CHECK_PROMPT)];

        let healthy = matches!(
            tokio::time::timeout(PER_MODEL_TIMEOUT, client.generate(&probe, &config, &[])).await,
            Ok(Ok(_))
        );

        profiler.on_health_check(model_id, healthy).await;
        info!(model = %model_id, healthy, "health check");
    }
}
