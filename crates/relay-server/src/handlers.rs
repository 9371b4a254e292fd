//! The request orchestrator.
//!
//! Per request: versioned cache lookup, session resolution, intent
//! classification, then either the tool loop or retrieval-and-generate,
//! profile updates, and a best-effort cache write.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use relay_core::{
    versioned_cache_key, CacheStatus, FailoverInfo, GenerateRequest, GenerateResponse,
    GenerationConfig, HistoryMessage, Message, RelayError, RelayResult, Role, Usage,
};
use relay_routing::Intent;
use relay_store::ModelStatus;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// The tool loop always runs on this model, bypassing router scoring. The
/// routed model still owns the request's profile updates and shows up as
/// `model_used`.
pub const TOOL_LOOP_MODEL: &str = "gpt-4o";

/// Upper bound on provider turns inside one tool loop.
const MAX_TOOL_CALLS: usize = 5;

/// Matches retrieved per retrieval pass.
const RAG_TOP_K: usize = 2;

const RESPONSE_CACHE_PREFIX: &str = "llmcache";

/// Liveness probe body.
#[derive(Serialize)]
pub struct HealthBody {
    /// Always "ok" when the process is serving.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /api/v1/generate`
#[instrument(skip_all)]
pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let started = Instant::now();
    let Json(mut request) =
        body.map_err(|e| ApiError::BadRequest(format!("Invalid request: {e}")))?;
    if request.prompt.is_empty() {
        return Err(ApiError::BadRequest("prompt is required".to_string()));
    }

    info!(
        user = %request.user_id,
        conversation = %request.conversation_id,
        "handling generation request"
    );

    let cache_key = versioned_cache_key(RESPONSE_CACHE_PREFIX, &request.prompt);
    if let Some(cached) = state.cache.check(&cache_key).await {
        match serde_json::from_str::<GenerateResponse>(&cached) {
            Ok(mut response) => {
                debug!("response cache HIT");
                response.cache_status = CacheStatus::Hit;
                response.latency_ms = started.elapsed().as_millis() as i64;
                return Ok(Json(response));
            }
            Err(e) => warn!(error = %e, "discarding undecodable cached response"),
        }
    }
    debug!("response cache MISS");

    let (model_id, failover_info) = resolve_model(&state, &mut request).await?;

    let intent = Intent::classify(&request.prompt);
    debug!(?intent, model = %model_id, "classified intent");

    let (content, usage, rag_context_used) = if intent.uses_tools() {
        let (content, usage) = run_tool_loop(&state, &request).await.map_err(ApiError::from)?;
        (content, usage, false)
    } else {
        run_rag_generate(&state, &request, &model_id)
            .await
            .map_err(ApiError::from)?
    };

    let latency = started.elapsed();
    state.profiler.on_success(&model_id, latency, usage).await;

    let response = GenerateResponse {
        content,
        model_used: model_id,
        usage,
        latency_ms: latency.as_millis() as i64,
        rag_context_used,
        cache_status: CacheStatus::Miss,
        failover_info,
    };

    match serde_json::to_string(&response) {
        Ok(encoded) => state.cache.put(&cache_key, &encoded).await,
        Err(e) => warn!(error = %e, "failed to serialize response for caching"),
    }

    Ok(Json(response))
}

/// Resolve which model serves this request: session affinity first, then the
/// forced-chat path, then the router. May rewrite `request.config.preference`
/// (forced failover, derived preference).
async fn resolve_model(
    state: &AppState,
    request: &mut GenerateRequest,
) -> Result<(String, Option<FailoverInfo>), ApiError> {
    let mut failover_info: Option<FailoverInfo> = None;
    let mut forced_failover = false;

    // Existing conversation: honor the pin while its model is healthy.
    if !request.conversation_id.is_empty() {
        if let Ok(Some(session)) = state.sessions.get(&request.conversation_id).await {
            let pinned = session.model_id.clone();
            let pinned_online = matches!(
                state.profiler.get_profile(&pinned).await,
                Ok(profile) if profile.status == ModelStatus::Online
            );

            if session.is_forced {
                if pinned_online {
                    debug!(model = %pinned, "forced session hit");
                    state.sessions.refresh_ttl(&request.conversation_id).await;
                    return Ok((pinned, None));
                }
                // Forced failover: route at max quality but leave the session
                // pinned, so the next request retries the locked model.
                warn!(model = %pinned, "forced-pinned model offline, failing over");
                request.config.preference = "max_quality".to_string();
                forced_failover = true;
                failover_info = Some(FailoverInfo {
                    original_model: pinned.clone(),
                    new_model: String::new(),
                    reason: format!("Model '{pinned}' was offline."),
                });
            } else if pinned_online {
                if request.config.preference.is_empty() {
                    debug!(model = %pinned, "dynamic session hit");
                    state.sessions.refresh_ttl(&request.conversation_id).await;
                    return Ok((pinned, None));
                }
                debug!("preference override in dynamic session, re-routing");
            } else {
                warn!(model = %pinned, "pinned model offline, failing over");
                failover_info = Some(FailoverInfo {
                    original_model: pinned.clone(),
                    new_model: String::new(),
                    reason: format!("Model '{pinned}' was offline."),
                });
            }
        }
    }

    // Starting a new forced chat.
    if !request.conversation_id.is_empty() && !request.config.force_model.is_empty() {
        let forced = request.config.force_model.clone();
        let online = matches!(
            state.profiler.get_profile(&forced).await,
            Ok(profile) if profile.status == ModelStatus::Online
        );
        if !online {
            return Err(ApiError::FailedDependency {
                message: format!("The requested model '{forced}' is currently offline."),
                available_models: healthy_alternatives(state, &forced).await,
            });
        }
        state.sessions.pin(&request.conversation_id, &forced, true).await;
        return Ok((forced, None));
    }

    // Routing path: new dynamic chats, one-off queries, and failovers.
    if request.config.preference.is_empty() {
        request.config.preference = state.analyzer.analyze(&request.prompt).to_string();
        debug!(preference = %request.config.preference, "derived preference from prompt");
    }

    let prompt_tokens = estimate_prompt_tokens(request);
    let model_id = state
        .router
        .select_optimal(
            &state.config.enabled_models,
            &request.config.preference,
            prompt_tokens,
            &state.config.model_budgets,
        )
        .await
        .map_err(ApiError::from)?;

    if let Some(info) = failover_info.as_mut() {
        info.new_model = model_id.clone();
    }

    // A forced chat keeps its original pin through a failover, so the next
    // request retries the locked model.
    if !request.conversation_id.is_empty() && !forced_failover {
        state.sessions.pin(&request.conversation_id, &model_id, false).await;
    }

    Ok((model_id, failover_info))
}

/// Online models other than `failed_model`, for the 424 body.
async fn healthy_alternatives(state: &AppState, failed_model: &str) -> Vec<String> {
    let mut healthy = Vec::new();
    for model in &state.config.enabled_models {
        if model == failed_model {
            continue;
        }
        if let Ok(profile) = state.profiler.get_profile(model).await {
            if profile.status == ModelStatus::Online {
                healthy.push(model.clone());
            }
        }
    }
    healthy
}

/// Input-token estimate for routing: prompt plus history at four bytes per
/// token.
fn estimate_prompt_tokens(request: &GenerateRequest) -> u32 {
    let total: usize = request.prompt.len()
        + request
            .history
            .iter()
            .map(|m| m.content.len())
            .sum::<usize>();
    (total / 4) as u32
}

fn history_messages(history: &[HistoryMessage]) -> Vec<Message> {
    history
        .iter()
        .map(|m| Message {
            role: match m.role.as_str() {
                "system" => Role::System,
                "assistant" => Role::Assistant,
                "tool" => Role::Tool,
                _ => Role::User,
            },
            content: m.content.clone(),
            tool_call_id: None,
            tool_calls: None,
        })
        .collect()
}

fn generation_config(request: &GenerateRequest, model: &str) -> GenerationConfig {
    GenerationConfig {
        model: model.to_string(),
        max_tokens: request.config.max_tokens,
        temperature: request.config.temperature,
        top_p: request.config.top_p,
        stream: request.config.stream,
    }
}

/// Retrieval-and-generate path: augment the prompt when context is relevant,
/// then call the routed model with the conversation history.
async fn run_rag_generate(
    state: &AppState,
    request: &GenerateRequest,
    model_id: &str,
) -> RelayResult<(String, Usage, bool)> {
    let retrieval = state
        .retriever
        .retrieve_augmented(&request.prompt, RAG_TOP_K)
        .await?;

    let client = state
        .clients
        .get(model_id)
        .ok_or_else(|| RelayError::internal(format!("no client available for model {model_id}")))?;

    let mut messages = history_messages(&request.history);
    messages.push(Message::user(retrieval.prompt));

    match client
        .generate(&messages, &generation_config(request, model_id), &[])
        .await
    {
        Ok(result) => Ok((result.content, result.usage, retrieval.used)),
        Err(e) => {
            state.profiler.on_failure(model_id).await;
            Err(RelayError::internal(format!(
                "generation failed for model {model_id}: {e}"
            )))
        }
    }
}

/// Tool loop: give the tool-capable model the registry's definitions, execute
/// whatever it calls, feed results back, and stop when it answers in prose.
/// Usage accumulates across iterations.
async fn run_tool_loop(state: &AppState, request: &GenerateRequest) -> RelayResult<(String, Usage)> {
    let client = state.clients.get(TOOL_LOOP_MODEL).ok_or_else(|| {
        RelayError::internal(format!(
            "tool-capable model '{TOOL_LOOP_MODEL}' is not available or enabled"
        ))
    })?;

    let definitions = state.tools.definitions();
    let config = generation_config(request, TOOL_LOOP_MODEL);
    let mut messages = history_messages(&request.history);
    messages.push(Message::user(request.prompt.clone()));
    let mut total_usage = Usage::default();

    for _ in 0..MAX_TOOL_CALLS {
        let result = match client.generate(&messages, &config, &definitions).await {
            Ok(result) => result,
            Err(e) => {
                state.profiler.on_failure(TOOL_LOOP_MODEL).await;
                return Err(RelayError::internal(format!(
                    "generation failed during tool loop: {e}"
                )));
            }
        };
        total_usage.add(result.usage);

        if result.tool_calls.is_empty() {
            debug!("model answered without tool calls, exiting tool loop");
            return Ok((result.content, total_usage));
        }

        messages.push(Message::assistant_with_tool_calls(
            result.content.clone(),
            result.tool_calls.clone(),
        ));

        for call in &result.tool_calls {
            info!(
                tool = %call.function.name,
                id = %call.id,
                "executing tool call"
            );
            let output = match state
                .tools
                .execute(&call.function.name, &call.function.arguments)
                .await
            {
                Ok(text) => text,
                Err(e) => format!("Error executing tool {}: {e}", call.function.name),
            };
            messages.push(Message::tool(call.id.clone(), output));
        }
    }

    Err(RelayError::ToolLoopExceeded)
}
