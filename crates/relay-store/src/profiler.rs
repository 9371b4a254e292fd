//! Per-model rolling performance, cost, and health profiles.
//!
//! One `profile:<model_id>` hash per model holds EWMA latency, success and
//! failure counters, token counters, status and the last health-check time.
//! Monthly spend lives in a separate `cost:<model_id>:<YYYY-MM>` counter with
//! a TTL just past the month boundary, so budget state ages out on its own.
//!
//! Concurrency: counter updates run in a single atomic pipeline. The latency
//! EWMA is a read-modify-write under a conditional (compare-and-set) script;
//! a sample lost to a concurrent writer is acceptable at α = 0.1.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use relay_core::{RelayError, RelayResult, Usage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// EWMA smoothing factor for latency.
pub const EWMA_ALPHA: f64 = 0.1;

/// Latency seeded into a freshly created profile.
const DEFAULT_LATENCY_MS: i64 = 2000;

/// TTL on monthly cost counters: the month plus a safety margin.
const COST_TTL_SECS: i64 = 35 * 24 * 60 * 60;

/// Conditional write for the EWMA field: only applies the new value if the
/// field still holds the value the update was computed from.
static LATENCY_CAS: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r"
        local current = redis.call('HGET', KEYS[1], 'avg_latency_ms')
        if current == false then current = '' end
        if current == ARGV[1] then
            redis.call('HSET', KEYS[1], 'avg_latency_ms', ARGV[2])
            return 1
        end
        return 0
        ",
    )
});

/// Health of a model as tracked by the profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    /// Serving normally.
    Online,
    /// Recent failures observed; still eligible for routing, unfavored via
    /// the error-rate filter.
    Degraded,
    /// A health probe failed; excluded from routing.
    Offline,
}

impl ModelStatus {
    /// Stable string form, as persisted in the profile hash.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        }
    }

    /// Parse the persisted form. Unknown values read as degraded, which keeps
    /// a corrupted status out of pinned sessions without excluding the model
    /// from routing outright.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "online" => Self::Online,
            "offline" => Self::Offline,
            _ => Self::Degraded,
        }
    }
}

/// Per-token prices for one model, in USD.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCosts {
    /// USD per input token.
    pub input: f64,
    /// USD per output token.
    pub output: f64,
}

/// Per-token price table, keyed by model id. Built once at startup from
/// configuration and never mutated.
pub type CostTable = HashMap<String, TokenCosts>;

/// Rolling profile of one model.
#[derive(Debug, Clone)]
pub struct ModelProfile {
    /// Model this profile belongs to.
    pub model_id: String,
    /// Exponentially weighted moving average of observed latency.
    pub avg_latency_ms: i64,
    /// USD per input token.
    pub cost_per_input_token: f64,
    /// USD per output token.
    pub cost_per_output_token: f64,
    /// Current health.
    pub status: ModelStatus,
    /// failures / (successes + failures), recomputed on every update.
    pub error_rate: f64,
    /// Lifetime successful generations.
    pub total_successes: i64,
    /// Lifetime failed generations.
    pub total_failures: i64,
    /// Lifetime input tokens.
    pub total_input_tokens: i64,
    /// Lifetime output tokens.
    pub total_output_tokens: i64,
    /// When the background checker last probed this model.
    pub last_health_check: DateTime<Utc>,
    /// USD spent this calendar month.
    pub cost_spent_monthly: f64,
}

/// The latency value an EWMA update produces.
#[must_use]
pub fn ewma(previous: i64, observed_ms: i64) -> i64 {
    (EWMA_ALPHA * observed_ms as f64 + (1.0 - EWMA_ALPHA) * previous as f64).round() as i64
}

/// Month-scoped cost counter key for `model_id` at `now`.
#[must_use]
pub fn month_cost_key(model_id: &str, now: DateTime<Utc>) -> String {
    format!("cost:{}:{}", model_id, now.format("%Y-%m"))
}

fn profile_key(model_id: &str) -> String {
    format!("profile:{model_id}")
}

/// Redis-backed model profiler.
#[derive(Clone)]
pub struct Profiler {
    conn: ConnectionManager,
    costs: Arc<CostTable>,
}

impl Profiler {
    /// Create a profiler over an established connection and the startup cost
    /// table.
    #[must_use]
    pub fn new(conn: ConnectionManager, costs: Arc<CostTable>) -> Self {
        Self { conn, costs }
    }

    fn costs_for(&self, model_id: &str) -> TokenCosts {
        self.costs.get(model_id).copied().unwrap_or_else(|| {
            warn!(model = model_id, "no cost configuration for model, defaulting to zero");
            TokenCosts::default()
        })
    }

    /// Fetch a model's profile, creating a default one if none exists.
    /// Creation is idempotent: a concurrent creator just rewrites the same
    /// defaults.
    ///
    /// # Errors
    /// Returns a store error on Redis failures.
    pub async fn get_profile(&self, model_id: &str) -> RelayResult<ModelProfile> {
        let key = profile_key(model_id);
        let mut conn = self.conn.clone();

        let fields: HashMap<String, String> = conn
            .hgetall(&key)
            .await
            .map_err(|e| RelayError::store(format!("HGETALL {key} failed: {e}")))?;

        if fields.is_empty() {
            return self.create_default_profile(model_id).await;
        }

        let mut profile = parse_profile(model_id, &fields);

        let cost_key = month_cost_key(model_id, Utc::now());
        let spent: Option<f64> = conn
            .get(&cost_key)
            .await
            .map_err(|e| RelayError::store(format!("GET {cost_key} failed: {e}")))?;
        profile.cost_spent_monthly = spent.unwrap_or(0.0);

        Ok(profile)
    }

    async fn create_default_profile(&self, model_id: &str) -> RelayResult<ModelProfile> {
        let costs = self.costs_for(model_id);
        let now = Utc::now();
        let profile = ModelProfile {
            model_id: model_id.to_string(),
            avg_latency_ms: DEFAULT_LATENCY_MS,
            cost_per_input_token: costs.input,
            cost_per_output_token: costs.output,
            status: ModelStatus::Online,
            error_rate: 0.0,
            total_successes: 1,
            total_failures: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            last_health_check: now,
            cost_spent_monthly: 0.0,
        };

        let key = profile_key(model_id);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset(&key, "model_id", &profile.model_id)
            .hset(&key, "avg_latency_ms", profile.avg_latency_ms)
            .hset(&key, "cost_per_input_token", profile.cost_per_input_token)
            .hset(&key, "cost_per_output_token", profile.cost_per_output_token)
            .hset(&key, "status", profile.status.as_str())
            .hset(&key, "error_rate", profile.error_rate)
            .hset(&key, "total_successes", profile.total_successes)
            .hset(&key, "total_failures", profile.total_failures)
            .hset(&key, "total_input_tokens", profile.total_input_tokens)
            .hset(&key, "total_output_tokens", profile.total_output_tokens)
            .hset(&key, "last_health_check", profile.last_health_check.to_rfc3339())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| RelayError::store(format!("profile create for {model_id} failed: {e}")))?;

        debug!(model = model_id, "created default profile");
        Ok(profile)
    }

    /// Record a successful generation: fold the observed latency into the
    /// EWMA, bump counters, mark the model online, and add the call's cost to
    /// the monthly counter.
    pub async fn on_success(&self, model_id: &str, latency: Duration, usage: Usage) {
        if let Err(e) = self.apply_success(model_id, latency, usage).await {
            warn!(model = model_id, error = %e, "profile success update failed");
        }
    }

    async fn apply_success(
        &self,
        model_id: &str,
        latency: Duration,
        usage: Usage,
    ) -> RelayResult<()> {
        let key = profile_key(model_id);
        let mut conn = self.conn.clone();

        // Latency EWMA under optimistic concurrency: read, compute, write only
        // if unchanged. A lost race drops this sample.
        for _ in 0..3 {
            let current_raw: Option<String> = conn
                .hget(&key, "avg_latency_ms")
                .await
                .map_err(|e| RelayError::store(format!("HGET avg_latency_ms failed: {e}")))?;
            let current = current_raw
                .as_deref()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);
            let updated = ewma(current, latency.as_millis() as i64);

            let applied: i32 = LATENCY_CAS
                .key(&key)
                .arg(current_raw.unwrap_or_default())
                .arg(updated)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| RelayError::store(format!("latency CAS failed: {e}")))?;
            if applied == 1 {
                break;
            }
        }

        let costs = self.costs_for(model_id);
        let call_cost = f64::from(usage.prompt_tokens) * costs.input
            + f64::from(usage.completion_tokens) * costs.output;
        let cost_key = month_cost_key(model_id, Utc::now());

        let (successes, failures_raw): (i64, Option<String>) = redis::pipe()
            .atomic()
            .hincr(&key, "total_successes", 1)
            .hget(&key, "total_failures")
            .hincr(&key, "total_input_tokens", i64::from(usage.prompt_tokens))
            .ignore()
            .hincr(&key, "total_output_tokens", i64::from(usage.completion_tokens))
            .ignore()
            .hset(&key, "status", ModelStatus::Online.as_str())
            .ignore()
            .incr(&cost_key, call_cost)
            .ignore()
            .expire(&cost_key, COST_TTL_SECS)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| RelayError::store(format!("success pipeline failed: {e}")))?;

        let failures = failures_raw.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
        self.write_error_rate(&key, successes, failures).await
    }

    /// Record a failed generation: bump the failure counter and degrade the
    /// model.
    pub async fn on_failure(&self, model_id: &str) {
        if let Err(e) = self.apply_failure(model_id).await {
            warn!(model = model_id, error = %e, "profile failure update failed");
        }
    }

    async fn apply_failure(&self, model_id: &str) -> RelayResult<()> {
        let key = profile_key(model_id);
        let mut conn = self.conn.clone();

        let (failures, successes_raw): (i64, Option<String>) = redis::pipe()
            .atomic()
            .hincr(&key, "total_failures", 1)
            .hget(&key, "total_successes")
            .hset(&key, "status", ModelStatus::Degraded.as_str())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| RelayError::store(format!("failure pipeline failed: {e}")))?;

        let successes = successes_raw.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
        self.write_error_rate(&key, successes, failures).await
    }

    async fn write_error_rate(&self, key: &str, successes: i64, failures: i64) -> RelayResult<()> {
        let total = successes + failures;
        if total <= 0 {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, "error_rate", failures as f64 / total as f64)
            .await
            .map_err(|e| RelayError::store(format!("error_rate write failed: {e}")))
    }

    /// Record the outcome of a background health probe. Ensures a full
    /// profile exists first so a probe can never create a partial hash.
    pub async fn on_health_check(&self, model_id: &str, healthy: bool) {
        if let Err(e) = self.get_profile(model_id).await {
            warn!(model = model_id, error = %e, "could not ensure profile before health write");
        }

        let key = profile_key(model_id);
        let status = if healthy {
            ModelStatus::Online
        } else {
            ModelStatus::Offline
        };

        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = redis::pipe()
            .atomic()
            .hset(&key, "status", status.as_str())
            .hset(&key, "last_health_check", Utc::now().to_rfc3339())
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(model = model_id, error = %e, "health check write failed");
        }
    }
}

fn parse_profile(model_id: &str, fields: &HashMap<String, String>) -> ModelProfile {
    let get_i64 = |name: &str| {
        fields
            .get(name)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
    };
    let get_f64 = |name: &str| {
        fields
            .get(name)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0)
    };

    ModelProfile {
        model_id: model_id.to_string(),
        avg_latency_ms: get_i64("avg_latency_ms"),
        cost_per_input_token: get_f64("cost_per_input_token"),
        cost_per_output_token: get_f64("cost_per_output_token"),
        status: ModelStatus::parse(fields.get("status").map(String::as_str).unwrap_or("")),
        error_rate: get_f64("error_rate"),
        total_successes: get_i64("total_successes"),
        total_failures: get_i64("total_failures"),
        total_input_tokens: get_i64("total_input_tokens"),
        total_output_tokens: get_i64("total_output_tokens"),
        last_health_check: fields
            .get("last_health_check")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        cost_spent_monthly: 0.0,
    }
}
