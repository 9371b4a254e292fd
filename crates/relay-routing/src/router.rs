//! The model router: pre-filter, normalize, score, pick.
//!
//! Selection runs in two passes. Pass one filters the available models
//! against health, staleness, budget, and error-rate thresholds to build the
//! contender pool. Pass two normalizes latency and estimated cost across the
//! pool, computes each contender's weighted score under the resolved
//! strategy, and returns the argmax. Contenders are iterated in ascending
//! model-id order, which makes score ties resolve deterministically in favor
//! of the lexicographically first model.

use crate::config::{RouterConfig, RoutingStrategy, Thresholds};
use chrono::Utc;
use relay_core::{RelayError, RelayResult};
use relay_store::{ModelProfile, ModelStatus, Profiler};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Output tokens are estimated at twice the prompt tokens for cost scoring.
const OUTPUT_ESTIMATE_FACTOR: u32 = 2;

/// Mean estimated cost below which "smart-balanced" prefers latency.
const SMART_BALANCED_CHEAP_USD: f64 = 0.001;

/// A model that passed all pre-filter checks.
#[derive(Debug, Clone)]
pub struct Contender {
    profile: ModelProfile,
    quality_score: f64,
    coding_score: f64,
    estimated_cost: f64,
}

/// Selects the best model for a request under the configured strategies.
pub struct Router {
    profiler: Profiler,
    config: Arc<RouterConfig>,
}

impl Router {
    /// Create a router over the shared profiler and configuration snapshot.
    #[must_use]
    pub fn new(profiler: Profiler, config: Arc<RouterConfig>) -> Self {
        Self { profiler, config }
    }

    /// Pick the optimal model among `available_models` for a request with
    /// `prompt_tokens` of input under `preference`, excluding models whose
    /// monthly spend reached their budget.
    ///
    /// # Errors
    /// Returns a routing error when no model survives the pre-filter, or a
    /// configuration error when the strategy table is incomplete.
    pub async fn select_optimal(
        &self,
        available_models: &[String],
        preference: &str,
        prompt_tokens: u32,
        budgets: &HashMap<String, f64>,
    ) -> RelayResult<String> {
        debug!(preference, prompt_tokens, "starting model selection");

        let mut contenders = Vec::new();
        for model_id in available_models {
            let profile = match self.profiler.get_profile(model_id).await {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(model = %model_id, error = %e, "could not load profile, skipping");
                    continue;
                }
            };

            let budget = budgets.get(model_id).copied().unwrap_or(0.0);
            if let Err(reason) =
                passes_pre_checks(&profile, budget, &self.config.pre_check_thresholds)
            {
                debug!(model = %model_id, reason, "filtered out");
                continue;
            }

            let Some(scores) = self.config.models.get(model_id) else {
                debug!(model = %model_id, "no model metadata in config, filtered out");
                continue;
            };

            contenders.push(Contender {
                estimated_cost: estimated_cost(&profile, prompt_tokens),
                quality_score: scores.quality_score,
                coding_score: scores.coding_score,
                profile,
            });
        }

        // Ascending model-id order fixes the tie-break.
        contenders.sort_by(|a, b| a.profile.model_id.cmp(&b.profile.model_id));

        if contenders.is_empty() {
            return Err(RelayError::routing(
                "no suitable, healthy, and in-budget model found after filtering",
            ));
        }
        if contenders.len() == 1 {
            let winner = contenders[0].profile.model_id.clone();
            info!(model = %winner, "only one contender, selecting it");
            return Ok(winner);
        }

        let strategy = self.resolve_strategy(preference, &contenders)?;
        let winner = choose(&contenders, strategy)?;
        info!(model = %winner, preference, "selected model");
        Ok(winner)
    }

    /// Map a preference to a strategy. "smart-balanced" resolves dynamically
    /// on the mean estimated cost of the pool; unknown preferences fall back
    /// to "default".
    fn resolve_strategy(
        &self,
        preference: &str,
        contenders: &[Contender],
    ) -> RelayResult<RoutingStrategy> {
        if preference == "smart-balanced" {
            let mean_cost = contenders.iter().map(|c| c.estimated_cost).sum::<f64>()
                / contenders.len() as f64;
            let resolved = if mean_cost < SMART_BALANCED_CHEAP_USD {
                "latency-focused-balanced"
            } else {
                "quality-focused-balanced"
            };
            debug!(mean_cost, resolved, "resolved smart-balanced strategy");
            return self.config.strategies.get(resolved).copied().ok_or_else(|| {
                RelayError::configuration(format!("strategy '{resolved}' not found in configuration"))
            });
        }

        if let Some(strategy) = self.config.strategies.get(preference) {
            return Ok(*strategy);
        }

        if !preference.is_empty() {
            warn!(preference, "unknown preference, falling back to 'default'");
        }
        self.config
            .strategies
            .get("default")
            .copied()
            .ok_or_else(|| RelayError::configuration("default strategy not found in configuration"))
    }
}

/// Estimated USD cost of serving this prompt on this model.
fn estimated_cost(profile: &ModelProfile, prompt_tokens: u32) -> f64 {
    let output_tokens = prompt_tokens * OUTPUT_ESTIMATE_FACTOR;
    f64::from(prompt_tokens) * profile.cost_per_input_token
        + f64::from(output_tokens) * profile.cost_per_output_token
}

/// Apply the pre-filter to one profile. Returns the exclusion reason on
/// failure.
fn passes_pre_checks(
    profile: &ModelProfile,
    monthly_budget: f64,
    thresholds: &Thresholds,
) -> Result<(), String> {
    if profile.status == ModelStatus::Offline {
        return Err("model is marked as offline".to_string());
    }

    let age = (Utc::now() - profile.last_health_check)
        .to_std()
        .unwrap_or_default();
    if age > thresholds.health_check_staleness {
        return Err(format!(
            "health check is stale (last check > {:?} ago)",
            thresholds.health_check_staleness
        ));
    }

    if monthly_budget > 0.0 && profile.cost_spent_monthly >= monthly_budget {
        return Err(format!(
            "over monthly budget (${:.4} / ${:.2})",
            profile.cost_spent_monthly, monthly_budget
        ));
    }

    let total_requests = profile.total_successes + profile.total_failures;
    if total_requests > thresholds.min_request_count && profile.error_rate > thresholds.max_error_rate
    {
        return Err(format!(
            "error rate is too high ({:.2}% > {:.2}%)",
            profile.error_rate * 100.0,
            thresholds.max_error_rate * 100.0
        ));
    }

    Ok(())
}

/// Normalization bounds over the contender pool.
struct Bounds {
    min_cost: f64,
    max_cost: f64,
    min_latency: f64,
    max_latency: f64,
}

fn bounds(contenders: &[Contender]) -> Bounds {
    let mut b = Bounds {
        min_cost: f64::MAX,
        max_cost: 0.0,
        min_latency: f64::MAX,
        max_latency: 0.0,
    };
    for c in contenders {
        b.min_cost = b.min_cost.min(c.estimated_cost);
        b.max_cost = b.max_cost.max(c.estimated_cost);
        let latency = c.profile.avg_latency_ms as f64;
        b.min_latency = b.min_latency.min(latency);
        b.max_latency = b.max_latency.max(latency);
    }
    b
}

/// Weighted score of one contender, each factor normalized to [0, 1] with
/// 1 = best, reliability applied as a multiplier.
fn score(contender: &Contender, strategy: RoutingStrategy, bounds: &Bounds) -> f64 {
    let latency_factor = if bounds.max_latency > bounds.min_latency {
        (bounds.max_latency - contender.profile.avg_latency_ms as f64)
            / (bounds.max_latency - bounds.min_latency)
    } else {
        0.5
    };

    let cost_factor = if bounds.max_cost > bounds.min_cost {
        (bounds.max_cost - contender.estimated_cost) / (bounds.max_cost - bounds.min_cost)
    } else {
        0.5
    };

    let quality_factor = if strategy.use_coding_score {
        contender.coding_score / 10.0
    } else {
        contender.quality_score / 10.0
    };

    let reliability_factor = 1.0 - contender.profile.error_rate;

    (strategy.quality_weight * quality_factor
        + strategy.cost_weight * cost_factor
        + strategy.latency_weight * latency_factor)
        * reliability_factor
}

/// Argmax over the scored pool.
fn choose(contenders: &[Contender], strategy: RoutingStrategy) -> RelayResult<String> {
    let b = bounds(contenders);
    let mut best: Option<(&Contender, f64)> = None;

    for contender in contenders {
        let s = score(contender, strategy, &b);
        debug!(
            model = %contender.profile.model_id,
            latency_ms = contender.profile.avg_latency_ms,
            estimated_cost = contender.estimated_cost,
            score = s,
            "scored contender"
        );
        if best.as_ref().map_or(true, |(_, current)| s > *current) {
            best = Some((contender, s));
        }
    }

    best.map(|(c, _)| c.profile.model_id.clone())
        .ok_or_else(|| RelayError::routing("failed to select a model after scoring"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn thresholds() -> Thresholds {
        Thresholds {
            relevance_threshold: 0.75,
            max_error_rate: 0.5,
            min_request_count: 10,
            health_check_staleness: Duration::from_secs(600),
        }
    }

    fn profile(model_id: &str) -> ModelProfile {
        ModelProfile {
            model_id: model_id.to_string(),
            avg_latency_ms: 1000,
            cost_per_input_token: 1e-6,
            cost_per_output_token: 2e-6,
            status: ModelStatus::Online,
            error_rate: 0.0,
            total_successes: 100,
            total_failures: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            last_health_check: Utc::now(),
            cost_spent_monthly: 0.0,
        }
    }

    fn contender(model_id: &str, quality: f64, latency_ms: i64, cost: f64) -> Contender {
        let mut p = profile(model_id);
        p.avg_latency_ms = latency_ms;
        Contender {
            profile: p,
            quality_score: quality,
            coding_score: quality,
            estimated_cost: cost,
        }
    }

    #[test]
    fn offline_models_are_excluded() {
        let mut p = profile("m1");
        p.status = ModelStatus::Offline;
        let err = passes_pre_checks(&p, 0.0, &thresholds()).unwrap_err();
        assert!(err.contains("offline"));
    }

    #[test]
    fn staleness_boundary_is_inclusive() {
        let limit = thresholds().health_check_staleness;

        let mut at_limit = profile("m1");
        at_limit.last_health_check = Utc::now() - ChronoDuration::seconds(limit.as_secs() as i64)
            + ChronoDuration::milliseconds(50);
        assert!(passes_pre_checks(&at_limit, 0.0, &thresholds()).is_ok());

        let mut beyond = profile("m2");
        beyond.last_health_check =
            Utc::now() - ChronoDuration::seconds(limit.as_secs() as i64 + 1);
        assert!(passes_pre_checks(&beyond, 0.0, &thresholds()).is_err());
    }

    #[test]
    fn budget_exhaustion_excludes_model() {
        let mut p = profile("m1");
        p.cost_spent_monthly = 0.02;
        assert!(passes_pre_checks(&p, 0.01, &thresholds()).is_err());

        // Zero budget disables the check entirely.
        assert!(passes_pre_checks(&p, 0.0, &thresholds()).is_ok());
    }

    #[test]
    fn error_rate_only_counts_with_enough_requests() {
        let mut hot = profile("m1");
        hot.error_rate = 0.9;
        hot.total_successes = 5;
        hot.total_failures = 3;
        // 8 requests <= min_request_count of 10: error rate not yet trusted.
        assert!(passes_pre_checks(&hot, 0.0, &thresholds()).is_ok());

        hot.total_successes = 50;
        assert!(passes_pre_checks(&hot, 0.0, &thresholds()).is_err());
    }

    #[test]
    fn estimated_cost_doubles_output_tokens() {
        let p = profile("m1");
        // 100 input tokens at 1e-6 + 200 output tokens at 2e-6
        let cost = estimated_cost(&p, 100);
        assert!((cost - (100.0 * 1e-6 + 200.0 * 2e-6)).abs() < 1e-12);
    }

    #[test]
    fn quality_wins_under_max_quality_when_cost_and_latency_tie() {
        let strategy = RoutingStrategy {
            use_coding_score: false,
            quality_weight: 1.0,
            cost_weight: 0.0,
            latency_weight: 0.0,
        };
        let pool = vec![
            contender("m-eight", 8.0, 1000, 0.001),
            contender("m-seven", 7.0, 1000, 0.001),
        ];
        assert_eq!(choose(&pool, strategy).unwrap(), "m-eight");
    }

    #[test]
    fn latency_weight_prefers_faster_model() {
        let strategy = RoutingStrategy {
            use_coding_score: false,
            quality_weight: 0.0,
            cost_weight: 0.0,
            latency_weight: 1.0,
        };
        let pool = vec![
            contender("slow", 9.0, 5000, 0.001),
            contender("fast", 5.0, 200, 0.001),
        ];
        assert_eq!(choose(&pool, strategy).unwrap(), "fast");
    }

    #[test]
    fn reliability_multiplies_the_score_down() {
        let strategy = RoutingStrategy {
            use_coding_score: false,
            quality_weight: 1.0,
            cost_weight: 0.0,
            latency_weight: 0.0,
        };
        let mut flaky = contender("flaky", 10.0, 1000, 0.001);
        flaky.profile.error_rate = 0.5;
        let steady = contender("steady", 6.0, 1000, 0.001);
        // 10 * 0.5 = 5.0 < 6.0
        assert_eq!(choose(&vec![flaky, steady], strategy).unwrap(), "steady");
    }

    #[test]
    fn identical_factors_fall_back_to_half() {
        let strategy = RoutingStrategy {
            use_coding_score: false,
            quality_weight: 0.0,
            cost_weight: 0.5,
            latency_weight: 0.5,
        };
        let pool = vec![
            contender("a", 5.0, 1000, 0.001),
            contender("b", 5.0, 1000, 0.001),
        ];
        let b = bounds(&pool);
        assert_eq!(score(&pool[0], strategy, &b), 0.5);
        // Deterministic tie-break: first in ascending id order.
        assert_eq!(choose(&pool, strategy).unwrap(), "a");
    }

    #[test]
    fn returned_model_is_always_a_contender() {
        let strategy = RoutingStrategy {
            use_coding_score: false,
            quality_weight: 0.4,
            cost_weight: 0.3,
            latency_weight: 0.3,
        };
        let pool = vec![
            contender("a", 3.0, 4000, 0.01),
            contender("b", 8.0, 900, 0.002),
            contender("c", 6.0, 300, 0.02),
        ];
        let winner = choose(&pool, strategy).unwrap();
        assert!(pool.iter().any(|c| c.profile.model_id == winner));
    }
}
