//! Token/Model/Batch Optimizer (C8) — produces a `BatchPlan` for a tier and
//! a list of candidate jobs. Pure given its inputs and persisted EMA state
//! (§4.8); no ambient globals (§9 REDESIGN FLAGS).

use sqlx::SqlitePool;

use crate::config::BatchingConfig;
use crate::utils::CoreResult;

#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    pub model_id: &'static str,
    pub context_window: u32,
    pub output_token_limit: u32,
    pub output_ms_per_token: f64,
    /// USD per 1k input/output tokens, used by the scheduler's spend budget
    /// (§5 rate-limit accounting) to estimate a batch's cost before dispatch.
    pub input_price_per_1k: f64,
    pub output_price_per_1k: f64,
}

impl ModelInfo {
    pub fn by_id(model_id: &str) -> Option<ModelInfo> {
        [STANDARD_MODEL, PREMIUM_MODEL, LITE_MODEL].into_iter().find(|m| m.model_id == model_id)
    }

    pub fn estimated_cost_usd(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_price_per_1k + (output_tokens as f64 / 1000.0) * self.output_price_per_1k
    }
}

pub const STANDARD_MODEL: ModelInfo =
    ModelInfo { model_id: "standard", context_window: 128_000, output_token_limit: 8_192, output_ms_per_token: 12.0, input_price_per_1k: 0.003, output_price_per_1k: 0.006 };
pub const PREMIUM_MODEL: ModelInfo =
    ModelInfo { model_id: "premium", context_window: 200_000, output_token_limit: 8_192, output_ms_per_token: 20.0, input_price_per_1k: 0.015, output_price_per_1k: 0.03 };
pub const LITE_MODEL: ModelInfo =
    ModelInfo { model_id: "lite", context_window: 64_000, output_token_limit: 4_096, output_ms_per_token: 6.0, input_price_per_1k: 0.0005, output_price_per_1k: 0.001 };

/// Context-window safety margin: the batch must fit within this fraction of
/// the model's context window after accounting for output tokens (§4.8).
const CONTEXT_SAFETY_MARGIN: f64 = 0.90;
/// Output-token safety margin applied on top of the per-tier base estimate.
const OUTPUT_SAFETY_MARGIN: f64 = 1.15;
const FIXED_PROMPT_OVERHEAD_TOKENS: u32 = 400;
const CHARS_PER_TOKEN: f64 = 4.0;
/// Batch sizes at or above this trigger the "large batch" standard-model rule.
const LARGE_BATCH_THRESHOLD: usize = 10;
/// Sustained-efficiency threshold above which the optimizer downgrades to
/// the lite model to conserve spend.
const LITE_DOWNGRADE_EFFICIENCY: f64 = 0.85;
const EMA_SMOOTHING: f64 = 0.2;
const EFFICIENCY_BAND_LOW: f64 = 0.60;
const EFFICIENCY_BAND_HIGH: f64 = 0.80;
const BASE_ADJUSTMENT_STEP: f64 = 0.10;

#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub batch_size: usize,
    pub model_id: &'static str,
    pub max_output_tokens: u32,
    pub reason_text: String,
}

/// A candidate queue entry's job, reduced to what the optimizer needs to
/// estimate prompt size.
#[derive(Debug, Clone)]
pub struct JobCandidate {
    pub job_id: String,
    pub description_chars: usize,
}

fn tier_bounds(tier: i32, config: &BatchingConfig) -> (usize, usize) {
    match tier {
        1 => (3, config.tier1_max_batch.max(3)),
        2 => (1, config.tier2_max_batch.max(1)),
        _ => (1, config.tier3_max_batch.max(1)),
    }
}

fn base_output_tokens(tier: i32, config: &BatchingConfig) -> u32 {
    match tier {
        1 => config.tier1_base_output_tokens,
        2 => config.tier2_base_output_tokens,
        _ => config.tier3_base_output_tokens,
    }
}

fn estimate_input_tokens(candidates: &[JobCandidate]) -> u32 {
    let per_job: u32 = candidates.iter().map(|c| (c.description_chars as f64 / CHARS_PER_TOKEN).ceil() as u32).sum();
    FIXED_PROMPT_OVERHEAD_TOKENS + per_job
}

pub struct TokenOptimizer {
    pool: SqlitePool,
}

impl TokenOptimizer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `plan_batch(tier, candidates) → BatchPlan` (§4.8).
    pub async fn plan_batch(&self, tier: i32, candidates: &[JobCandidate], config: &BatchingConfig) -> CoreResult<BatchPlan> {
        let (min_batch, max_batch) = tier_bounds(tier, config);
        let (ema_efficiency, adjusted_base) = self.load_state(tier, base_output_tokens(tier, config)).await?;

        let mut batch_size = candidates.len().min(max_batch).max(min_batch.min(candidates.len().max(1)));
        let mut reasons = Vec::new();

        let model = if ema_efficiency > LITE_DOWNGRADE_EFFICIENCY {
            reasons.push(format!("ema efficiency {ema_efficiency:.2} exceeds {LITE_DOWNGRADE_EFFICIENCY:.2}, downgrading to lite"));
            LITE_MODEL
        } else if tier == 1 || batch_size >= LARGE_BATCH_THRESHOLD {
            reasons.push(if tier == 1 { "tier 1 uses the standard model".to_string() } else { "large batch uses the standard model".to_string() });
            STANDARD_MODEL
        } else {
            reasons.push("tier 2/3 uses the premium model for nuanced reasoning".to_string());
            PREMIUM_MODEL
        };

        loop {
            let max_output_tokens = ((adjusted_base as f64) * batch_size as f64 * OUTPUT_SAFETY_MARGIN).ceil().min(model.output_token_limit as f64) as u32;
            let input_tokens = estimate_input_tokens(&candidates[..batch_size]);
            let fits = (input_tokens + max_output_tokens) as f64 <= model.context_window as f64 * CONTEXT_SAFETY_MARGIN;

            if fits || batch_size <= 1 {
                if !fits {
                    reasons.push("batch held at 1 job; context window remains tight".to_string());
                }
                return Ok(BatchPlan { batch_size, model_id: model.model_id, max_output_tokens, reason_text: reasons.join("; ") });
            }

            batch_size -= 1;
            reasons.push(format!("shrunk batch to {batch_size} to fit context window"));
        }
    }

    /// Updates the per-tier EMA efficiency after a dispatch completes, and
    /// nudges the per-tier base output estimate when efficiency drifts
    /// outside the 60-80% target band (§4.8).
    pub async fn record_actual_usage(&self, tier: i32, allocated_tokens: u32, consumed_tokens: u32, current_base: u32) -> CoreResult<()> {
        let observed = if allocated_tokens == 0 { 0.0 } else { consumed_tokens as f64 / allocated_tokens as f64 };
        let (previous_ema, _) = self.load_state(tier, current_base).await?;
        let ema = EMA_SMOOTHING * observed + (1.0 - EMA_SMOOTHING) * previous_ema;

        let adjusted_base = if ema < EFFICIENCY_BAND_LOW {
            (current_base as f64 * (1.0 - BASE_ADJUSTMENT_STEP)).round() as u32
        } else if ema > EFFICIENCY_BAND_HIGH {
            (current_base as f64 * (1.0 + BASE_ADJUSTMENT_STEP)).round() as u32
        } else {
            current_base
        };

        sqlx::query(
            "INSERT INTO optimizer_state (tier, ema_efficiency, base_output_tokens, updated_at) VALUES (?,?,?,?)
             ON CONFLICT(tier) DO UPDATE SET ema_efficiency = excluded.ema_efficiency, base_output_tokens = excluded.base_output_tokens, updated_at = excluded.updated_at",
        )
        .bind(tier)
        .bind(ema)
        .bind(adjusted_base)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The per-tier base output-token estimate currently in effect, for
    /// callers (the scheduler) that need to report actual usage against it
    /// without duplicating the tier-default table.
    pub async fn current_base_output_tokens(&self, tier: i32, config: &BatchingConfig) -> CoreResult<u32> {
        let (_, base) = self.load_state(tier, base_output_tokens(tier, config)).await?;
        Ok(base)
    }

    async fn load_state(&self, tier: i32, default_base: u32) -> CoreResult<(f64, u32)> {
        let row: Option<(f64, i64)> =
            sqlx::query_as("SELECT ema_efficiency, base_output_tokens FROM optimizer_state WHERE tier = ?").bind(tier).fetch_optional(&self.pool).await?;
        Ok(match row {
            Some((ema, base)) => (ema, base as u32),
            None => (0.70, default_base),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE optimizer_state (tier INTEGER PRIMARY KEY, ema_efficiency REAL NOT NULL, base_output_tokens INTEGER NOT NULL, updated_at TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn candidates(n: usize, chars: usize) -> Vec<JobCandidate> {
        (0..n).map(|i| JobCandidate { job_id: format!("job-{i}"), description_chars: chars }).collect()
    }

    #[tokio::test]
    async fn tier1_uses_standard_model_by_default() {
        let pool = test_pool().await;
        let optimizer = TokenOptimizer::new(pool);
        let plan = optimizer.plan_batch(1, &candidates(15, 500), &BatchingConfig::default()).await.unwrap();
        assert_eq!(plan.model_id, "standard");
        assert!(plan.batch_size <= 20 && plan.batch_size >= 3);
    }

    #[tokio::test]
    async fn tier2_small_batch_uses_premium_model() {
        let pool = test_pool().await;
        let optimizer = TokenOptimizer::new(pool);
        let plan = optimizer.plan_batch(2, &candidates(3, 500), &BatchingConfig::default()).await.unwrap();
        assert_eq!(plan.model_id, "premium");
        assert!(plan.batch_size <= 5);
    }

    #[tokio::test]
    async fn huge_descriptions_shrink_the_batch_to_fit_context_window() {
        let pool = test_pool().await;
        let optimizer = TokenOptimizer::new(pool);
        let plan = optimizer.plan_batch(1, &candidates(20, 400_000), &BatchingConfig::default()).await.unwrap();
        assert!(plan.batch_size < 20);
    }

    #[tokio::test]
    async fn sustained_high_efficiency_downgrades_to_lite_model() {
        let pool = test_pool().await;
        sqlx::query("INSERT INTO optimizer_state (tier, ema_efficiency, base_output_tokens, updated_at) VALUES (1, 0.92, 700, ?)")
            .bind(chrono::Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        let optimizer = TokenOptimizer::new(pool);
        let plan = optimizer.plan_batch(1, &candidates(5, 500), &BatchingConfig::default()).await.unwrap();
        assert_eq!(plan.model_id, "lite");
    }
}
