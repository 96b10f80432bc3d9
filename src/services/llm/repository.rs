//! LLM Repository — persistence for tiered analysis results (C10/C11) and
//! the rate-limit/spend ledgers the scheduler reserves against before
//! dispatch (§5, §9 REDESIGN FLAGS: explicit reserve/commit counters
//! instead of in-process mutable globals, so a restart can't lose count).

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::models::job::AnalysisState;
use crate::services::llm::models::{Tier1JobResult, Tier2JobResult, Tier3JobResult};
use crate::utils::CoreResult;

/// Denial from `reserve_rate_limit`: caller should postpone by this many
/// seconds (§4.7/§8 scenario: rate-limited requeue).
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDenial {
    pub retry_after_secs: u64,
}

/// Denial from `reserve_budget` (§5/§8 scenario: budget exhaustion
/// requeues to next UTC midnight).
#[derive(Debug, Clone)]
pub struct BudgetDenial {
    pub scope: String,
    pub limit_usd: f64,
    pub spent_usd: f64,
}

fn seconds_until_next_utc_midnight(now: DateTime<Utc>) -> u64 {
    let tomorrow = (now + Duration::days(1)).date_naive().and_hms_opt(0, 0, 0).expect("midnight is always valid");
    let tomorrow = DateTime::<Utc>::from_naive_utc_and_offset(tomorrow, Utc);
    (tomorrow - now).num_seconds().max(0) as u64
}

pub struct LlmRepository {
    pool: SqlitePool,
}

impl LlmRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Rate limiting — sliding one-minute window plus a fixed daily counter,
    // both keyed per model (§4.7).
    // ========================================================================

    /// Checks whether a call for `model_id` would stay within `rpm`/`rpd`
    /// without yet recording it. Call `commit_rate_limit` only once the
    /// call is actually about to be made.
    pub async fn reserve_rate_limit(&self, model_id: &str, rpm: u32, rpd: u32, now: DateTime<Utc>) -> CoreResult<Result<(), RateLimitDenial>> {
        let window_start = now - Duration::seconds(60);
        let count_minute: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rate_limit_requests WHERE model_id = ? AND requested_at > ?")
            .bind(model_id)
            .bind(window_start)
            .fetch_one(&self.pool)
            .await?;
        if count_minute as u32 >= rpm {
            return Ok(Err(RateLimitDenial { retry_after_secs: 60 }));
        }

        let day = now.format("%Y-%m-%d").to_string();
        let count_day: Option<i64> =
            sqlx::query_scalar("SELECT count FROM rate_limit_daily WHERE model_id = ? AND day = ?").bind(model_id).bind(&day).fetch_optional(&self.pool).await?;
        if count_day.unwrap_or(0) as u32 >= rpd {
            return Ok(Err(RateLimitDenial { retry_after_secs: seconds_until_next_utc_midnight(now) }));
        }

        Ok(Ok(()))
    }

    /// Records a call against both counters. Only invoked after
    /// `reserve_rate_limit` returned `Ok`, immediately before dispatch.
    pub async fn commit_rate_limit(&self, model_id: &str, now: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query("INSERT INTO rate_limit_requests (model_id, requested_at) VALUES (?, ?)").bind(model_id).bind(now).execute(&self.pool).await?;

        let day = now.format("%Y-%m-%d").to_string();
        sqlx::query(
            "INSERT INTO rate_limit_daily (model_id, day, count) VALUES (?, ?, 1)
             ON CONFLICT(model_id, day) DO UPDATE SET count = count + 1",
        )
        .bind(model_id)
        .bind(&day)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Spend budget — daily and monthly caps, both checked before a call and
    // committed with the call's actual cost afterward (§5).
    // ========================================================================

    /// Checks `estimated_cost_usd` against the remaining daily/monthly
    /// budget. A cap of `0.0` means unlimited (§6 default).
    pub async fn reserve_budget(&self, estimated_cost_usd: f64, daily_max_usd: f64, monthly_max_usd: f64, now: DateTime<Utc>) -> CoreResult<Result<(), BudgetDenial>> {
        if daily_max_usd > 0.0 {
            let day = now.format("%Y-%m-%d").to_string();
            let spent: Option<f64> = sqlx::query_scalar("SELECT amount_usd FROM spend_daily WHERE day = ?").bind(&day).fetch_optional(&self.pool).await?;
            let spent = spent.unwrap_or(0.0);
            if spent + estimated_cost_usd > daily_max_usd {
                return Ok(Err(BudgetDenial { scope: "daily".into(), limit_usd: daily_max_usd, spent_usd: spent }));
            }
        }

        if monthly_max_usd > 0.0 {
            let month = now.format("%Y-%m").to_string();
            let spent: Option<f64> = sqlx::query_scalar("SELECT amount_usd FROM spend_monthly WHERE month = ?").bind(&month).fetch_optional(&self.pool).await?;
            let spent = spent.unwrap_or(0.0);
            if spent + estimated_cost_usd > monthly_max_usd {
                return Ok(Err(BudgetDenial { scope: "monthly".into(), limit_usd: monthly_max_usd, spent_usd: spent }));
            }
        }

        Ok(Ok(()))
    }

    /// Commits a call's actual cost to both ledgers. Called once the call
    /// completes, using the real token counts rather than the estimate.
    pub async fn commit_spend(&self, actual_cost_usd: f64, now: DateTime<Utc>) -> CoreResult<()> {
        let day = now.format("%Y-%m-%d").to_string();
        sqlx::query(
            "INSERT INTO spend_daily (day, amount_usd) VALUES (?, ?)
             ON CONFLICT(day) DO UPDATE SET amount_usd = amount_usd + excluded.amount_usd",
        )
        .bind(&day)
        .bind(actual_cost_usd)
        .execute(&self.pool)
        .await?;

        let month = now.format("%Y-%m").to_string();
        sqlx::query(
            "INSERT INTO spend_monthly (month, amount_usd) VALUES (?, ?)
             ON CONFLICT(month) DO UPDATE SET amount_usd = amount_usd + excluded.amount_usd",
        )
        .bind(&month)
        .bind(actual_cost_usd)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Tier result persistence — canonicalizes a validated response into the
    // normalized child entities and advances `Job.analysis_state` (§4.11).
    // ========================================================================

    async fn insert_tier_record(&self, tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, job_id: &str, tier: i32, tokens_used: i32, model_used: &str, response_time_ms: i32) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO analysis_tier_records (job_id, tier, completed, completed_at, tokens_used, model_used, response_time_ms)
             VALUES (?, ?, 1, ?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(tier)
        .bind(Utc::now())
        .bind(tokens_used)
        .bind(model_used)
        .bind(response_time_ms)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Caches a tier's validated result as JSON, keyed by (job_id, tier), so
    /// the scheduler can hand it to the next tier's prompt builder as
    /// context (§4.10: "tier N+1 prompts include the structured result of
    /// tier N") without reconstructing it from the normalized child tables.
    async fn cache_tier_result(&self, tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, job_id: &str, tier: i32, result_json: &serde_json::Value) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO tier_result_cache (job_id, tier, result_json) VALUES (?, ?, ?)
             ON CONFLICT(job_id, tier) DO UPDATE SET result_json = excluded.result_json",
        )
        .bind(job_id)
        .bind(tier)
        .bind(sqlx::types::Json(result_json))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Loads the cached tier-1 result for `job_id`, if tier 1 has completed.
    pub async fn load_tier1_context(&self, job_id: &str) -> CoreResult<Option<Tier1JobResult>> {
        let row: Option<sqlx::types::Json<Tier1JobResult>> =
            sqlx::query_scalar("SELECT result_json FROM tier_result_cache WHERE job_id = ? AND tier = 1").bind(job_id).fetch_optional(&self.pool).await?;
        Ok(row.map(|j| j.0))
    }

    /// Loads the cached tier-2 result for `job_id`, if tier 2 has completed.
    pub async fn load_tier2_context(&self, job_id: &str) -> CoreResult<Option<Tier2JobResult>> {
        let row: Option<sqlx::types::Json<Tier2JobResult>> =
            sqlx::query_scalar("SELECT result_json FROM tier_result_cache WHERE job_id = ? AND tier = 2").bind(job_id).fetch_optional(&self.pool).await?;
        Ok(row.map(|j| j.0))
    }

    pub async fn persist_tier1(&self, job_id: &str, result: &Tier1JobResult, tokens_used: i32, model_used: &str, response_time_ms: i32) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        self.insert_tier_record(&mut tx, job_id, 1, tokens_used, model_used, response_time_ms).await?;
        self.cache_tier_result(&mut tx, job_id, 1, &serde_json::to_value(result)?).await?;

        sqlx::query("DELETE FROM required_skills WHERE job_id = ?").bind(job_id).execute(&mut *tx).await?;
        for skill in &result.skills {
            sqlx::query("INSERT INTO required_skills (job_id, skill, importance) VALUES (?, ?, ?)")
                .bind(job_id)
                .bind(&skill.skill)
                .bind(skill.importance)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM job_benefits WHERE job_id = ?").bind(job_id).execute(&mut *tx).await?;
        for benefit in &result.benefits {
            sqlx::query("INSERT INTO job_benefits (job_id, benefit) VALUES (?, ?)").bind(job_id).bind(benefit).execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM ats_keywords WHERE job_id = ?").bind(job_id).execute(&mut *tx).await?;
        for keyword in &result.ats_keywords {
            sqlx::query("INSERT INTO ats_keywords (job_id, keyword) VALUES (?, ?)").bind(job_id).bind(keyword).execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM secondary_industries WHERE job_id = ?").bind(job_id).execute(&mut *tx).await?;
        for industry in &result.secondary_industries {
            sqlx::query("INSERT INTO secondary_industries (job_id, industry) VALUES (?, ?)").bind(job_id).bind(industry).execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM red_flags WHERE job_id = ?").bind(job_id).execute(&mut *tx).await?;
        for flag in &result.red_flags {
            sqlx::query("INSERT INTO red_flags (job_id, flag, severity) VALUES (?, ?, ?)")
                .bind(job_id)
                .bind(&flag.flag)
                .bind(&flag.severity)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "UPDATE jobs SET
                work_arrangement = COALESCE(?, work_arrangement),
                industry = COALESCE(?, industry),
                analysis_state = ?,
                analysis_completed = 1,
                updated_at = ?
             WHERE job_id = ?",
        )
        .bind(&result.work_arrangement)
        .bind(&result.industry_classification)
        .bind(AnalysisState::Tier1Done.as_str())
        .bind(Utc::now())
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn persist_tier2(&self, job_id: &str, result: &Tier2JobResult, tokens_used: i32, model_used: &str, response_time_ms: i32) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        self.insert_tier_record(&mut tx, job_id, 2, tokens_used, model_used, response_time_ms).await?;
        self.cache_tier_result(&mut tx, job_id, 2, &serde_json::to_value(result)?).await?;

        sqlx::query("DELETE FROM implicit_requirements WHERE job_id = ?").bind(job_id).execute(&mut *tx).await?;
        for requirement in &result.implicit_requirements {
            sqlx::query("INSERT INTO implicit_requirements (job_id, requirement) VALUES (?, ?)").bind(job_id).bind(requirement).execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM cover_letter_insights WHERE job_id = ?").bind(job_id).execute(&mut *tx).await?;
        for insight in &result.cover_letter_insights {
            sqlx::query("INSERT INTO cover_letter_insights (job_id, angle, detail) VALUES (?, ?, ?)")
                .bind(job_id)
                .bind(&insight.angle)
                .bind(&insight.detail)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE jobs SET analysis_state = ?, updated_at = ? WHERE job_id = ?")
            .bind(AnalysisState::Tier2Done.as_str())
            .bind(Utc::now())
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn persist_tier3(&self, job_id: &str, result: &Tier3JobResult, tokens_used: i32, model_used: &str, response_time_ms: i32) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        self.insert_tier_record(&mut tx, job_id, 3, tokens_used, model_used, response_time_ms).await?;

        sqlx::query("DELETE FROM strategic_positioning WHERE job_id = ?").bind(job_id).execute(&mut *tx).await?;
        for recommendation in &result.strategic_positioning {
            sqlx::query("INSERT INTO strategic_positioning (job_id, recommendation) VALUES (?, ?)").bind(job_id).bind(recommendation).execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM authenticity_flags WHERE job_id = ?").bind(job_id).execute(&mut *tx).await?;
        for flag in &result.authenticity_flags {
            sqlx::query("INSERT INTO authenticity_flags (job_id, flag, confidence) VALUES (?, ?, ?)")
                .bind(job_id)
                .bind(&flag.flag)
                .bind(flag.confidence)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO llm_priority_scores (job_id, score, computed_at) VALUES (?, ?, ?)
             ON CONFLICT(job_id) DO UPDATE SET score = excluded.score, computed_at = excluded.computed_at",
        )
        .bind(job_id)
        .bind(result.application_priority_score)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE jobs SET analysis_state = ?, analysis_completed = 1, updated_at = ? WHERE job_id = ?")
            .bind(AnalysisState::Tier3Done.as_str())
            .bind(Utc::now())
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Marks a job's tier as permanently failed after exhausting retries
    /// (§7). The queue entry itself is already terminal by this point.
    pub async fn mark_tier_failed(&self, job_id: &str, tier: u8) -> CoreResult<()> {
        sqlx::query("UPDATE jobs SET analysis_state = ?, updated_at = ? WHERE job_id = ?")
            .bind(AnalysisState::failed(tier).as_str())
            .bind(Utc::now())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::models::{AuthenticityFlagExtraction, RedFlagExtraction, SkillExtraction};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE jobs (
                job_id TEXT PRIMARY KEY, work_arrangement TEXT, industry TEXT,
                analysis_state TEXT NOT NULL, analysis_completed BOOLEAN NOT NULL, updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("CREATE TABLE analysis_tier_records (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, tier INTEGER NOT NULL, completed BOOLEAN NOT NULL, completed_at TEXT, tokens_used INTEGER NOT NULL, model_used TEXT NOT NULL, response_time_ms INTEGER NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE required_skills (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, skill TEXT NOT NULL, importance INTEGER NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE job_benefits (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, benefit TEXT NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE ats_keywords (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, keyword TEXT NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE secondary_industries (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, industry TEXT NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE red_flags (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, flag TEXT NOT NULL, severity TEXT NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE implicit_requirements (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, requirement TEXT NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE cover_letter_insights (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, angle TEXT NOT NULL, detail TEXT NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE authenticity_flags (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, flag TEXT NOT NULL, confidence REAL NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE strategic_positioning (id INTEGER PRIMARY KEY AUTOINCREMENT, job_id TEXT NOT NULL, recommendation TEXT NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE llm_priority_scores (job_id TEXT PRIMARY KEY, score REAL NOT NULL, computed_at TEXT NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE rate_limit_requests (model_id TEXT NOT NULL, requested_at TEXT NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE rate_limit_daily (model_id TEXT NOT NULL, day TEXT NOT NULL, count INTEGER NOT NULL, PRIMARY KEY (model_id, day))").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE spend_daily (day TEXT PRIMARY KEY, amount_usd REAL NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE spend_monthly (month TEXT PRIMARY KEY, amount_usd REAL NOT NULL)").execute(&pool).await.unwrap();
        sqlx::query("CREATE TABLE tier_result_cache (job_id TEXT NOT NULL, tier INTEGER NOT NULL, result_json TEXT NOT NULL, PRIMARY KEY (job_id, tier))")
            .execute(&pool)
            .await
            .unwrap();

        sqlx::query("INSERT INTO jobs (job_id, analysis_state, analysis_completed, updated_at) VALUES ('job-1', 'tier1_pending', 0, ?)")
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    fn tier1_result() -> Tier1JobResult {
        Tier1JobResult {
            job_id: "job-1".into(),
            skills: vec![SkillExtraction { skill: "Rust".into(), importance: 8 }],
            seniority: "senior".into(),
            authenticity_signals: vec![],
            compensation_facts: vec![],
            benefits: vec!["health insurance".into()],
            work_arrangement: Some("remote".into()),
            industry_classification: Some("software".into()),
            secondary_industries: vec![],
            ats_keywords: vec!["rust".into()],
            red_flags: vec![RedFlagExtraction { flag: "vague title".into(), severity: "low".into() }],
        }
    }

    #[tokio::test]
    async fn persist_tier1_writes_child_rows_and_advances_state() {
        let pool = test_pool().await;
        let repo = LlmRepository::new(pool.clone());
        repo.persist_tier1("job-1", &tier1_result(), 500, "standard", 1200).await.unwrap();

        let (state, completed): (String, bool) =
            sqlx::query_as("SELECT analysis_state, analysis_completed FROM jobs WHERE job_id = 'job-1'").fetch_one(&pool).await.unwrap();
        assert_eq!(state, "tier1_done");
        assert!(completed, "tier 1 completion must flip analysis_completed so C5 protection applies immediately (spec \u{a7}3/\u{a7}4.10)");
        let skills: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM required_skills WHERE job_id = 'job-1'").fetch_one(&pool).await.unwrap();
        assert_eq!(skills, 1);
    }

    #[tokio::test]
    async fn tier1_context_is_retrievable_after_persisting_and_absent_before() {
        let pool = test_pool().await;
        let repo = LlmRepository::new(pool.clone());
        assert!(repo.load_tier1_context("job-1").await.unwrap().is_none());

        repo.persist_tier1("job-1", &tier1_result(), 500, "standard", 1200).await.unwrap();

        let context = repo.load_tier1_context("job-1").await.unwrap().expect("tier1 context should be cached");
        assert_eq!(context.seniority, "senior");
        assert_eq!(context.skills.len(), 1);
        assert!(repo.load_tier2_context("job-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_tier3_advances_state_and_completes_analysis() {
        let pool = test_pool().await;
        let repo = LlmRepository::new(pool.clone());
        let result = Tier3JobResult {
            job_id: "job-1".into(),
            strategic_positioning: vec!["lead with rust experience".into()],
            application_priority_score: 82.5,
            authenticity_flags: vec![AuthenticityFlagExtraction { flag: "verified company".into(), confidence: 0.9 }],
        };
        repo.persist_tier3("job-1", &result, 800, "premium", 2000).await.unwrap();

        let (state, completed): (String, bool) = sqlx::query_as("SELECT analysis_state, analysis_completed FROM jobs WHERE job_id = 'job-1'").fetch_one(&pool).await.unwrap();
        assert_eq!(state, "tier3_done");
        assert!(completed);
        let score: f64 = sqlx::query_scalar("SELECT score FROM llm_priority_scores WHERE job_id = 'job-1'").fetch_one(&pool).await.unwrap();
        assert_eq!(score, 82.5);
    }

    #[tokio::test]
    async fn rate_limit_denies_once_rpm_is_reached() {
        let pool = test_pool().await;
        let repo = LlmRepository::new(pool);
        let now = Utc::now();
        repo.commit_rate_limit("standard", now).await.unwrap();
        repo.commit_rate_limit("standard", now).await.unwrap();

        let decision = repo.reserve_rate_limit("standard", 2, 1000, now).await.unwrap();
        assert!(decision.is_err());
    }

    #[tokio::test]
    async fn budget_denies_once_daily_cap_is_reached() {
        let pool = test_pool().await;
        let repo = LlmRepository::new(pool);
        let now = Utc::now();
        repo.commit_spend(9.5, now).await.unwrap();

        let decision = repo.reserve_budget(1.0, 10.0, 0.0, now).await.unwrap();
        assert!(decision.is_err());
    }

    #[tokio::test]
    async fn budget_allows_when_caps_are_unset() {
        let pool = test_pool().await;
        let repo = LlmRepository::new(pool);
        let decision = repo.reserve_budget(1_000_000.0, 0.0, 0.0, Utc::now()).await.unwrap();
        assert!(decision.is_ok());
    }
}
