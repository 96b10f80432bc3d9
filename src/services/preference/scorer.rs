//! Job Scorer (C13) — maps an analyzed Job into the 11-variable feature
//! space and applies the user's trained regression.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;

use super::regression;
use crate::models::job::Job;
use crate::models::preference::{FeatureContribution, JobScoreResult, NotYetAnalyzed, PreferenceModel, PreferenceVariable, PREFERENCE_VARIABLES};
use crate::utils::{CoreError, CoreResult};

/// Caller-supplied signals the core has no model for (user home location,
/// industry preference) — folded into the 11-variable feature map alongside
/// what can be derived straight from the Job record (§4.13, §9 open
/// question on conversion/commute left to the caller).
#[derive(Debug, Clone, Default)]
pub struct JobScoreContext {
    pub commute_minutes: Option<f64>,
    pub preferred_industry: Option<String>,
}

pub enum JobScoreOutcome {
    NotYetAnalyzed(NotYetAnalyzed),
    Scored(JobScoreResult),
}

const OVERTIME_KEYWORDS: &[&str] = &["overtime", "on-call", "long hours", "fast-paced", "crunch"];
const INSECURITY_KEYWORDS: &[&str] = &["layoff", "restructuring", "uncertain funding", "acquisition pending", "hiring freeze"];

pub struct JobScorer {
    pool: SqlitePool,
}

impl JobScorer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `score_job(user_id, job) → {score, decision, confidence, explanation}` (§4.13).
    pub async fn score_job(&self, user_id: &str, job: &Job, context: &JobScoreContext, threshold: f64) -> CoreResult<JobScoreOutcome> {
        if !job.analysis_completed {
            return Ok(JobScoreOutcome::NotYetAnalyzed(NotYetAnalyzed::default()));
        }

        let model = self.load_model(user_id).await?;

        if let Some(cached) = self.load_cached(user_id, &job.job_id, model.trained_at, job.updated_at).await? {
            return Ok(JobScoreOutcome::Scored(cached));
        }

        let raw_values = self.extract_raw_values(job, context).await?;
        let features = regression::standardize_for_scoring(&model, &raw_values);
        let prediction = regression::predict(&model, &features).clamp(0.0, 100.0);

        let should_apply = prediction >= threshold;
        let confidence = if threshold > 0.0 { (prediction - threshold).abs() / threshold } else { 0.0 }.clamp(0.0, 1.0);

        let mut contributions = regression::feature_contributions(&model, &features);
        contributions.sort_by(|a, b| b.contribution.abs().partial_cmp(&a.contribution.abs()).unwrap());
        let explanation: Vec<FeatureContribution> = contributions
            .into_iter()
            .take(3)
            .map(|c| FeatureContribution { variable: PREFERENCE_VARIABLES[c.index], contribution: c.contribution })
            .collect();

        let result = JobScoreResult {
            user_id: user_id.to_string(),
            job_id: job.job_id.clone(),
            score: prediction,
            should_apply,
            confidence,
            explanation,
            model_version: model.trained_at,
        };

        self.persist(&result, job.updated_at).await?;
        Ok(JobScoreOutcome::Scored(result))
    }

    async fn load_model(&self, user_id: &str) -> CoreResult<PreferenceModel> {
        sqlx::query_as("SELECT * FROM preference_models WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("no trained preference model for user {user_id}")))
    }

    async fn load_cached(
        &self,
        user_id: &str,
        job_id: &str,
        model_trained_at: chrono::DateTime<Utc>,
        job_updated_at: chrono::DateTime<Utc>,
    ) -> CoreResult<Option<JobScoreResult>> {
        let row: Option<(f64, bool, f64, sqlx::types::Json<Vec<FeatureContribution>>, chrono::DateTime<Utc>, chrono::DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT score, should_apply, confidence, explanation, model_version, job_version
                 FROM job_scores WHERE user_id = ? AND job_id = ?",
            )
            .bind(user_id)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|(score, should_apply, confidence, explanation, model_version, job_version)| {
            if model_version == model_trained_at && job_version == job_updated_at {
                Some(JobScoreResult {
                    user_id: user_id.to_string(),
                    job_id: job_id.to_string(),
                    score,
                    should_apply,
                    confidence,
                    explanation: explanation.0,
                    model_version,
                })
            } else {
                None
            }
        }))
    }

    async fn persist(&self, result: &JobScoreResult, job_updated_at: chrono::DateTime<Utc>) -> CoreResult<()> {
        sqlx::query("DELETE FROM job_scores WHERE user_id = ? AND job_id = ?")
            .bind(&result.user_id)
            .bind(&result.job_id)
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "INSERT INTO job_scores (user_id, job_id, score, should_apply, confidence, explanation, model_version, job_version)
             VALUES (?,?,?,?,?,?,?,?)",
        )
        .bind(&result.user_id)
        .bind(&result.job_id)
        .bind(result.score)
        .bind(result.should_apply)
        .bind(result.confidence)
        .bind(sqlx::types::Json(&result.explanation))
        .bind(result.model_version)
        .bind(job_updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Derives the 11-variable raw feature map from the Job record, its
    /// normalized child tables, and caller-supplied context. Several
    /// variables (company size preference among them) have no counterpart
    /// anywhere in the data model and are always left missing.
    async fn extract_raw_values(&self, job: &Job, context: &JobScoreContext) -> CoreResult<HashMap<PreferenceVariable, f64>> {
        let mut values = HashMap::new();

        if let Some(salary) = job.salary.0.annualized_midpoint() {
            values.insert(PreferenceVariable::Salary, salary);
        }
        if let Some(commute) = context.commute_minutes {
            values.insert(PreferenceVariable::CommuteTimeMinutes, commute);
        }

        match job.work_arrangement_enum() {
            crate::models::cleaned_scrape::WorkArrangement::Remote => {
                values.insert(PreferenceVariable::LocationFlexibility, 10.0);
            },
            crate::models::cleaned_scrape::WorkArrangement::Hybrid => {
                values.insert(PreferenceVariable::LocationFlexibility, 5.0);
            },
            crate::models::cleaned_scrape::WorkArrangement::Onsite => {
                values.insert(PreferenceVariable::LocationFlexibility, 0.0);
            },
            crate::models::cleaned_scrape::WorkArrangement::Unknown => {},
        }

        if let (Some(preferred), Some(industry)) = (&context.preferred_industry, &job.industry) {
            let matches = preferred.trim().eq_ignore_ascii_case(industry.trim());
            values.insert(PreferenceVariable::IndustryFit, if matches { 10.0 } else { 0.0 });
        }

        let benefit_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job_benefits WHERE job_id = ?").bind(&job.job_id).fetch_one(&self.pool).await?;
        values.insert(PreferenceVariable::CompensationBenefits, (benefit_count as f64).min(10.0));

        let red_flag_rows: Vec<String> =
            sqlx::query_scalar("SELECT severity FROM red_flags WHERE job_id = ?").bind(&job.job_id).fetch_all(&self.pool).await?;
        if !red_flag_rows.is_empty() {
            let total: f64 = red_flag_rows.iter().map(|s| severity_weight(s)).sum();
            values.insert(PreferenceVariable::AcceptableStress, total / red_flag_rows.len() as f64);
            values.insert(PreferenceVariable::WorkLifeBalance, (10.0 - red_flag_rows.len() as f64 * 2.0).max(0.0));
        }

        let insight_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cover_letter_insights WHERE job_id = ?").bind(&job.job_id).fetch_one(&self.pool).await?;
        if insight_count > 0 {
            values.insert(PreferenceVariable::CareerGrowth, (insight_count as f64).min(10.0));
        }

        let text = format!("{} {}", job.description.as_deref().unwrap_or(""), job.requirements.as_deref().unwrap_or(""));
        let text_lower = text.to_lowercase();
        if !text.trim().is_empty() {
            let overtime_hits = OVERTIME_KEYWORDS.iter().filter(|kw| text_lower.contains(*kw)).count();
            if overtime_hits > 0 {
                values.insert(PreferenceVariable::WorkHoursPerWeek, (overtime_hits as f64 * 3.0).min(10.0));
            }

            let insecurity_hits = INSECURITY_KEYWORDS.iter().filter(|kw| text_lower.contains(*kw)).count();
            values.insert(PreferenceVariable::JobSecurity, if insecurity_hits > 0 { 2.0 } else { 8.0 });
        }

        Ok(values)
    }
}

fn severity_weight(severity: &str) -> f64 {
    match severity {
        "high" => 9.0,
        "medium" => 6.0,
        _ => 3.0,
    }
}
