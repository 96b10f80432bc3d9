//! Error type and wire schema for the tiered scheduler's LLM calls (C9-C11).
//! Tier request/response shapes mirror §4.10's per-tier extraction lists;
//! `security_token` is the field C9/C11 use to detect injection success.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("LLM response parsing error: {0}")]
    ParseError(String),

    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    #[error("LLM provider rate limited us, retry after {0}s")]
    RateLimited(u64),

    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl LLMError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_) | Self::ApiError(_) | Self::DatabaseError(_))
    }
}

// ============================================================================
// Tier 1: skills, seniority, authenticity, compensation, work arrangement,
// industry, ATS keywords, red flags (§4.10).
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillExtraction {
    pub skill: String,
    /// 1-10, validated by C11.
    pub importance: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedFlagExtraction {
    pub flag: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier1JobResult {
    pub job_id: String,
    pub skills: Vec<SkillExtraction>,
    pub seniority: String,
    pub authenticity_signals: Vec<String>,
    pub compensation_facts: Vec<String>,
    pub benefits: Vec<String>,
    pub work_arrangement: Option<String>,
    pub industry_classification: Option<String>,
    pub secondary_industries: Vec<String>,
    pub ats_keywords: Vec<String>,
    pub red_flags: Vec<RedFlagExtraction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier1Response {
    pub security_token: String,
    pub jobs: Vec<Tier1JobResult>,
}

// ============================================================================
// Tier 2: implicit requirements, stress indicators, cultural signals,
// cover-letter insight angles (§4.10).
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverLetterInsightExtraction {
    pub angle: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier2JobResult {
    pub job_id: String,
    pub implicit_requirements: Vec<String>,
    pub stress_indicators: Vec<String>,
    pub cultural_signals: Vec<String>,
    pub cover_letter_insights: Vec<CoverLetterInsightExtraction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier2Response {
    pub security_token: String,
    pub jobs: Vec<Tier2JobResult>,
}

// ============================================================================
// Tier 3: strategic positioning, application-priority score, finalized
// authenticity flags (§4.10).
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticityFlagExtraction {
    pub flag: String,
    /// 0.0-1.0, validated by C11.
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier3JobResult {
    pub job_id: String,
    pub strategic_positioning: Vec<String>,
    /// 0-100, validated by C11.
    pub application_priority_score: f64,
    pub authenticity_flags: Vec<AuthenticityFlagExtraction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier3Response {
    pub security_token: String,
    pub jobs: Vec<Tier3JobResult>,
}

/// Minimal per-job input the prompt builders need; assembled by the
/// scheduler from `Job` plus prior-tier context.
#[derive(Debug, Clone)]
pub struct JobPromptInput {
    pub job_id: String,
    pub job_title: String,
    pub company_name: String,
    pub description: String,
    pub requirements: String,
    /// Validated tier-1 result, required when building tier 2/3 prompts
    /// (tier N+1 prompts include tier N's structured result as context).
    pub tier1_context: Option<Tier1JobResult>,
    pub tier2_context: Option<Tier2JobResult>,
}
