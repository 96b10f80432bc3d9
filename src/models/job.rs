//! The canonical `Job` record (C5/C10/C11) and its per-tier analysis state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::cleaned_scrape::{Location, Salary, WorkArrangement};

/// The system's durable record for a single job opening.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub company_id: String,
    pub external_job_id: Option<String>,
    pub source: String,
    pub job_title: String,
    pub company_name: String,
    #[sqlx(json)]
    pub location: sqlx::types::Json<Location>,
    pub work_arrangement: String,
    #[sqlx(json)]
    pub salary: sqlx::types::Json<Salary>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub benefits: Option<String>,
    pub industry: Option<String>,
    pub job_type: Option<String>,
    pub experience_level: Option<String>,
    pub posting_date: Option<DateTime<Utc>>,
    pub application_deadline: Option<DateTime<Utc>>,
    pub application_url: Option<String>,
    pub application_email: Option<String>,
    pub is_expired: bool,
    pub analysis_completed: bool,
    pub analysis_state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Job {
    pub fn work_arrangement_enum(&self) -> WorkArrangement {
        WorkArrangement::parse(&self.work_arrangement)
    }

    /// Invariant (§3): once `analysis_completed` the identity/description
    /// fields below must never be overwritten by incoming scrape data.
    pub fn identity_fields_locked(&self) -> bool {
        self.analysis_completed
    }
}

/// Tiered analysis lifecycle state (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Unanalyzed,
    Tier1Pending,
    Tier1Done,
    Tier2Pending,
    Tier2Done,
    Tier3Pending,
    Tier3Done,
    AnalysisFailed1,
    AnalysisFailed2,
    AnalysisFailed3,
}

impl AnalysisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unanalyzed => "unanalyzed",
            Self::Tier1Pending => "tier1_pending",
            Self::Tier1Done => "tier1_done",
            Self::Tier2Pending => "tier2_pending",
            Self::Tier2Done => "tier2_done",
            Self::Tier3Pending => "tier3_pending",
            Self::Tier3Done => "tier3_done",
            Self::AnalysisFailed1 => "analysis_failed_1",
            Self::AnalysisFailed2 => "analysis_failed_2",
            Self::AnalysisFailed3 => "analysis_failed_3",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "unanalyzed" => Self::Unanalyzed,
            "tier1_pending" => Self::Tier1Pending,
            "tier1_done" => Self::Tier1Done,
            "tier2_pending" => Self::Tier2Pending,
            "tier2_done" => Self::Tier2Done,
            "tier3_pending" => Self::Tier3Pending,
            "tier3_done" => Self::Tier3Done,
            "analysis_failed_1" => Self::AnalysisFailed1,
            "analysis_failed_2" => Self::AnalysisFailed2,
            "analysis_failed_3" => Self::AnalysisFailed3,
            _ => Self::Unanalyzed,
        }
    }

    pub fn failed(tier: u8) -> Self {
        match tier {
            1 => Self::AnalysisFailed1,
            2 => Self::AnalysisFailed2,
            _ => Self::AnalysisFailed3,
        }
    }

    pub fn done(tier: u8) -> Self {
        match tier {
            1 => Self::Tier1Done,
            2 => Self::Tier2Done,
            _ => Self::Tier3Done,
        }
    }
}

/// A completed (or attempted) analysis pass for one job at one tier.
/// Append-only; tier N+1 must never be marked completed unless tier N is.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnalysisTierRecord {
    pub id: i64,
    pub job_id: String,
    pub tier: i32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub tokens_used: i32,
    pub model_used: String,
    pub response_time_ms: i32,
}

// ============================================================================
// Normalized child entities populated from validated tier responses (C11)
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RequiredSkill {
    pub id: i64,
    pub job_id: String,
    pub skill: String,
    pub importance: i32,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobBenefit {
    pub id: i64,
    pub job_id: String,
    pub benefit: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AtsKeyword {
    pub id: i64,
    pub job_id: String,
    pub keyword: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SecondaryIndustry {
    pub id: i64,
    pub job_id: String,
    pub industry: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RedFlag {
    pub id: i64,
    pub job_id: String,
    pub flag: String,
    pub severity: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ImplicitRequirement {
    pub id: i64,
    pub job_id: String,
    pub requirement: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CoverLetterInsight {
    pub id: i64,
    pub job_id: String,
    pub angle: String,
    pub detail: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuthenticityFlag {
    pub id: i64,
    pub job_id: String,
    pub flag: String,
    pub confidence: f64,
}

/// Tier-3 application strategy recommendation, one row per suggested angle.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StrategicPositioning {
    pub id: i64,
    pub job_id: String,
    pub recommendation: String,
}

/// Tier-3's own application-priority estimate, distinct from the
/// preference-regression score C13 computes (§4.10). One row per job,
/// overwritten on re-analysis.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LlmPriorityScore {
    pub job_id: String,
    pub score: f64,
    pub computed_at: DateTime<Utc>,
}
