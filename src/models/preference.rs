//! User preference scenarios and trained regression models (C12/C13).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The 11 recognized preference variables (§4.12), in a fixed canonical
/// order used everywhere a feature vector is built.
pub const PREFERENCE_VARIABLES: [PreferenceVariable; 11] = [
    PreferenceVariable::Salary,
    PreferenceVariable::CommuteTimeMinutes,
    PreferenceVariable::WorkHoursPerWeek,
    PreferenceVariable::AcceptableStress,
    PreferenceVariable::CareerGrowth,
    PreferenceVariable::WorkLifeBalance,
    PreferenceVariable::CompensationBenefits,
    PreferenceVariable::LocationFlexibility,
    PreferenceVariable::IndustryFit,
    PreferenceVariable::CompanySizePreference,
    PreferenceVariable::JobSecurity,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceVariable {
    Salary,
    CommuteTimeMinutes,
    WorkHoursPerWeek,
    AcceptableStress,
    CareerGrowth,
    WorkLifeBalance,
    CompensationBenefits,
    LocationFlexibility,
    IndustryFit,
    CompanySizePreference,
    JobSecurity,
}

impl PreferenceVariable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Salary => "salary",
            Self::CommuteTimeMinutes => "commute_time_minutes",
            Self::WorkHoursPerWeek => "work_hours_per_week",
            Self::AcceptableStress => "acceptable_stress",
            Self::CareerGrowth => "career_growth",
            Self::WorkLifeBalance => "work_life_balance",
            Self::CompensationBenefits => "compensation_benefits",
            Self::LocationFlexibility => "location_flexibility",
            Self::IndustryFit => "industry_fit",
            Self::CompanySizePreference => "company_size_preference",
            Self::JobSecurity => "job_security",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Salary => "Salary",
            Self::CommuteTimeMinutes => "Commute",
            Self::WorkHoursPerWeek => "Work Hours",
            Self::AcceptableStress => "Stress Tolerance",
            Self::CareerGrowth => "Career Growth",
            Self::WorkLifeBalance => "Work-Life Balance",
            Self::CompensationBenefits => "Compensation & Benefits",
            Self::LocationFlexibility => "Location Flexibility",
            Self::IndustryFit => "Industry Fit",
            Self::CompanySizePreference => "Company Size Fit",
            Self::JobSecurity => "Job Security",
        }
    }

    /// Inverse variables: a lower raw value is preferred, so standardized
    /// values get sign-flipped (§4.12) before training/scoring so that
    /// "higher standardized value is better" holds uniformly.
    pub fn is_inverse(&self) -> bool {
        matches!(self, Self::CommuteTimeMinutes | Self::AcceptableStress)
    }

    pub fn index(&self) -> usize {
        PREFERENCE_VARIABLES
            .iter()
            .position(|v| v == self)
            .expect("PREFERENCE_VARIABLES is exhaustive")
    }
}

/// One user-supplied example: a partial mapping from preference variables to
/// raw values, plus the acceptance score it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceScenario {
    pub values: std::collections::HashMap<PreferenceVariable, f64>,
    /// 0..=100
    pub acceptance_score: f64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PreferenceScenarioRow {
    pub id: i64,
    pub user_id: String,
    pub ordinal: i32,
    #[sqlx(json)]
    pub values: sqlx::types::Json<std::collections::HashMap<String, f64>>,
    pub acceptance_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionAlgorithm {
    Ridge,
    Ensemble,
}

impl RegressionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ridge => "ridge",
            Self::Ensemble => "ensemble",
        }
    }
}

/// A trained, persisted preference model for one user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PreferenceModel {
    pub user_id: String,
    pub algorithm: String,
    #[sqlx(json)]
    pub parameters: sqlx::types::Json<serde_json::Value>,
    /// Per-feature importance, indexed identically to `PREFERENCE_VARIABLES`,
    /// summing to 1.0 (±1e-6).
    #[sqlx(json)]
    pub importances: sqlx::types::Json<Vec<f64>>,
    /// Mean/std used to standardize features at training time; reused
    /// verbatim when scoring so new jobs are standardized consistently.
    #[sqlx(json)]
    pub feature_means: sqlx::types::Json<Vec<f64>>,
    #[sqlx(json)]
    pub feature_stds: sqlx::types::Json<Vec<f64>>,
    pub formula: String,
    pub scenario_count: i32,
    pub trained_at: DateTime<Utc>,
}

impl PreferenceModel {
    pub fn importance_of(&self, var: PreferenceVariable) -> f64 {
        self.importances.0.get(var.index()).copied().unwrap_or(0.0)
    }
}

/// Result of scoring one job against one user's model (C13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobScoreResult {
    pub user_id: String,
    pub job_id: String,
    pub score: f64,
    pub should_apply: bool,
    pub confidence: f64,
    pub explanation: Vec<FeatureContribution>,
    pub model_version: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub variable: PreferenceVariable,
    pub contribution: f64,
}

/// `evaluate_job` before tier 1 analysis has completed (§7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotYetAnalyzed {
    pub reason: &'static str,
}

impl Default for NotYetAnalyzed {
    fn default() -> Self {
        Self { reason: "not_yet_analyzed" }
    }
}
