//! Append-only event log (§6). Each row is one typed payload, persisted as
//! JSON under a fixed `event_type` discriminator so new event kinds can be
//! added without a migration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub event_type: String,
    #[sqlx(json)]
    pub payload: sqlx::types::Json<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TierCompleted,
    TierFailed,
    JobProtected,
    RateLimited,
    BudgetExceeded,
    SecurityDetected,
    ModelTrained,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TierCompleted => "tier_completed",
            Self::TierFailed => "tier_failed",
            Self::JobProtected => "job_protected",
            Self::RateLimited => "rate_limited",
            Self::BudgetExceeded => "budget_exceeded",
            Self::SecurityDetected => "security_detected",
            Self::ModelTrained => "model_trained",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierCompleted {
    pub job_id: String,
    pub tier: i32,
    pub model_used: String,
    pub tokens_used: i32,
    pub response_time_ms: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierFailed {
    pub job_id: String,
    pub tier: i32,
    pub attempts: i32,
    pub reason: String,
    pub permanent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProtected {
    pub job_id: String,
    pub cleaned_id: String,
    pub attempted_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimited {
    pub provider: String,
    pub retry_after_secs: u64,
    pub queue_depth: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetExceeded {
    pub scope: String,
    pub limit_usd: f64,
    pub spent_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityDetected {
    pub detection_id: String,
    pub job_id: Option<String>,
    pub detection_type: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrained {
    pub user_id: String,
    pub algorithm: String,
    pub scenario_count: i32,
}

/// Anything that can be recorded to the event log knows its own
/// discriminator and how to serialize itself as the payload.
pub trait Event: Serialize {
    fn event_type(&self) -> EventType;
}

impl Event for TierCompleted {
    fn event_type(&self) -> EventType {
        EventType::TierCompleted
    }
}

impl Event for TierFailed {
    fn event_type(&self) -> EventType {
        EventType::TierFailed
    }
}

impl Event for JobProtected {
    fn event_type(&self) -> EventType {
        EventType::JobProtected
    }
}

impl Event for RateLimited {
    fn event_type(&self) -> EventType {
        EventType::RateLimited
    }
}

impl Event for BudgetExceeded {
    fn event_type(&self) -> EventType {
        EventType::BudgetExceeded
    }
}

impl Event for SecurityDetected {
    fn event_type(&self) -> EventType {
        EventType::SecurityDetected
    }
}

impl Event for ModelTrained {
    fn event_type(&self) -> EventType {
        EventType::ModelTrained
    }
}
