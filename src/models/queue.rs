//! Analysis queue entries (C7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Normal,
        }
    }

    /// Ordering weight for `ORDER BY priority DESC` — higher sorts first.
    pub fn weight(&self) -> i32 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Pending,
    InFlight,
    Done,
    Failed,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_flight" => Self::InFlight,
            "done" => Self::Done,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnalysisQueueEntry {
    pub id: i64,
    pub job_id: String,
    pub priority: String,
    pub tier_target: i32,
    pub state: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub not_before: DateTime<Utc>,
    pub lease_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisQueueEntry {
    pub fn priority_enum(&self) -> Priority {
        Priority::parse(&self.priority)
    }

    pub fn state_enum(&self) -> QueueState {
        QueueState::parse(&self.state)
    }
}

/// Outcome of a dispatch attempt, fed back into `QueueRepository::complete`.
/// The explicit outcome sum type §9's REDESIGN FLAGS calls for, replacing
/// exception-based retry control flow.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Done,
    RetryableFailure { reason: String, backoff: std::time::Duration },
    PermanentFailure { reason: String },
}
