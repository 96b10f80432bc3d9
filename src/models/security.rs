//! Security detections (C9) — append-only audit trail of suspected
//! prompt-injection attempts and validation failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionType {
    SuspectedInjection,
    UnpunctuatedStream,
    TokenMismatch,
    DisallowedContent,
}

impl DetectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuspectedInjection => "suspected_injection",
            Self::UnpunctuatedStream => "unpunctuated_stream",
            Self::TokenMismatch => "token_mismatch",
            Self::DisallowedContent => "disallowed_content",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SecurityDetection {
    pub detection_id: String,
    pub job_id: Option<String>,
    pub detection_type: String,
    pub severity: String,
    pub pattern_matched: Option<String>,
    /// Bounded-length excerpt of the offending text (never the full body).
    pub text_sample: String,
    #[sqlx(json)]
    pub metadata: sqlx::types::Json<serde_json::Value>,
    pub detected_at: DateTime<Utc>,
    pub handled: bool,
    pub action_taken: Option<String>,
}

/// Max length of `text_sample` stored with a detection.
pub const TEXT_SAMPLE_MAX_LEN: usize = 280;

pub fn bound_text_sample(text: &str) -> String {
    if text.chars().count() <= TEXT_SAMPLE_MAX_LEN {
        text.to_string()
    } else {
        text.chars().take(TEXT_SAMPLE_MAX_LEN).collect::<String>() + "…"
    }
}
