//! Company records, resolved/created by the protected transfer (C5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Company {
    pub company_id: String,
    pub name: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub strategic_mission: Option<String>,
    pub strategic_values: Option<String>,
    pub recent_news: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
