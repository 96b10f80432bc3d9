//! Raw scrape records (C1)
//!
//! Immutable, verbatim records received from scraping providers. Never
//! mutated or deleted once stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A raw record exactly as received from a scraping provider, stored
/// verbatim in `payload`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RawScrape {
    pub scrape_id: String,
    pub source: String,
    pub source_url: Option<String>,
    pub scraped_at: DateTime<Utc>,
    /// Opaque provider-specific JSON, preserved byte-for-equivalent.
    pub payload: String,
    pub scraper_run_id: String,
    pub success: bool,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Provenance the caller supplies alongside a raw payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeProvenance {
    pub source: String,
    pub source_url: Option<String>,
    pub scraper_run_id: String,
}

/// Request to ingest one provider record.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub provenance: ScrapeProvenance,
    /// Opaque provider-specific JSON payload.
    pub payload: serde_json::Value,
    pub success: bool,
    pub error_detail: Option<String>,
}
