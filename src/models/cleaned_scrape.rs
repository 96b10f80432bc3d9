//! Cleaned scrape records (C2/C3)
//!
//! Canonical-shaped record derived from one or more raw scrapes. Produced by
//! the cleaner, merged in place by the deduper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkArrangement {
    Remote,
    Hybrid,
    Onsite,
    Unknown,
}

impl Default for WorkArrangement {
    fn default() -> Self {
        Self::Unknown
    }
}

impl WorkArrangement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Hybrid => "hybrid",
            Self::Onsite => "onsite",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "remote" => Self::Remote,
            "hybrid" => Self::Hybrid,
            "onsite" | "on-site" | "in-office" | "in_office" => Self::Onsite,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub street_address: Option<String>,
}

impl Location {
    pub fn has_any_component(&self) -> bool {
        self.city.is_some() || self.province.is_some() || self.country.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalaryPeriod {
    Hourly,
    Annual,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Salary {
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub currency: Option<String>,
    pub period: Option<SalaryPeriod>,
}

impl Salary {
    /// Invariant from §3: `salary.low <= salary.high` when both present.
    pub fn is_valid(&self) -> bool {
        match (self.low, self.high) {
            (Some(low), Some(high)) => low <= high,
            _ => true,
        }
    }

    pub fn midpoint(&self) -> Option<f64> {
        match (self.low, self.high) {
            (Some(low), Some(high)) => Some((low + high) / 2.0),
            (Some(v), None) | (None, Some(v)) => Some(v),
            (None, None) => None,
        }
    }

    /// Annualized midpoint, used by the job scorer's salary feature.
    /// Hourly figures are annualized assuming a 2080-hour work year, the
    /// same convention the cleaner's salary parser uses when normalizing
    /// hourly postings for cross-posting comparison.
    pub fn annualized_midpoint(&self) -> Option<f64> {
        let mid = self.midpoint()?;
        match self.period {
            Some(SalaryPeriod::Hourly) => Some(mid * 2080.0),
            _ => Some(mid),
        }
    }
}

/// A cleaned, canonical-shaped scrape record. See spec §3 for field
/// invariants.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CleanedScrape {
    pub cleaned_id: String,
    pub source: String,
    pub external_job_id: Option<String>,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
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
    pub duplicates_count: i64,
    pub confidence_score: f64,
    /// Comma-joined `RawScrape::scrape_id`s that collapsed into this record.
    pub provenance_raw_ids: String,
    pub cleaned_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl CleanedScrape {
    pub fn work_arrangement_enum(&self) -> WorkArrangement {
        WorkArrangement::parse(&self.work_arrangement)
    }

    pub fn provenance_ids(&self) -> Vec<String> {
        self.provenance_raw_ids
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Output of the cleaner before persistence — the deduper decides whether
/// this becomes a brand-new `CleanedScrape` row or merges into an existing
/// one.
#[derive(Debug, Clone)]
pub struct CleanedFields {
    pub source: String,
    pub external_job_id: Option<String>,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub location: Location,
    pub work_arrangement: WorkArrangement,
    pub salary: Salary,
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
    pub source_raw_id: String,
}
