//! Confidence Scorer (C4) — pure weighted quality score over a cleaned
//! record, used as tiebreaker in C3 and for selection in C5.

use crate::models::cleaned_scrape::{CleanedScrape, WorkArrangement};

const PLACEHOLDER_TOKENS: &[&str] = &["n/a", "na", "unknown", "tbd", "none"];

fn is_placeholder(s: &str) -> bool {
    PLACEHOLDER_TOKENS.contains(&s.trim().to_lowercase().as_str())
}

fn field_quality(s: &Option<String>) -> f64 {
    match s {
        Some(v) if v.trim().len() >= 3 && !is_placeholder(v) => 1.0,
        _ => 0.0,
    }
}

/// `score(cleaned) → [0.00, 1.00]` (§4.3). Weighted sum, clamped, rounded
/// to two decimals.
pub fn score(cleaned: &CleanedScrape) -> f64 {
    // Critical (0.60): job_title, company_name, half the weight each.
    let critical = 0.30 * field_quality(&cleaned.job_title) + 0.30 * field_quality(&cleaned.company_name);

    // Important (0.30): description quality, location, work_arrangement.
    let description_quality = match &cleaned.description {
        Some(d) if d.trim().len() >= 80 && d.contains('\n') => 1.0,
        Some(d) if d.trim().len() >= 40 => 0.6,
        Some(d) if !d.trim().is_empty() => 0.3,
        _ => 0.0,
    };
    let location_quality = if cleaned.location.0.has_any_component() { 1.0 } else { 0.0 };
    let arrangement_quality =
        if cleaned.work_arrangement_enum() != WorkArrangement::Unknown { 1.0 } else { 0.0 };
    let important = 0.30 * ((description_quality + location_quality + arrangement_quality) / 3.0);

    // Bonus (0.10): job_type, posting_date, external_job_id (§4.3).
    let job_type_present = if field_quality(&cleaned.job_type) > 0.0 { 1.0 } else { 0.0 };
    let posting_date_present = if cleaned.posting_date.is_some() { 1.0 } else { 0.0 };
    let external_id_present = if cleaned.external_job_id.is_some() { 1.0 } else { 0.0 };
    let bonus = 0.10 * ((job_type_present + posting_date_present + external_id_present) / 3.0);

    (critical + important + bonus).clamp(0.0, 1.0).round_to_2dp()
}

/// Field coverage count, used to break ties between equal scores (§4.3).
pub fn field_coverage(cleaned: &CleanedScrape) -> usize {
    let mut n = 0;
    if cleaned.job_title.is_some() {
        n += 1;
    }
    if cleaned.company_name.is_some() {
        n += 1;
    }
    if cleaned.description.is_some() {
        n += 1;
    }
    if cleaned.requirements.is_some() {
        n += 1;
    }
    if cleaned.benefits.is_some() {
        n += 1;
    }
    if cleaned.industry.is_some() {
        n += 1;
    }
    if cleaned.job_type.is_some() {
        n += 1;
    }
    if cleaned.experience_level.is_some() {
        n += 1;
    }
    if cleaned.posting_date.is_some() {
        n += 1;
    }
    if cleaned.location.0.has_any_component() {
        n += 1;
    }
    if cleaned.salary.0.midpoint().is_some() {
        n += 1;
    }
    n
}

trait RoundTo2dp {
    fn round_to_2dp(self) -> f64;
}

impl RoundTo2dp for f64 {
    fn round_to_2dp(self) -> f64 {
        (self * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cleaned_scrape::{Location, Salary};
    use chrono::Utc;

    fn blank_cleaned() -> CleanedScrape {
        CleanedScrape {
            cleaned_id: "c1".into(),
            source: "acme".into(),
            external_job_id: None,
            job_title: None,
            company_name: None,
            location: sqlx::types::Json(Location::default()),
            work_arrangement: "unknown".into(),
            salary: sqlx::types::Json(Salary::default()),
            description: None,
            requirements: None,
            benefits: None,
            industry: None,
            job_type: None,
            experience_level: None,
            posting_date: None,
            application_deadline: None,
            application_url: None,
            application_email: None,
            is_expired: false,
            duplicates_count: 1,
            confidence_score: 0.0,
            provenance_raw_ids: "s1".into(),
            cleaned_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    #[test]
    fn empty_record_scores_zero() {
        assert_eq!(score(&blank_cleaned()), 0.0);
    }

    #[test]
    fn placeholder_title_does_not_count() {
        let mut c = blank_cleaned();
        c.job_title = Some("N/A".into());
        c.company_name = Some("Acme Inc".into());
        assert!(score(&c) < 0.6);
    }

    #[test]
    fn strong_record_scores_near_one() {
        let mut c = blank_cleaned();
        c.job_title = Some("Senior Software Engineer".into());
        c.company_name = Some("Acme Inc".into());
        c.description = Some("A".repeat(100) + "\nmore details here about the role");
        c.location = sqlx::types::Json(Location { city: Some("Toronto".into()), ..Default::default() });
        c.work_arrangement = "hybrid".into();
        c.job_type = Some("full_time".into());
        c.posting_date = Some(Utc::now());
        c.external_job_id = Some("ext-12345".into());
        assert!(score(&c) >= 0.95);
    }
}
