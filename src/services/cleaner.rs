//! Cleaner (C2) — normalizes one raw record into canonical fields.

use std::collections::HashSet;

use crate::models::cleaned_scrape::{CleanedFields, Location, Salary, SalaryPeriod, WorkArrangement};
use crate::models::raw_scrape::RawScrape;
use crate::services::provider_adapter::AdapterRegistry;
use crate::utils::CoreResult;

/// Legal suffixes stripped before name matching in C6, per §4.2.
pub const COMPANY_SUFFIXES: &[&str] = &["Inc", "Ltd", "LLC", "Corp", "Co"];

/// Province/territory abbreviations recognized when parsing location.
pub const PROVINCE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("ontario", "ON"),
    ("quebec", "QC"),
    ("british columbia", "BC"),
    ("alberta", "AB"),
    ("manitoba", "MB"),
    ("saskatchewan", "SK"),
    ("nova scotia", "NS"),
    ("new brunswick", "NB"),
];

pub struct Cleaner {
    registry: AdapterRegistry,
}

impl Cleaner {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self { registry }
    }

    /// `clean(raw_scrape) → cleaned_scrape` (§4.2). Emits exactly one
    /// `CleanedFields` referencing the input raw; an unknown provider
    /// propagates `CoreError::ConfigurationError` from the registry.
    pub fn clean(&self, raw: &RawScrape) -> CoreResult<CleanedFields> {
        let fields = self.registry.parse(raw)?;

        let job_title = fields.job_title.and_then(|s| trim_or_unset(&s));
        let company_name = fields.company_name.map(|s| title_case_company(&s)).filter(|s| !s.is_empty());

        let location = Location {
            city: fields.city.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            province: fields.province.as_deref().map(normalize_province),
            country: fields.country.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            street_address: fields.street_address.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        };

        let default_currency =
            if raw.source_url.as_deref().is_some_and(|u| u.ends_with(".ca")) { "CAD" } else { "USD" };

        let salary = build_salary(fields.salary_low, fields.salary_high, fields.salary_currency.as_deref(), fields.salary_period.as_deref(), default_currency);

        Ok(CleanedFields {
            source_raw_id: raw.scrape_id.clone(),
            job_title,
            company_name,
            location,
            work_arrangement: fields
                .work_arrangement
                .as_deref()
                .map(WorkArrangement::parse)
                .unwrap_or_default(),
            salary,
            description: nonempty(fields.description),
            requirements: nonempty(fields.requirements),
            benefits: nonempty(fields.benefits),
            industry: nonempty(fields.industry),
            job_type: nonempty(fields.job_type),
            experience_level: nonempty(fields.experience_level),
            posting_date: fields.posting_date,
            application_deadline: fields.application_deadline,
            external_job_id: nonempty(fields.external_job_id),
            source: raw.source.clone(),
            application_url: nonempty(fields.application_url),
            application_email: nonempty(fields.application_email),
            is_expired: false,
        })
    }
}

fn nonempty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn trim_or_unset(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}

/// Title-cases a company name and strips a trailing legal suffix for
/// matching purposes (the suffix is kept in the stored name; only C6
/// strips it before comparison).
fn title_case_company(raw: &str) -> String {
    raw.trim()
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips a configured legal suffix list from a company name, used by C6
/// before similarity comparison (not applied to the stored value).
pub fn strip_legal_suffix(name: &str) -> String {
    let suffixes: HashSet<&str> = COMPANY_SUFFIXES.iter().copied().collect();
    let cleaned: String = name.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace()).collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let mut end = words.len();
    while end > 0 && suffixes.contains(words[end - 1]) {
        end -= 1;
    }
    words[..end].join(" ").to_lowercase()
}

fn normalize_province(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    for (name, abbrev) in PROVINCE_ABBREVIATIONS {
        if lower == *name || lower == abbrev.to_lowercase() {
            return abbrev.to_string();
        }
    }
    raw.trim().to_string()
}

fn build_salary(
    low: Option<f64>,
    high: Option<f64>,
    currency: Option<&str>,
    period: Option<&str>,
    default_currency: &str,
) -> Salary {
    let currency = currency
        .map(|c| match c {
            "$" | "USD" | "usd" => "USD",
            "CAD" | "cad" => "CAD",
            other => other,
        })
        .unwrap_or(default_currency)
        .to_string();

    let period = match period.map(|p| p.to_lowercase()) {
        Some(p) if p.starts_with("hour") => SalaryPeriod::Hourly,
        _ => SalaryPeriod::Annual,
    };

    // A range reported backwards (low > high) is left unset rather than
    // guessed — §4.2 never guesses unparseable fields.
    let (low, high) = match (low, high) {
        (Some(l), Some(h)) if l > h => (None, None),
        other => other,
    };

    Salary { low, high, currency: Some(currency), period: Some(period) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_cases_company_name() {
        assert_eq!(title_case_company("acme industries"), "Acme Industries");
    }

    #[test]
    fn strips_legal_suffix_for_matching() {
        assert_eq!(strip_legal_suffix("Acme Inc"), "acme");
        assert_eq!(strip_legal_suffix("Acme, Inc."), "acme");
        assert_eq!(strip_legal_suffix("Acme Corp"), "acme");
    }

    #[test]
    fn normalizes_known_province_name() {
        assert_eq!(normalize_province("Ontario"), "ON");
        assert_eq!(normalize_province("ON"), "ON");
        assert_eq!(normalize_province("Texas"), "Texas");
    }

    #[test]
    fn backwards_salary_range_is_left_unset() {
        let salary = build_salary(Some(100.0), Some(50.0), None, None, "CAD");
        assert_eq!(salary.low, None);
        assert_eq!(salary.high, None);
    }

    #[test]
    fn defaults_currency_from_ca_source() {
        let salary = build_salary(Some(50_000.0), Some(60_000.0), None, None, "CAD");
        assert_eq!(salary.currency.as_deref(), Some("CAD"));
    }
}
