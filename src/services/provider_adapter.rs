//! Capability interface for per-provider payload parsing (C2), selected by
//! configuration rather than runtime type introspection — the registry
//! pattern §9's REDESIGN FLAGS calls for in place of dynamic dispatch on
//! scraping provider shape.

use std::collections::HashMap;

use crate::models::raw_scrape::RawScrape;
use crate::utils::{CoreError, CoreResult};

/// Canonical fields extracted from one raw payload, before confidence
/// scoring or dedup. Salary/location fields intentionally stay `Option`:
/// fields that cannot be parsed are left unset, never guessed (§4.2).
#[derive(Debug, Clone, Default)]
pub struct RawFields {
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub street_address: Option<String>,
    pub work_arrangement: Option<String>,
    pub salary_low: Option<f64>,
    pub salary_high: Option<f64>,
    pub salary_currency: Option<String>,
    pub salary_period: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub benefits: Option<String>,
    pub industry: Option<String>,
    pub job_type: Option<String>,
    pub experience_level: Option<String>,
    pub posting_date: Option<chrono::DateTime<chrono::Utc>>,
    pub application_deadline: Option<chrono::DateTime<chrono::Utc>>,
    pub external_job_id: Option<String>,
    pub application_url: Option<String>,
    pub application_email: Option<String>,
}

/// Per-provider parsing capability. Implementors know the shape of one
/// scraping provider's JSON payload.
pub trait ProviderAdapter: Send + Sync {
    fn provider_id(&self) -> &str;
    fn parse(&self, payload: &serde_json::Value) -> CoreResult<RawFields>;
}

/// Registry of known adapters, keyed by provider id. An unknown provider
/// fails with `CoreError::ConfigurationError` (mirrors spec's `UnknownProvider`).
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Box<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self { adapters: HashMap::new() }
    }

    pub fn register(&mut self, adapter: Box<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider_id().to_string(), adapter);
    }

    pub fn parse(&self, raw: &RawScrape) -> CoreResult<RawFields> {
        let adapter = self
            .adapters
            .get(&raw.source)
            .ok_or_else(|| CoreError::ConfigurationError(format!("unknown provider: {}", raw.source)))?;
        let payload: serde_json::Value = serde_json::from_str(&raw.payload)?;
        adapter.parse(&payload)
    }
}

/// Generic adapter for providers whose JSON payload already uses the
/// canonical field names. Most aggregator feeds land here; bespoke
/// providers register their own adapter.
pub struct GenericJsonAdapter {
    id: String,
}

impl GenericJsonAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    fn str_field(payload: &serde_json::Value, key: &str) -> Option<String> {
        payload.get(key).and_then(|v| v.as_str()).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
    }

    fn f64_field(payload: &serde_json::Value, key: &str) -> Option<f64> {
        payload.get(key).and_then(|v| v.as_f64())
    }
}

impl ProviderAdapter for GenericJsonAdapter {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn parse(&self, payload: &serde_json::Value) -> CoreResult<RawFields> {
        Ok(RawFields {
            job_title: Self::str_field(payload, "title"),
            company_name: Self::str_field(payload, "company"),
            city: Self::str_field(payload, "city"),
            province: Self::str_field(payload, "province"),
            country: Self::str_field(payload, "country"),
            street_address: Self::str_field(payload, "street_address"),
            work_arrangement: Self::str_field(payload, "work_arrangement"),
            salary_low: Self::f64_field(payload, "salary_low"),
            salary_high: Self::f64_field(payload, "salary_high"),
            salary_currency: Self::str_field(payload, "salary_currency"),
            salary_period: Self::str_field(payload, "salary_period"),
            description: Self::str_field(payload, "description"),
            requirements: Self::str_field(payload, "requirements"),
            benefits: Self::str_field(payload, "benefits"),
            industry: Self::str_field(payload, "industry"),
            job_type: Self::str_field(payload, "job_type"),
            experience_level: Self::str_field(payload, "experience_level"),
            posting_date: None,
            application_deadline: None,
            external_job_id: Self::str_field(payload, "external_job_id"),
            application_url: Self::str_field(payload, "application_url"),
            application_email: Self::str_field(payload, "application_email"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with(source: &str, payload: serde_json::Value) -> RawScrape {
        RawScrape {
            scrape_id: "s1".into(),
            source: source.into(),
            source_url: Some("https://example.com".into()),
            scraped_at: chrono::Utc::now(),
            payload: payload.to_string(),
            scraper_run_id: "run1".into(),
            success: true,
            error_detail: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn unknown_provider_fails_configuration_error() {
        let registry = AdapterRegistry::new();
        let raw = raw_with("nonexistent", serde_json::json!({}));
        let err = registry.parse(&raw).unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }

    #[test]
    fn generic_adapter_parses_known_fields() {
        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(GenericJsonAdapter::new("acme-feed")));
        let raw = raw_with(
            "acme-feed",
            serde_json::json!({"title": "  Software Engineer  ", "company": "Acme Inc"}),
        );
        let fields = registry.parse(&raw).unwrap();
        assert_eq!(fields.job_title.as_deref(), Some("Software Engineer"));
        assert_eq!(fields.company_name.as_deref(), Some("Acme Inc"));
    }
}
