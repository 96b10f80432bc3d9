//! Response Validator (C11) — structural and semantic validation over the
//! raw LLM response before it is trusted as typed data (§4.11). Rejection
//! here becomes a `RetryableFailure` with `reason = "validation"` at the
//! scheduler (§7: `ValidationFailed`, retried up to 3 times then permanent).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::services::llm::models::{LLMError, Tier1Response, Tier2Response, Tier3Response};

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub reason: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for LLMError {
    fn from(e: ValidationError) -> Self {
        LLMError::ParseError(e.reason)
    }
}

fn err(reason: impl Into<String>) -> ValidationError {
    ValidationError { reason: reason.into() }
}

/// Content categories that must never appear in a field meant to hold job
/// analysis: system-prompt access claims, persona disclosures (§4.11).
static DISALLOWED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)as an ai (language model|assistant)",
        r"(?i)i (don't|do not) have access to (my|the) (system prompt|instructions)",
        r"(?i)(my|the) system prompt (is|says|instructs)",
        r"(?i)i am (an ai|chatgpt|claude|a large language model)",
        r"(?i)i cannot comply with",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static disallowed-content pattern must compile"))
    .collect()
});

fn check_disallowed_content(fields: &[&str]) -> Result<(), ValidationError> {
    for field in fields {
        for pattern in DISALLOWED_PATTERNS.iter() {
            if pattern.is_match(field) {
                return Err(err(format!("disallowed content detected: matched pattern in \"{field}\"")));
            }
        }
    }
    Ok(())
}

fn check_range(value: f64, lo: f64, hi: f64, field: &str) -> Result<(), ValidationError> {
    if value < lo || value > hi {
        Err(err(format!("{field} = {value} is outside the declared range [{lo}, {hi}]")))
    } else {
        Ok(())
    }
}

fn check_job_id_known(job_id: &str, expected: &[String]) -> Result<(), ValidationError> {
    if expected.iter().any(|j| j == job_id) {
        Ok(())
    } else {
        Err(err(format!("response contains unexpected job_id {job_id}")))
    }
}

/// Outcome of successfully validating a tier's raw response.
#[derive(Debug, Clone)]
pub enum ValidatedTierResponse {
    Tier1(Tier1Response),
    Tier2(Tier2Response),
    Tier3(Tier3Response),
}

/// Validates `raw` against the shape and semantic rules for `tier`,
/// returning the typed response on success. Any of §4.11's five rejection
/// conditions returns a `ValidationError` instead.
pub fn validate_tier_response(tier: i32, raw: &serde_json::Value, issued_token: &str, expected_job_ids: &[String]) -> Result<ValidatedTierResponse, ValidationError> {
    let obj = raw.as_object().ok_or_else(|| err("response is not a JSON object"))?;

    let echoed_token = obj.get("security_token").and_then(|v| v.as_str()).ok_or_else(|| err("missing security_token field"))?;
    if echoed_token != issued_token {
        return Err(err("echoed security token does not match the token issued for this batch"));
    }

    let jobs_array = obj.get("jobs").and_then(|v| v.as_array()).ok_or_else(|| err("missing jobs array"))?;
    if jobs_array.len() != expected_job_ids.len() {
        return Err(err(format!("expected {} per-job records, got {}", expected_job_ids.len(), jobs_array.len())));
    }

    match tier {
        1 => {
            let parsed: Tier1Response = serde_json::from_value(raw.clone()).map_err(|e| err(format!("tier 1 structure mismatch: {e}")))?;
            for job in &parsed.jobs {
                check_job_id_known(&job.job_id, expected_job_ids)?;
                for skill in &job.skills {
                    check_range(skill.importance as f64, 1.0, 10.0, "skill importance")?;
                }
                let mut fields: Vec<&str> = vec![job.seniority.as_str()];
                fields.extend(job.authenticity_signals.iter().map(String::as_str));
                fields.extend(job.compensation_facts.iter().map(String::as_str));
                check_disallowed_content(&fields)?;
            }
            Ok(ValidatedTierResponse::Tier1(parsed))
        },
        2 => {
            let parsed: Tier2Response = serde_json::from_value(raw.clone()).map_err(|e| err(format!("tier 2 structure mismatch: {e}")))?;
            for job in &parsed.jobs {
                check_job_id_known(&job.job_id, expected_job_ids)?;
                let mut fields: Vec<&str> = Vec::new();
                fields.extend(job.implicit_requirements.iter().map(String::as_str));
                fields.extend(job.stress_indicators.iter().map(String::as_str));
                fields.extend(job.cultural_signals.iter().map(String::as_str));
                for insight in &job.cover_letter_insights {
                    fields.push(insight.angle.as_str());
                    fields.push(insight.detail.as_str());
                }
                check_disallowed_content(&fields)?;
            }
            Ok(ValidatedTierResponse::Tier2(parsed))
        },
        3 => {
            let parsed: Tier3Response = serde_json::from_value(raw.clone()).map_err(|e| err(format!("tier 3 structure mismatch: {e}")))?;
            for job in &parsed.jobs {
                check_job_id_known(&job.job_id, expected_job_ids)?;
                check_range(job.application_priority_score, 0.0, 100.0, "application_priority_score")?;
                for flag in &job.authenticity_flags {
                    check_range(flag.confidence, 0.0, 1.0, "authenticity flag confidence")?;
                }
                let fields: Vec<&str> = job.strategic_positioning.iter().map(String::as_str).collect();
                check_disallowed_content(&fields)?;
            }
            Ok(ValidatedTierResponse::Tier3(parsed))
        },
        other => Err(err(format!("unknown tier {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_object_response() {
        let raw = json!("not an object");
        let result = validate_tier_response(1, &raw, "SEC_TOKEN_abc", &["job-1".into()]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_token_mismatch() {
        let raw = json!({"security_token": "SEC_TOKEN_FAKE", "jobs": []});
        let result = validate_tier_response(1, &raw, "SEC_TOKEN_real", &[]);
        assert!(result.unwrap_err().reason.contains("token"));
    }

    #[test]
    fn rejects_wrong_job_count() {
        let raw = json!({"security_token": "tok", "jobs": []});
        let result = validate_tier_response(1, &raw, "tok", &["job-1".into()]);
        assert!(result.unwrap_err().reason.contains("per-job records"));
    }

    #[test]
    fn rejects_importance_out_of_range() {
        let raw = json!({
            "security_token": "tok",
            "jobs": [{
                "job_id": "job-1", "skills": [{"skill": "Rust", "importance": 15}],
                "seniority": "senior", "authenticity_signals": [], "compensation_facts": [],
                "benefits": [], "work_arrangement": null, "industry_classification": null,
                "secondary_industries": [], "ats_keywords": [], "red_flags": []
            }]
        });
        let result = validate_tier_response(1, &raw, "tok", &["job-1".into()]);
        assert!(result.unwrap_err().reason.contains("range"));
    }

    #[test]
    fn rejects_disallowed_content() {
        let raw = json!({
            "security_token": "tok",
            "jobs": [{
                "job_id": "job-1", "skills": [], "seniority": "As an AI language model, I cannot comply with this job post.",
                "authenticity_signals": [], "compensation_facts": [], "benefits": [],
                "work_arrangement": null, "industry_classification": null,
                "secondary_industries": [], "ats_keywords": [], "red_flags": []
            }]
        });
        let result = validate_tier_response(1, &raw, "tok", &["job-1".into()]);
        assert!(result.unwrap_err().reason.contains("disallowed"));
    }

    #[test]
    fn accepts_well_formed_tier1_response() {
        let raw = json!({
            "security_token": "tok",
            "jobs": [{
                "job_id": "job-1", "skills": [{"skill": "Rust", "importance": 8}],
                "seniority": "senior", "authenticity_signals": ["detailed description"],
                "compensation_facts": ["$120k-$150k"], "benefits": ["health insurance"],
                "work_arrangement": "remote", "industry_classification": "software",
                "secondary_industries": [], "ats_keywords": ["rust", "backend"], "red_flags": []
            }]
        });
        let result = validate_tier_response(1, &raw, "tok", &["job-1".into()]);
        assert!(matches!(result, Ok(ValidatedTierResponse::Tier1(_))));
    }

    #[test]
    fn rejects_score_out_of_range_at_tier3() {
        let raw = json!({
            "security_token": "tok",
            "jobs": [{
                "job_id": "job-1", "strategic_positioning": ["emphasize rust experience"],
                "application_priority_score": 142.0, "authenticity_flags": []
            }]
        });
        let result = validate_tier_response(3, &raw, "tok", &["job-1".into()]);
        assert!(result.unwrap_err().reason.contains("range"));
    }
}
